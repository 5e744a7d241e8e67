//! Persisted record read model.
//!
//! # Responsibility
//! - Carry one fetched row with its lifecycle timestamps.
//! - Hold eager-loaded relations and appended computed attributes.
//!
//! # Invariants
//! - `deleted_at.is_some()` is the source of truth for trashed state.
//! - `attributes` only contains projected fillable columns; `id` and
//!   timestamps live in dedicated fields.

use crate::model::value::FieldValue;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;

/// Primary key assigned by the store on insert.
pub type RecordId = i64;

/// Eager-loaded relation payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// Result of a `BelongsTo` / `HasOne` relation.
    One(Option<Box<Record>>),
    /// Result of a `HasMany` relation, ordered by related id.
    Many(Vec<Record>),
}

/// One row fetched from an [`EntityStore`](crate::store::EntityStore).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub id: RecordId,
    pub attributes: BTreeMap<String, FieldValue>,
    /// Epoch milliseconds; `None` when the schema keeps no timestamps.
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
    /// Soft-delete tombstone in epoch milliseconds.
    pub deleted_at: Option<i64>,
    pub relations: BTreeMap<String, Related>,
    pub appended: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Looks up a column value, falling back to appended attributes.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.attributes
            .get(name)
            .or_else(|| self.appended.get(name))
    }

    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn relation(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    /// Returns loaded `HasMany` children, or an empty slice when the
    /// relation was not loaded.
    pub fn related_many(&self, name: &str) -> &[Record] {
        match self.relations.get(name) {
            Some(Related::Many(records)) => records.as_slice(),
            _ => &[],
        }
    }

    pub fn related_one(&self, name: &str) -> Option<&Record> {
        match self.relations.get(name) {
            Some(Related::One(Some(record))) => Some(record.as_ref()),
            _ => None,
        }
    }
}

impl Serialize for Related {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::One(Some(record)) => record.serialize(serializer),
            Self::One(None) => serializer.serialize_none(),
            Self::Many(records) => records.serialize(serializer),
        }
    }
}

/// Flattens a record the way ORM array exports do:
/// `id`, attributes, timestamps, appended values, then relations.
impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("id", &self.id)?;
        for (name, value) in &self.attributes {
            map.serialize_entry(name, value)?;
        }
        if let Some(created_at) = self.created_at {
            map.serialize_entry("created_at", &created_at)?;
        }
        if let Some(updated_at) = self.updated_at {
            map.serialize_entry("updated_at", &updated_at)?;
        }
        if let Some(deleted_at) = self.deleted_at {
            map.serialize_entry("deleted_at", &deleted_at)?;
        }
        for (name, value) in &self.appended {
            map.serialize_entry(name, value)?;
        }
        for (name, related) in &self.relations {
            map.serialize_entry(name, related)?;
        }
        map.end()
    }
}
