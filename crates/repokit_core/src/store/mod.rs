//! Storage port and its implementations.
//!
//! # Responsibility
//! - Define the capability set repositories need from a backing store.
//! - Keep SQL (or in-memory) details behind one trait.
//!
//! # Invariants
//! - Every implementation validates queries and payloads against the schema
//!   before touching storage.
//! - `select` returns rows ordered by the requested keys, then by `id`.
//! - Lifecycle columns are written by the store, never taken from payloads.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{create_table_sql, SqliteStore};

use crate::model::record::{Record, RecordId};
use crate::model::schema::{EntitySchema, ID_COLUMN};
use crate::model::value::{FieldValue, Payload};
use crate::repo::error::RepoResult;

/// Which rows a query sees with respect to soft-delete tombstones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrashScope {
    #[default]
    WithoutTrashed,
    WithTrashed,
    OnlyTrashed,
}

/// Column projection for fetched records.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Columns {
    #[default]
    All,
    Only(Vec<String>),
}

impl Columns {
    /// Builds a projection from column names; `*` selects every column.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() || names.iter().any(|name| name == "*") {
            return Self::All;
        }
        Self::Only(names)
    }

    /// Resolves the fillable columns to read for `schema`.
    ///
    /// Lifecycle columns are skipped here because stores always read them.
    pub fn resolve<'a>(&'a self, schema: &'a EntitySchema) -> RepoResult<Vec<&'a str>> {
        match self {
            Self::All => Ok(schema.columns().iter().map(String::as_str).collect()),
            Self::Only(names) => {
                let mut resolved: Vec<&str> = Vec::with_capacity(names.len());
                for name in names {
                    schema.ensure_queryable(name)?;
                    if schema.is_fillable(name) && !resolved.contains(&name.as_str()) {
                        resolved.push(name.as_str());
                    }
                }
                Ok(resolved)
            }
        }
    }

    /// Adds `column` to an explicit projection; no-op for [`Columns::All`].
    pub fn include(&mut self, column: &str) {
        if let Self::Only(names) = self {
            if !names.iter().any(|name| name == column) {
                names.push(column.to_string());
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// Row predicate; all filters of a query are combined with `AND`.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column = value`; a `Null` value matches `IS NULL`.
    Eq(String, FieldValue),
    /// `column IN (...)`; an empty list matches nothing.
    In(String, Vec<FieldValue>),
    IsNull(String),
    NotNull(String),
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Self::Eq(column, _)
            | Self::In(column, _)
            | Self::IsNull(column)
            | Self::NotNull(column) => column,
        }
    }

    pub fn id_eq(id: RecordId) -> Self {
        Self::Eq(ID_COLUMN.to_string(), FieldValue::Integer(id))
    }
}

/// Store-level read request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectQuery {
    pub columns: Columns,
    pub filters: Vec<Filter>,
    pub scope: TrashScope,
    pub order: Vec<(String, Direction)>,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl SelectQuery {
    /// Checks every identifier and the trash scope against `schema`.
    pub fn validate(&self, schema: &EntitySchema) -> RepoResult<()> {
        if self.scope != TrashScope::WithoutTrashed {
            schema.ensure_soft_deletes()?;
        }
        self.columns.resolve(schema)?;
        for filter in &self.filters {
            schema.ensure_queryable(filter.column())?;
        }
        for (column, _) in &self.order {
            schema.ensure_queryable(column)?;
        }
        Ok(())
    }
}

/// Capability set a repository needs from its backing store.
///
/// `now_ms` arguments are epoch milliseconds supplied by the caller so every
/// store stamps lifecycle columns identically.
pub trait EntityStore {
    fn select(&self, schema: &EntitySchema, query: &SelectQuery) -> RepoResult<Vec<Record>>;

    /// Counts rows matching the scope and filters; order/limit are ignored.
    fn count(&self, schema: &EntitySchema, query: &SelectQuery) -> RepoResult<usize>;

    fn insert(&self, schema: &EntitySchema, payload: &Payload, now_ms: i64)
        -> RepoResult<RecordId>;

    /// Applies `payload` to row `id`; returns `false` when the row is absent.
    fn update(
        &self,
        schema: &EntitySchema,
        id: RecordId,
        payload: &Payload,
        now_ms: i64,
    ) -> RepoResult<bool>;

    /// Tombstones an active row; returns `false` when no active row matched.
    fn soft_delete(&self, schema: &EntitySchema, id: RecordId, now_ms: i64) -> RepoResult<bool>;

    /// Clears a tombstone; returns `false` when no trashed row matched.
    fn restore(&self, schema: &EntitySchema, id: RecordId, now_ms: i64) -> RepoResult<bool>;

    /// Removes row `id` irrespective of trash state.
    fn force_delete(&self, schema: &EntitySchema, id: RecordId) -> RepoResult<bool>;
}
