//! Entity schema: the typed handle a repository is bound to.
//!
//! # Responsibility
//! - Describe one persisted entity type (table, fillable columns,
//!   lifecycle columns, relations, computed attributes).
//! - Validate every identifier before any store interpolates it into SQL.
//!
//! # Invariants
//! - Identifiers match `^[A-Za-z_][A-Za-z0-9_]*$`.
//! - Fillable columns never include lifecycle columns (`id`, `created_at`,
//!   `updated_at`, `deleted_at`).
//! - Relation foreign keys are fillable columns on the owning side.

use crate::model::record::Record;
use crate::model::value::{FieldValue, Payload};
use crate::repo::error::{RepoError, RepoResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

pub const ID_COLUMN: &str = "id";
pub const CREATED_AT_COLUMN: &str = "created_at";
pub const UPDATED_AT_COLUMN: &str = "updated_at";
pub const DELETED_AT_COLUMN: &str = "deleted_at";

const LIFECYCLE_COLUMNS: [&str; 4] = [
    ID_COLUMN,
    CREATED_AT_COLUMN,
    UPDATED_AT_COLUMN,
    DELETED_AT_COLUMN,
];

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Computed attribute evaluated on fetched records.
pub type Accessor = Arc<dyn Fn(&Record) -> FieldValue + Send + Sync>;

/// Relation cardinality and key direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// `related.<foreign_key> = parent.id`, many rows.
    HasMany,
    /// `related.<foreign_key> = parent.id`, lowest-id row.
    HasOne,
    /// `parent.<foreign_key> = related.id`.
    BelongsTo,
}

/// Named relation to another entity schema.
#[derive(Debug, Clone)]
pub struct Relation {
    pub name: String,
    pub kind: RelationKind,
    pub related: Arc<EntitySchema>,
    pub foreign_key: String,
}

/// Description of one persisted entity type.
#[derive(Clone)]
pub struct EntitySchema {
    table: String,
    columns: Vec<String>,
    soft_deletes: bool,
    timestamps: bool,
    relations: Vec<Relation>,
    accessors: BTreeMap<String, Accessor>,
}

impl EntitySchema {
    /// Starts a schema for `table` with soft deletes and timestamps enabled.
    pub fn builder(table: impl Into<String>) -> EntitySchemaBuilder {
        EntitySchemaBuilder {
            table: table.into(),
            columns: Vec::new(),
            soft_deletes: true,
            timestamps: true,
            relations: Vec::new(),
            accessors: BTreeMap::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Fillable columns in declaration order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn soft_deletes(&self) -> bool {
        self.soft_deletes
    }

    pub fn timestamps(&self) -> bool {
        self.timestamps
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> RepoResult<&Relation> {
        self.relations
            .iter()
            .find(|relation| relation.name == name)
            .ok_or_else(|| RepoError::UnknownRelation {
                table: self.table.clone(),
                relation: name.to_string(),
            })
    }

    pub fn accessor(&self, name: &str) -> RepoResult<&Accessor> {
        self.accessors
            .get(name)
            .ok_or_else(|| RepoError::UnknownAppend {
                table: self.table.clone(),
                name: name.to_string(),
            })
    }

    pub fn accessor_names(&self) -> impl Iterator<Item = &str> {
        self.accessors.keys().map(String::as_str)
    }

    pub fn is_fillable(&self, column: &str) -> bool {
        self.columns.iter().any(|candidate| candidate == column)
    }

    /// Returns whether `column` can appear in filters and ordering.
    pub fn is_queryable(&self, column: &str) -> bool {
        match column {
            ID_COLUMN => true,
            CREATED_AT_COLUMN | UPDATED_AT_COLUMN => self.timestamps,
            DELETED_AT_COLUMN => self.soft_deletes,
            other => self.is_fillable(other),
        }
    }

    pub fn ensure_queryable(&self, column: &str) -> RepoResult<()> {
        if self.is_queryable(column) {
            return Ok(());
        }
        Err(self.unknown_column(column))
    }

    /// Rejects payload keys that are not fillable columns.
    pub fn ensure_fillable(&self, payload: &Payload) -> RepoResult<()> {
        match payload.keys().find(|key| !self.is_fillable(key)) {
            Some(key) => Err(self.unknown_column(key)),
            None => Ok(()),
        }
    }

    pub fn ensure_soft_deletes(&self) -> RepoResult<()> {
        if self.soft_deletes {
            return Ok(());
        }
        Err(RepoError::SoftDeletesDisabled(self.table.clone()))
    }

    fn unknown_column(&self, column: &str) -> RepoError {
        RepoError::UnknownColumn {
            table: self.table.clone(),
            column: column.to_string(),
        }
    }
}

impl Debug for EntitySchema {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let relations: Vec<(&str, RelationKind, &str)> = self
            .relations
            .iter()
            .map(|relation| {
                (
                    relation.name.as_str(),
                    relation.kind,
                    relation.related.table(),
                )
            })
            .collect();
        f.debug_struct("EntitySchema")
            .field("table", &self.table)
            .field("columns", &self.columns)
            .field("soft_deletes", &self.soft_deletes)
            .field("timestamps", &self.timestamps)
            .field("relations", &relations)
            .field("accessors", &self.accessors.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`EntitySchema`]; identifiers are validated in [`build`](Self::build).
pub struct EntitySchemaBuilder {
    table: String,
    columns: Vec<String>,
    soft_deletes: bool,
    timestamps: bool,
    relations: Vec<Relation>,
    accessors: BTreeMap<String, Accessor>,
}

impl EntitySchemaBuilder {
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn without_soft_deletes(mut self) -> Self {
        self.soft_deletes = false;
        self
    }

    pub fn without_timestamps(mut self) -> Self {
        self.timestamps = false;
        self
    }

    pub fn has_many(
        self,
        name: impl Into<String>,
        related: Arc<EntitySchema>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relation(name, RelationKind::HasMany, related, foreign_key)
    }

    pub fn has_one(
        self,
        name: impl Into<String>,
        related: Arc<EntitySchema>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relation(name, RelationKind::HasOne, related, foreign_key)
    }

    pub fn belongs_to(
        self,
        name: impl Into<String>,
        related: Arc<EntitySchema>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relation(name, RelationKind::BelongsTo, related, foreign_key)
    }

    fn relation(
        mut self,
        name: impl Into<String>,
        kind: RelationKind,
        related: Arc<EntitySchema>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relations.push(Relation {
            name: name.into(),
            kind,
            related,
            foreign_key: foreign_key.into(),
        });
        self
    }

    /// Registers a computed attribute that callers may request via appends.
    pub fn accessor<F>(mut self, name: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&Record) -> FieldValue + Send + Sync + 'static,
    {
        self.accessors.insert(name.into(), Arc::new(accessor));
        self
    }

    pub fn build(self) -> RepoResult<EntitySchema> {
        validate_identifier(&self.table)?;

        for (index, column) in self.columns.iter().enumerate() {
            validate_identifier(column)?;
            if LIFECYCLE_COLUMNS.contains(&column.as_str()) {
                return Err(RepoError::InvalidIdentifier(format!(
                    "`{column}` is managed by the repository and cannot be fillable on `{}`",
                    self.table
                )));
            }
            if self.columns[..index].contains(column) {
                return Err(RepoError::InvalidIdentifier(format!(
                    "duplicate column `{column}` on `{}`",
                    self.table
                )));
            }
        }

        for (index, relation) in self.relations.iter().enumerate() {
            validate_identifier(&relation.name)?;
            validate_identifier(&relation.foreign_key)?;
            if self.relations[..index]
                .iter()
                .any(|other| other.name == relation.name)
            {
                return Err(RepoError::InvalidIdentifier(format!(
                    "duplicate relation `{}` on `{}`",
                    relation.name, self.table
                )));
            }

            let (owner_table, owner_has_key) = match relation.kind {
                RelationKind::BelongsTo => (
                    self.table.as_str(),
                    self.columns.contains(&relation.foreign_key),
                ),
                RelationKind::HasMany | RelationKind::HasOne => (
                    relation.related.table(),
                    relation.related.is_fillable(&relation.foreign_key),
                ),
            };
            if !owner_has_key {
                return Err(RepoError::UnknownColumn {
                    table: owner_table.to_string(),
                    column: relation.foreign_key.clone(),
                });
            }
        }

        for name in self.accessors.keys() {
            validate_identifier(name)?;
        }

        Ok(EntitySchema {
            table: self.table,
            columns: self.columns,
            soft_deletes: self.soft_deletes,
            timestamps: self.timestamps,
            relations: self.relations,
            accessors: self.accessors,
        })
    }
}

/// Validates a table, column, relation or accessor name.
pub fn validate_identifier(value: &str) -> RepoResult<()> {
    if IDENTIFIER_RE.is_match(value) {
        return Ok(());
    }
    Err(RepoError::InvalidIdentifier(format!(
        "`{value}` is not a valid identifier"
    )))
}
