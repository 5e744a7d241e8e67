//! Repository error taxonomy.

use crate::db::DbError;
use crate::model::record::RecordId;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Failure of a repository, query builder or store operation.
#[derive(Debug)]
pub enum RepoError {
    /// No row with `id` is visible under the requested trash scope.
    NotFound { table: String, id: RecordId },
    /// Underlying store failure.
    Db(DbError),
    UnknownColumn { table: String, column: String },
    UnknownRelation { table: String, relation: String },
    UnknownAppend { table: String, name: String },
    InvalidIdentifier(String),
    /// Trash operation requested on a schema without soft deletes.
    SoftDeletesDisabled(String),
    /// Backing table is missing from the connected database.
    MissingTable(String),
    /// Persisted data that cannot be decoded into a record.
    InvalidData(String),
}

impl RepoError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Stable machine-readable code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Db(_) => "db_error",
            Self::UnknownColumn { .. } => "unknown_column",
            Self::UnknownRelation { .. } => "unknown_relation",
            Self::UnknownAppend { .. } => "unknown_append",
            Self::InvalidIdentifier(_) => "invalid_identifier",
            Self::SoftDeletesDisabled(_) => "soft_deletes_disabled",
            Self::MissingTable(_) => "missing_table",
            Self::InvalidData(_) => "invalid_data",
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { table, id } => write!(f, "{table} record not found: {id}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::UnknownColumn { table, column } => {
                write!(f, "unknown column `{column}` on `{table}`")
            }
            Self::UnknownRelation { table, relation } => {
                write!(f, "unknown relation `{relation}` on `{table}`")
            }
            Self::UnknownAppend { table, name } => {
                write!(f, "unknown computed attribute `{name}` on `{table}`")
            }
            Self::InvalidIdentifier(message) => write!(f, "invalid identifier: {message}"),
            Self::SoftDeletesDisabled(table) => {
                write!(f, "`{table}` does not use soft deletes")
            }
            Self::MissingTable(table) => write!(f, "table `{table}` does not exist"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
