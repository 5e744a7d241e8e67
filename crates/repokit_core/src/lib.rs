//! Generic repository layer with soft-delete semantics.
//! Entity stores, schemas and the base repository live here.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod store;

pub use config::{DiagnosticMode, RepositoryConfig, RuntimeMode};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::record::{Record, RecordId, Related};
pub use model::schema::{EntitySchema, EntitySchemaBuilder, Relation, RelationKind};
pub use model::value::{payload, FieldValue, Payload};
pub use repo::base_repository::{system_clock, BaseRepository, Clock};
pub use repo::error::{RepoError, RepoResult};
pub use repo::query::{FetchOptions, QueryBuilder};
pub use store::{
    create_table_sql, Columns, Direction, EntityStore, Filter, MemoryStore, SelectQuery,
    SqliteStore, TrashScope,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
