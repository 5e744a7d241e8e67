//! SQLite migration registry and executor.
//!
//! # Responsibility
//! - Validate caller-registered migrations are strictly increasing.
//! - Apply pending migrations atomically.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - Applied migration version is mirrored to `PRAGMA user_version`.

use crate::db::{DbError, DbResult};
use rusqlite::Connection;

/// One schema step owned by the application embedding the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration<'a> {
    pub version: u32,
    pub sql: &'a str,
}

impl<'a> Migration<'a> {
    pub const fn new(version: u32, sql: &'a str) -> Self {
        Self { version, sql }
    }
}

/// Returns the latest version in `migrations`, or `0` for an empty registry.
pub fn latest_version(migrations: &[Migration<'_>]) -> u32 {
    migrations.last().map_or(0, |migration| migration.version)
}

/// Applies all pending `migrations` on the provided connection.
pub fn apply_migrations(conn: &mut Connection, migrations: &[Migration<'_>]) -> DbResult<()> {
    validate_order(migrations)?;

    let current_version = current_user_version(conn)?;
    let latest = latest_version(migrations);

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in migrations
        .iter()
        .filter(|migration| migration.version > current_version)
    {
        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;

    Ok(())
}

/// Reads `PRAGMA user_version` from `conn`.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

fn validate_order(migrations: &[Migration<'_>]) -> DbResult<()> {
    let mut previous = 0;
    for migration in migrations {
        if migration.version <= previous {
            return Err(DbError::InvalidMigrationOrder {
                previous,
                next: migration.version,
            });
        }
        previous = migration.version;
    }
    Ok(())
}
