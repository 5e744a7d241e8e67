//! Entity model shared by stores and repositories.
//!
//! # Responsibility
//! - Define the schema handle a repository is bound to.
//! - Define the record/value shapes every store reads and writes.
//!
//! # Invariants
//! - Every record is identified by a store-assigned `RecordId`.
//! - Deletion of soft-delete schemas is a `deleted_at` tombstone until a
//!   permanent delete removes the row.

pub mod record;
pub mod schema;
pub mod value;
