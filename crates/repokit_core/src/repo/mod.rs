//! Repository layer over the storage port.
//!
//! # Responsibility
//! - Provide the generic `BaseRepository` reused per entity type.
//! - Provide the store-bound `QueryBuilder` repositories delegate to.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`) distinct from store
//!   transport errors (`Db`).
//! - Each failed repository operation is reported exactly once.

pub mod base_repository;
pub mod error;
pub mod query;
mod relations;
