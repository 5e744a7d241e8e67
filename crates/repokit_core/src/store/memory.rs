//! In-memory entity store.
//!
//! # Responsibility
//! - Provide a dependency-free store with the same observable behavior as
//!   `SqliteStore` for the `EntityStore` contract.
//!
//! # Invariants
//! - Ids are assigned per table starting at 1 and never reused.
//! - Values are stored normalized (`Bool` -> `Integer`).
//! - Foreign keys are not enforced.

use super::{Direction, EntityStore, Filter, SelectQuery, TrashScope};
use crate::model::record::{Record, RecordId};
use crate::model::schema::{
    EntitySchema, CREATED_AT_COLUMN, DELETED_AT_COLUMN, ID_COLUMN, UPDATED_AT_COLUMN,
};
use crate::model::value::{FieldValue, Payload};
use crate::repo::error::RepoResult;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Single-threaded in-memory store keyed by table name.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RefCell<BTreeMap<String, MemoryTable>>,
}

#[derive(Debug, Default)]
struct MemoryTable {
    last_id: RecordId,
    rows: BTreeMap<RecordId, StoredRow>,
}

#[derive(Debug, Clone)]
struct StoredRow {
    id: RecordId,
    values: BTreeMap<String, FieldValue>,
    created_at: Option<i64>,
    updated_at: Option<i64>,
    deleted_at: Option<i64>,
}

impl StoredRow {
    fn value(&self, column: &str) -> FieldValue {
        match column {
            ID_COLUMN => FieldValue::Integer(self.id),
            CREATED_AT_COLUMN => self.created_at.into(),
            UPDATED_AT_COLUMN => self.updated_at.into(),
            DELETED_AT_COLUMN => self.deleted_at.into(),
            other => self.values.get(other).cloned().unwrap_or(FieldValue::Null),
        }
    }

    fn matches(&self, filter: &Filter) -> bool {
        let value = self.value(filter.column());
        match filter {
            Filter::Eq(_, FieldValue::Null) | Filter::IsNull(_) => value.is_null(),
            Filter::Eq(_, expected) => value.store_eq(expected),
            Filter::In(_, candidates) => candidates
                .iter()
                .any(|candidate| value.store_eq(candidate)),
            Filter::NotNull(_) => !value.is_null(),
        }
    }

    fn in_scope(&self, schema: &EntitySchema, scope: TrashScope) -> bool {
        if !schema.soft_deletes() {
            return true;
        }
        match scope {
            TrashScope::WithoutTrashed => self.deleted_at.is_none(),
            TrashScope::OnlyTrashed => self.deleted_at.is_some(),
            TrashScope::WithTrashed => true,
        }
    }

    fn to_record(&self, schema: &EntitySchema, attributes: &[&str]) -> Record {
        let mut record = Record::new(self.id);
        if schema.timestamps() {
            record.created_at = self.created_at;
            record.updated_at = self.updated_at;
        }
        if schema.soft_deletes() {
            record.deleted_at = self.deleted_at;
        }
        for column in attributes {
            record
                .attributes
                .insert((*column).to_string(), self.value(column));
        }
        record
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of physically stored rows in `table`, trashed rows included.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .borrow()
            .get(table)
            .map_or(0, |table| table.rows.len())
    }

    fn matching_rows(&self, schema: &EntitySchema, query: &SelectQuery) -> Vec<StoredRow> {
        let tables = self.tables.borrow();
        let Some(table) = tables.get(schema.table()) else {
            return Vec::new();
        };
        table
            .rows
            .values()
            .filter(|row| row.in_scope(schema, query.scope))
            .filter(|row| query.filters.iter().all(|filter| row.matches(filter)))
            .cloned()
            .collect()
    }

    fn with_row<F>(&self, schema: &EntitySchema, id: RecordId, apply: F) -> bool
    where
        F: FnOnce(&mut StoredRow) -> bool,
    {
        let mut tables = self.tables.borrow_mut();
        tables
            .get_mut(schema.table())
            .and_then(|table| table.rows.get_mut(&id))
            .is_some_and(apply)
    }
}

impl EntityStore for MemoryStore {
    fn select(&self, schema: &EntitySchema, query: &SelectQuery) -> RepoResult<Vec<Record>> {
        query.validate(schema)?;
        let attributes = query.columns.resolve(schema)?;

        let mut rows = self.matching_rows(schema, query);
        rows.sort_by(|left, right| {
            query
                .order
                .iter()
                .map(|(column, direction)| {
                    let ordering = left.value(column).store_cmp(&right.value(column));
                    match direction {
                        Direction::Asc => ordering,
                        Direction::Desc => ordering.reverse(),
                    }
                })
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or_else(|| left.id.cmp(&right.id))
        });

        let limit = query.limit.map_or(usize::MAX, |limit| limit as usize);
        Ok(rows
            .iter()
            .skip(query.offset as usize)
            .take(limit)
            .map(|row| row.to_record(schema, &attributes))
            .collect())
    }

    fn count(&self, schema: &EntitySchema, query: &SelectQuery) -> RepoResult<usize> {
        query.validate(schema)?;
        Ok(self.matching_rows(schema, query).len())
    }

    fn insert(
        &self,
        schema: &EntitySchema,
        payload: &Payload,
        now_ms: i64,
    ) -> RepoResult<RecordId> {
        schema.ensure_fillable(payload)?;

        let mut tables = self.tables.borrow_mut();
        let table = tables.entry(schema.table().to_string()).or_default();
        table.last_id += 1;
        let id = table.last_id;

        let values = schema
            .columns()
            .iter()
            .map(|column| {
                let value = payload
                    .get(column)
                    .map_or(FieldValue::Null, FieldValue::normalized);
                (column.clone(), value)
            })
            .collect();
        let stamp = schema.timestamps().then_some(now_ms);
        table.rows.insert(
            id,
            StoredRow {
                id,
                values,
                created_at: stamp,
                updated_at: stamp,
                deleted_at: None,
            },
        );
        Ok(id)
    }

    fn update(
        &self,
        schema: &EntitySchema,
        id: RecordId,
        payload: &Payload,
        now_ms: i64,
    ) -> RepoResult<bool> {
        schema.ensure_fillable(payload)?;
        Ok(self.with_row(schema, id, |row| {
            for (column, value) in payload {
                row.values.insert(column.clone(), value.normalized());
            }
            if schema.timestamps() {
                row.updated_at = Some(now_ms);
            }
            true
        }))
    }

    fn soft_delete(&self, schema: &EntitySchema, id: RecordId, now_ms: i64) -> RepoResult<bool> {
        schema.ensure_soft_deletes()?;
        Ok(self.with_row(schema, id, |row| {
            if row.deleted_at.is_some() {
                return false;
            }
            row.deleted_at = Some(now_ms);
            if schema.timestamps() {
                row.updated_at = Some(now_ms);
            }
            true
        }))
    }

    fn restore(&self, schema: &EntitySchema, id: RecordId, now_ms: i64) -> RepoResult<bool> {
        schema.ensure_soft_deletes()?;
        Ok(self.with_row(schema, id, |row| {
            if row.deleted_at.is_none() {
                return false;
            }
            row.deleted_at = None;
            if schema.timestamps() {
                row.updated_at = Some(now_ms);
            }
            true
        }))
    }

    fn force_delete(&self, schema: &EntitySchema, id: RecordId) -> RepoResult<bool> {
        let mut tables = self.tables.borrow_mut();
        Ok(tables
            .get_mut(schema.table())
            .and_then(|table| table.rows.remove(&id))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::model::schema::EntitySchema;
    use crate::model::value::{payload, FieldValue};
    use crate::store::{EntityStore, SelectQuery};

    fn schema() -> EntitySchema {
        EntitySchema::builder("posts")
            .columns(["title", "published"])
            .build()
            .unwrap()
    }

    #[test]
    fn ids_are_not_reused_after_force_delete() {
        let store = MemoryStore::new();
        let schema = schema();
        let first = store.insert(&schema, &payload([("title", "a")]), 1).unwrap();
        assert!(store.force_delete(&schema, first).unwrap());
        let second = store.insert(&schema, &payload([("title", "b")]), 2).unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(store.row_count("posts"), 1);
    }

    #[test]
    fn booleans_are_stored_as_integers() {
        let store = MemoryStore::new();
        let schema = schema();
        let id = store
            .insert(&schema, &payload([("published", true)]), 5)
            .unwrap();

        let rows = store.select(&schema, &SelectQuery::default()).unwrap();
        assert_eq!(rows[0].id, id);
        assert_eq!(rows[0].get("published"), Some(&FieldValue::Integer(1)));
        assert_eq!(rows[0].get("title"), Some(&FieldValue::Null));
        assert_eq!(rows[0].created_at, Some(5));
    }

    #[test]
    fn soft_delete_twice_reports_no_change() {
        let store = MemoryStore::new();
        let schema = schema();
        let id = store.insert(&schema, &payload([("title", "x")]), 1).unwrap();

        assert!(store.soft_delete(&schema, id, 2).unwrap());
        assert!(!store.soft_delete(&schema, id, 3).unwrap());
        assert!(store.restore(&schema, id, 4).unwrap());
        assert!(!store.restore(&schema, id, 5).unwrap());
    }
}
