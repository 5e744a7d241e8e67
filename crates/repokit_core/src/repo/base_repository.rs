//! Generic repository bound to one entity schema.
//!
//! # Responsibility
//! - Expose CRUD and trash use-cases over any `EntityStore`.
//! - Report every failed operation exactly once before returning it.
//!
//! # Invariants
//! - A repository is bound to one schema and one store for its lifetime.
//! - Write paths locate their target through the same scoped lookups callers
//!   use (`find_by_id`, `find_trashed_by_id`, `find_only_trashed_by_id`).
//! - Nested lookups inside a write never log on their own.

use crate::config::{DiagnosticMode, RepositoryConfig};
use crate::model::record::{Record, RecordId};
use crate::model::schema::EntitySchema;
use crate::model::value::Payload;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::query::{FetchOptions, QueryBuilder};
use crate::store::EntityStore;
use log::{debug, error};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Epoch-millisecond clock used to stamp lifecycle columns.
pub type Clock = fn() -> i64;

/// Reads the system clock; pre-epoch clocks map to `0`.
pub fn system_clock() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
        })
}

/// Repository over one schema; wrap it per entity type for domain helpers.
pub struct BaseRepository<'s, S: EntityStore + ?Sized> {
    store: &'s S,
    schema: Arc<EntitySchema>,
    diagnostics: DiagnosticMode,
    clock: Clock,
}

impl<'s, S: EntityStore + ?Sized> BaseRepository<'s, S> {
    pub fn new(store: &'s S, schema: Arc<EntitySchema>) -> Self {
        Self {
            store,
            schema,
            diagnostics: DiagnosticMode::default(),
            clock: system_clock,
        }
    }

    pub fn from_config(store: &'s S, schema: Arc<EntitySchema>, config: &RepositoryConfig) -> Self {
        Self::new(store, schema).with_diagnostics(config.diagnostics())
    }

    pub fn with_diagnostics(mut self, diagnostics: DiagnosticMode) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    pub fn store(&self) -> &'s S {
        self.store
    }

    pub fn diagnostics(&self) -> DiagnosticMode {
        self.diagnostics
    }

    /// Returns the unmodified query builder for this schema.
    pub fn query(&self) -> QueryBuilder<'s, S> {
        QueryBuilder::new(self.store, Arc::clone(&self.schema))
    }

    /// Fetches every non-trashed record in primary-key order.
    pub fn all(&self, options: &FetchOptions) -> RepoResult<Vec<Record>> {
        let result = self.query().apply(options).get();
        self.observe("all", None, result)
    }

    pub fn all_trashed(&self) -> RepoResult<Vec<Record>> {
        let result = self.query().only_trashed().get();
        self.observe("all_trashed", None, result)
    }

    pub fn find_by_id(&self, id: RecordId) -> RepoResult<Record> {
        self.find_by_id_with(id, &FetchOptions::default())
    }

    /// Fetches one non-trashed record with projected columns, eager-loaded
    /// relations and appended computed attributes.
    pub fn find_by_id_with(&self, id: RecordId, options: &FetchOptions) -> RepoResult<Record> {
        let result = self.query().apply(options).find_or_fail(id);
        self.observe("find_by_id", Some(id), result)
    }

    /// Fetches one record whether or not it is trashed.
    pub fn find_trashed_by_id(&self, id: RecordId) -> RepoResult<Record> {
        let result = self.query().with_trashed().find_or_fail(id);
        self.observe("find_trashed_by_id", Some(id), result)
    }

    /// Fetches one record only if it is trashed.
    pub fn find_only_trashed_by_id(&self, id: RecordId) -> RepoResult<Record> {
        let result = self.query().only_trashed().find_or_fail(id);
        self.observe("find_only_trashed_by_id", Some(id), result)
    }

    /// Inserts `payload` and returns the row re-read from the store.
    pub fn create(&self, payload: &Payload) -> RepoResult<Record> {
        let result = self
            .store
            .insert(&self.schema, payload, self.now())
            .and_then(|id| self.fresh(id));
        if let Ok(record) = &result {
            debug!(
                "event=repo_create module=repo status=ok table={} id={}",
                self.schema.table(),
                record.id
            );
        }
        self.observe("create", None, result)
    }

    pub fn update(&self, id: RecordId, payload: &Payload) -> RepoResult<bool> {
        let result = self
            .query()
            .find_or_fail(id)
            .and_then(|record| self.store.update(&self.schema, record.id, payload, self.now()));
        self.observe_write("update", id, result)
    }

    /// Soft-deletes the record; schemas without soft deletes delete it outright.
    pub fn delete_by_id(&self, id: RecordId) -> RepoResult<bool> {
        let result = self.query().find_or_fail(id).and_then(|record| {
            if self.schema.soft_deletes() {
                self.store.soft_delete(&self.schema, record.id, self.now())
            } else {
                self.store.force_delete(&self.schema, record.id)
            }
        });
        self.observe_write("delete_by_id", id, result)
    }

    pub fn restore_by_id(&self, id: RecordId) -> RepoResult<bool> {
        let result = self
            .query()
            .only_trashed()
            .find_or_fail(id)
            .and_then(|record| self.store.restore(&self.schema, record.id, self.now()));
        self.observe_write("restore_by_id", id, result)
    }

    pub fn permanently_delete_by_id(&self, id: RecordId) -> RepoResult<bool> {
        let result = self
            .query()
            .with_trashed()
            .find_or_fail(id)
            .and_then(|record| self.store.force_delete(&self.schema, record.id));
        self.observe_write("permanently_delete_by_id", id, result)
    }

    fn fresh(&self, id: RecordId) -> RepoResult<Record> {
        if self.schema.soft_deletes() {
            self.query().with_trashed().find_or_fail(id)
        } else {
            self.query().find_or_fail(id)
        }
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    fn observe_write(
        &self,
        operation: &'static str,
        id: RecordId,
        result: RepoResult<bool>,
    ) -> RepoResult<bool> {
        if let Ok(changed) = &result {
            debug!(
                "event=repo_{operation} module=repo status=ok table={} id={id} changed={changed}",
                self.schema.table()
            );
        }
        self.observe(operation, Some(id), result)
    }

    fn observe<T>(
        &self,
        operation: &'static str,
        id: Option<RecordId>,
        result: RepoResult<T>,
    ) -> RepoResult<T> {
        if let Err(err) = &result {
            self.report_failure(operation, id, err);
        }
        result
    }

    fn report_failure(&self, operation: &'static str, id: Option<RecordId>, err: &RepoError) {
        let id = id.map_or_else(|| "-".to_string(), |id| id.to_string());
        if self.diagnostics == DiagnosticMode::DumpAndHalt {
            panic!(
                "repository failure dump: operation={operation} table={} id={id}\nerror: {err:#?}\nschema: {:#?}",
                self.schema.table(),
                self.schema
            );
        }
        error!(
            "event=repo_{operation} module=repo status=error table={} id={id} error_code={} error={err}",
            self.schema.table(),
            err.code()
        );
    }
}
