//! Store-bound query builder.
//!
//! # Responsibility
//! - Accumulate projection, filters, trash scope, ordering and paging.
//! - Run the query, then eager-load relations and append computed attributes.
//!
//! # Invariants
//! - Terminal calls never log; logging belongs to `BaseRepository`.
//! - Unknown identifiers fail before the store is queried.

use crate::model::record::{Record, RecordId};
use crate::model::schema::EntitySchema;
use crate::model::value::FieldValue;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::relations::{eager_load, required_columns};
use crate::store::{Columns, Direction, EntityStore, Filter, SelectQuery, TrashScope};
use std::sync::Arc;

/// Projection, relations and computed attributes for repository reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    pub columns: Columns,
    /// Relation paths; dotted segments load nested relations.
    pub relations: Vec<String>,
    /// Computed attribute names registered on the schema.
    pub appends: Vec<String>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Columns::from_names(columns);
        self
    }

    pub fn with<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relations.extend(relations.into_iter().map(Into::into));
        self
    }

    pub fn append<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.appends.extend(names.into_iter().map(Into::into));
        self
    }
}

/// Fluent query over one schema, borrowed from a store.
pub struct QueryBuilder<'s, S: EntityStore + ?Sized> {
    store: &'s S,
    schema: Arc<EntitySchema>,
    query: SelectQuery,
    relations: Vec<String>,
    appends: Vec<String>,
}

impl<'s, S: EntityStore + ?Sized> QueryBuilder<'s, S> {
    pub fn new(store: &'s S, schema: Arc<EntitySchema>) -> Self {
        Self {
            store,
            schema,
            query: SelectQuery::default(),
            relations: Vec::new(),
            appends: Vec::new(),
        }
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    /// The accumulated store request.
    pub fn select_query(&self) -> &SelectQuery {
        &self.query
    }

    pub fn select<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.query.columns = Columns::from_names(columns);
        self
    }

    pub fn with<I, R>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.relations
            .extend(relations.into_iter().map(Into::into));
        self
    }

    pub fn append<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.appends.extend(names.into_iter().map(Into::into));
        self
    }

    /// Applies repository fetch options on top of the current state.
    pub fn apply(mut self, options: &FetchOptions) -> Self {
        self.query.columns = options.columns.clone();
        self.relations.extend(options.relations.iter().cloned());
        self.appends.extend(options.appends.iter().cloned());
        self
    }

    pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.query
            .filters
            .push(Filter::Eq(column.into(), value.into()));
        self
    }

    pub fn where_in<I, V>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.query.filters.push(Filter::In(column.into(), values));
        self
    }

    pub fn where_null(mut self, column: impl Into<String>) -> Self {
        self.query.filters.push(Filter::IsNull(column.into()));
        self
    }

    pub fn where_not_null(mut self, column: impl Into<String>) -> Self {
        self.query.filters.push(Filter::NotNull(column.into()));
        self
    }

    /// Includes soft-deleted rows.
    pub fn with_trashed(mut self) -> Self {
        self.query.scope = TrashScope::WithTrashed;
        self
    }

    /// Restricts to soft-deleted rows.
    pub fn only_trashed(mut self) -> Self {
        self.query.scope = TrashScope::OnlyTrashed;
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.query.order.push((column.into(), direction));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.query.offset = offset;
        self
    }

    pub fn get(self) -> RepoResult<Vec<Record>> {
        let Self {
            store,
            schema,
            mut query,
            relations,
            appends,
        } = self;

        for column in required_columns(&schema, &relations)? {
            query.columns.include(&column);
        }
        let accessors = appends
            .iter()
            .map(|name| schema.accessor(name).map(|accessor| (name, accessor)))
            .collect::<RepoResult<Vec<_>>>()?;

        let mut records = store.select(&schema, &query)?;
        eager_load(store, &schema, &mut records, &relations)?;

        for record in records.iter_mut() {
            for (name, accessor) in &accessors {
                let value = accessor(record);
                record.appended.insert((*name).clone(), value);
            }
        }
        Ok(records)
    }

    pub fn first(mut self) -> RepoResult<Option<Record>> {
        self.query.limit = Some(1);
        Ok(self.get()?.into_iter().next())
    }

    pub fn find(mut self, id: RecordId) -> RepoResult<Option<Record>> {
        self.query.filters.push(Filter::id_eq(id));
        self.first()
    }

    /// Like [`find`](Self::find), but a missing row is `RepoError::NotFound`.
    pub fn find_or_fail(self, id: RecordId) -> RepoResult<Record> {
        let table = self.schema.table().to_string();
        self.find(id)?
            .ok_or(RepoError::NotFound { table, id })
    }

    pub fn count(&self) -> RepoResult<usize> {
        self.store.count(&self.schema, &self.query)
    }
}
