//! Eager loading of schema relations.
//!
//! # Invariants
//! - One store query per relation per nesting level and per
//!   `MAX_KEYS_PER_QUERY` keys, so SQLite's bound-variable limit is never hit.
//! - Soft-deleted related rows are never attached.
//! - Relation paths are validated before any row is fetched.

use crate::model::record::{Record, RecordId, Related};
use crate::model::schema::{EntitySchema, Relation, RelationKind, ID_COLUMN};
use crate::model::value::FieldValue;
use crate::repo::error::RepoResult;
use crate::store::{EntityStore, Filter, SelectQuery};
use std::collections::{BTreeMap, BTreeSet};

/// Upper bound on keys bound into one `IN (...)` filter.
pub(crate) const MAX_KEYS_PER_QUERY: usize = 900;

/// Groups dotted relation paths by their first segment, keeping first-seen order.
fn group_paths(paths: &[String]) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for path in paths {
        let (head, tail) = match path.split_once('.') {
            Some((head, tail)) => (head, Some(tail)),
            None => (path.as_str(), None),
        };
        let index = match groups.iter().position(|(name, _)| name == head) {
            Some(index) => index,
            None => {
                groups.push((head.to_string(), Vec::new()));
                groups.len() - 1
            }
        };
        if let Some(tail) = tail {
            groups[index].1.push(tail.to_string());
        }
    }
    groups
}

/// Checks every segment of every path resolves to a relation.
pub(crate) fn validate_paths(schema: &EntitySchema, paths: &[String]) -> RepoResult<()> {
    for (name, nested) in group_paths(paths) {
        let relation = schema.relation(&name)?;
        validate_paths(&relation.related, &nested)?;
    }
    Ok(())
}

/// Columns the parent rows must carry so `paths` can be resolved.
pub(crate) fn required_columns(schema: &EntitySchema, paths: &[String]) -> RepoResult<Vec<String>> {
    let mut columns = Vec::new();
    for (name, _) in group_paths(paths) {
        let relation = schema.relation(&name)?;
        if relation.kind == RelationKind::BelongsTo {
            columns.push(relation.foreign_key.clone());
        }
    }
    Ok(columns)
}

/// Loads `paths` onto `records`, recursing into nested paths.
pub(crate) fn eager_load<S>(
    store: &S,
    schema: &EntitySchema,
    records: &mut [Record],
    paths: &[String],
) -> RepoResult<()>
where
    S: EntityStore + ?Sized,
{
    validate_paths(schema, paths)?;
    if records.is_empty() {
        return Ok(());
    }

    for (name, nested) in group_paths(paths) {
        let relation = schema.relation(&name)?;
        match relation.kind {
            RelationKind::HasMany | RelationKind::HasOne => {
                load_children(store, relation, records, &nested)?;
            }
            RelationKind::BelongsTo => load_owners(store, relation, records, &nested)?,
        }
    }
    Ok(())
}

fn load_children<S>(
    store: &S,
    relation: &Relation,
    records: &mut [Record],
    nested: &[String],
) -> RepoResult<()>
where
    S: EntityStore + ?Sized,
{
    let parent_ids: Vec<FieldValue> = records
        .iter()
        .map(|record| FieldValue::Integer(record.id))
        .collect();
    let mut children = select_in(
        store,
        &relation.related,
        &relation.foreign_key,
        &parent_ids,
    )?;
    eager_load(store, &relation.related, &mut children, nested)?;

    let mut grouped: BTreeMap<RecordId, Vec<Record>> = BTreeMap::new();
    for child in children {
        if let Some(parent_id) = foreign_key_of(&child, &relation.foreign_key) {
            grouped.entry(parent_id).or_default().push(child);
        }
    }

    for record in records.iter_mut() {
        let matched = grouped.remove(&record.id).unwrap_or_default();
        let related = match relation.kind {
            RelationKind::HasOne => Related::One(matched.into_iter().next().map(Box::new)),
            _ => Related::Many(matched),
        };
        record.relations.insert(relation.name.clone(), related);
    }
    Ok(())
}

fn load_owners<S>(
    store: &S,
    relation: &Relation,
    records: &mut [Record],
    nested: &[String],
) -> RepoResult<()>
where
    S: EntityStore + ?Sized,
{
    let keys: Vec<FieldValue> = records
        .iter()
        .filter_map(|record| foreign_key_of(record, &relation.foreign_key))
        .collect::<BTreeSet<RecordId>>()
        .into_iter()
        .map(FieldValue::Integer)
        .collect();

    let mut owners = select_in(store, &relation.related, ID_COLUMN, &keys)?;
    eager_load(store, &relation.related, &mut owners, nested)?;

    let by_id: BTreeMap<RecordId, Record> =
        owners.into_iter().map(|owner| (owner.id, owner)).collect();
    for record in records.iter_mut() {
        let owner = foreign_key_of(record, &relation.foreign_key)
            .and_then(|key| by_id.get(&key))
            .cloned()
            .map(Box::new);
        record
            .relations
            .insert(relation.name.clone(), Related::One(owner));
    }
    Ok(())
}

/// Fetches non-trashed rows whose `column` is in `keys`, in chunks.
///
/// Each chunk comes back in id order; a parent's children always share one
/// chunk because chunks split the parent key set.
fn select_in<S>(
    store: &S,
    schema: &EntitySchema,
    column: &str,
    keys: &[FieldValue],
) -> RepoResult<Vec<Record>>
where
    S: EntityStore + ?Sized,
{
    let mut rows = Vec::new();
    for chunk in keys.chunks(MAX_KEYS_PER_QUERY) {
        let query = SelectQuery {
            filters: vec![Filter::In(column.to_string(), chunk.to_vec())],
            ..SelectQuery::default()
        };
        rows.extend(store.select(schema, &query)?);
    }
    Ok(rows)
}

fn foreign_key_of(record: &Record, column: &str) -> Option<RecordId> {
    record.attributes.get(column).and_then(FieldValue::as_i64)
}
