//! SQLite-backed entity store.
//!
//! # Responsibility
//! - Translate `SelectQuery` and write requests into parameterized SQL.
//! - Decode rows into `Record` values.
//!
//! # Invariants
//! - Values are always bound as parameters.
//! - Identifiers are interpolated only after schema/query validation.

use super::{Direction, EntityStore, Filter, SelectQuery, TrashScope};
use crate::model::record::{Record, RecordId};
use crate::model::schema::{
    EntitySchema, CREATED_AT_COLUMN, DELETED_AT_COLUMN, ID_COLUMN, UPDATED_AT_COLUMN,
};
use crate::model::value::{FieldValue, Payload};
use crate::repo::error::{RepoError, RepoResult};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, Row, ToSql};
use std::collections::BTreeSet;

/// Entity store over a caller-owned, migrated SQLite connection.
pub struct SqliteStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    /// Verifies the backing table carries every column `schema` reads.
    pub fn ensure_table(&self, schema: &EntitySchema) -> RepoResult<()> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1
            );",
            [schema.table()],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::MissingTable(schema.table().to_string()));
        }

        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({});", quote(schema.table())))?;
        let mut rows = stmt.query([])?;
        let mut present = BTreeSet::new();
        while let Some(row) = rows.next()? {
            let name: String = row.get(1)?;
            present.insert(name);
        }

        let mut required: Vec<&str> = lifecycle_columns(schema);
        required.extend(schema.columns().iter().map(String::as_str));
        for column in required {
            if !present.contains(column) {
                return Err(RepoError::UnknownColumn {
                    table: schema.table().to_string(),
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Returns a `CREATE TABLE IF NOT EXISTS` statement matching `schema`.
///
/// Fillable columns are declared without type affinity; applications that
/// need constraints should write their own migration.
pub fn create_table_sql(schema: &EntitySchema) -> String {
    let mut definitions = vec![format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote(ID_COLUMN))];
    definitions.extend(schema.columns().iter().map(|column| quote(column)));
    if schema.timestamps() {
        definitions.push(format!("{} INTEGER", quote(CREATED_AT_COLUMN)));
        definitions.push(format!("{} INTEGER", quote(UPDATED_AT_COLUMN)));
    }
    if schema.soft_deletes() {
        definitions.push(format!("{} INTEGER", quote(DELETED_AT_COLUMN)));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
        quote(schema.table()),
        definitions.join(",\n    ")
    )
}

impl EntityStore for SqliteStore<'_> {
    fn select(&self, schema: &EntitySchema, query: &SelectQuery) -> RepoResult<Vec<Record>> {
        query.validate(schema)?;
        let attributes = query.columns.resolve(schema)?;
        let mut selected: Vec<&str> = lifecycle_columns(schema);
        selected.extend(attributes.iter().copied());
        let select_list = selected
            .iter()
            .map(|column| quote(column))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!("SELECT {select_list} FROM {}", quote(schema.table()));
        let mut bind_values = Vec::new();
        push_where(&mut sql, &mut bind_values, schema, query);
        push_order(&mut sql, query);

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(FieldValue::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(FieldValue::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(FieldValue::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values.iter()))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_row(row, schema, &attributes)?);
        }
        Ok(records)
    }

    fn count(&self, schema: &EntitySchema, query: &SelectQuery) -> RepoResult<usize> {
        query.validate(schema)?;
        let mut sql = format!("SELECT COUNT(*) FROM {}", quote(schema.table()));
        let mut bind_values = Vec::new();
        push_where(&mut sql, &mut bind_values, schema, query);

        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(bind_values.iter()), |row| row.get(0))?;
        usize::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative row count `{count}`")))
    }

    fn insert(
        &self,
        schema: &EntitySchema,
        payload: &Payload,
        now_ms: i64,
    ) -> RepoResult<RecordId> {
        schema.ensure_fillable(payload)?;

        let mut columns: Vec<String> = payload.keys().map(|column| quote(column)).collect();
        let mut bind_values: Vec<FieldValue> = payload.values().cloned().collect();
        if schema.timestamps() {
            columns.push(quote(CREATED_AT_COLUMN));
            columns.push(quote(UPDATED_AT_COLUMN));
            bind_values.push(FieldValue::Integer(now_ms));
            bind_values.push(FieldValue::Integer(now_ms));
        }

        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES;", quote(schema.table()))
        } else {
            let placeholders = vec!["?"; columns.len()].join(", ");
            format!(
                "INSERT INTO {} ({}) VALUES ({placeholders});",
                quote(schema.table()),
                columns.join(", ")
            )
        };

        self.conn
            .execute(&sql, params_from_iter(bind_values.iter()))?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update(
        &self,
        schema: &EntitySchema,
        id: RecordId,
        payload: &Payload,
        now_ms: i64,
    ) -> RepoResult<bool> {
        schema.ensure_fillable(payload)?;

        let mut assignments: Vec<String> = payload
            .keys()
            .map(|column| format!("{} = ?", quote(column)))
            .collect();
        let mut bind_values: Vec<FieldValue> = payload.values().cloned().collect();
        if schema.timestamps() {
            assignments.push(format!("{} = ?", quote(UPDATED_AT_COLUMN)));
            bind_values.push(FieldValue::Integer(now_ms));
        }

        if assignments.is_empty() {
            let exists: i64 = self.conn.query_row(
                &format!(
                    "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1);",
                    quote(schema.table()),
                    quote(ID_COLUMN)
                ),
                [id],
                |row| row.get(0),
            )?;
            return Ok(exists == 1);
        }

        bind_values.push(FieldValue::Integer(id));
        let changed = self.conn.execute(
            &format!(
                "UPDATE {} SET {} WHERE {} = ?;",
                quote(schema.table()),
                assignments.join(", "),
                quote(ID_COLUMN)
            ),
            params_from_iter(bind_values.iter()),
        )?;
        Ok(changed > 0)
    }

    fn soft_delete(&self, schema: &EntitySchema, id: RecordId, now_ms: i64) -> RepoResult<bool> {
        schema.ensure_soft_deletes()?;
        let touch = if schema.timestamps() {
            format!(", {} = ?1", quote(UPDATED_AT_COLUMN))
        } else {
            String::new()
        };
        let changed = self.conn.execute(
            &format!(
                "UPDATE {table} SET {deleted} = ?1{touch} WHERE {id_col} = ?2 AND {deleted} IS NULL;",
                table = quote(schema.table()),
                deleted = quote(DELETED_AT_COLUMN),
                id_col = quote(ID_COLUMN),
            ),
            params![now_ms, id],
        )?;
        Ok(changed > 0)
    }

    fn restore(&self, schema: &EntitySchema, id: RecordId, now_ms: i64) -> RepoResult<bool> {
        schema.ensure_soft_deletes()?;
        let table = quote(schema.table());
        let deleted = quote(DELETED_AT_COLUMN);
        let id_col = quote(ID_COLUMN);

        let changed = if schema.timestamps() {
            self.conn.execute(
                &format!(
                    "UPDATE {table} SET {deleted} = NULL, {} = ?1 WHERE {id_col} = ?2 AND {deleted} IS NOT NULL;",
                    quote(UPDATED_AT_COLUMN)
                ),
                params![now_ms, id],
            )?
        } else {
            self.conn.execute(
                &format!(
                    "UPDATE {table} SET {deleted} = NULL WHERE {id_col} = ?1 AND {deleted} IS NOT NULL;"
                ),
                params![id],
            )?
        };
        Ok(changed > 0)
    }

    fn force_delete(&self, schema: &EntitySchema, id: RecordId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1;",
                quote(schema.table()),
                quote(ID_COLUMN)
            ),
            [id],
        )?;
        Ok(changed > 0)
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(Value::Null),
            Self::Bool(value) => ToSqlOutput::Owned(Value::Integer(i64::from(*value))),
            Self::Integer(value) => ToSqlOutput::Owned(Value::Integer(*value)),
            Self::Real(value) => ToSqlOutput::Owned(Value::Real(*value)),
            Self::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
        })
    }
}

impl FromSql for FieldValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Self::Null),
            ValueRef::Integer(value) => Ok(Self::Integer(value)),
            ValueRef::Real(value) => Ok(Self::Real(value)),
            ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                .map(|text| Self::Text(text.to_string()))
                .map_err(|err| FromSqlError::Other(Box::new(err))),
            ValueRef::Blob(_) => Err(FromSqlError::InvalidType),
        }
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

fn lifecycle_columns(schema: &EntitySchema) -> Vec<&'static str> {
    let mut columns = vec![ID_COLUMN];
    if schema.timestamps() {
        columns.push(CREATED_AT_COLUMN);
        columns.push(UPDATED_AT_COLUMN);
    }
    if schema.soft_deletes() {
        columns.push(DELETED_AT_COLUMN);
    }
    columns
}

fn push_where(
    sql: &mut String,
    bind_values: &mut Vec<FieldValue>,
    schema: &EntitySchema,
    query: &SelectQuery,
) {
    let mut clauses = Vec::new();

    if schema.soft_deletes() {
        match query.scope {
            TrashScope::WithoutTrashed => {
                clauses.push(format!("{} IS NULL", quote(DELETED_AT_COLUMN)));
            }
            TrashScope::OnlyTrashed => {
                clauses.push(format!("{} IS NOT NULL", quote(DELETED_AT_COLUMN)));
            }
            TrashScope::WithTrashed => {}
        }
    }

    for filter in &query.filters {
        let column = quote(filter.column());
        match filter {
            Filter::Eq(_, FieldValue::Null) | Filter::IsNull(_) => {
                clauses.push(format!("{column} IS NULL"));
            }
            Filter::Eq(_, value) => {
                clauses.push(format!("{column} = ?"));
                bind_values.push(value.clone());
            }
            Filter::In(_, values) if values.is_empty() => clauses.push("0 = 1".to_string()),
            Filter::In(_, values) => {
                let placeholders = vec!["?"; values.len()].join(", ");
                clauses.push(format!("{column} IN ({placeholders})"));
                bind_values.extend(values.iter().cloned());
            }
            Filter::NotNull(_) => clauses.push(format!("{column} IS NOT NULL")),
        }
    }

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
}

fn push_order(sql: &mut String, query: &SelectQuery) {
    let mut keys: Vec<String> = query
        .order
        .iter()
        .map(|(column, direction)| {
            let direction = match direction {
                Direction::Asc => "ASC",
                Direction::Desc => "DESC",
            };
            format!("{} {direction}", quote(column))
        })
        .collect();
    keys.push(format!("{} ASC", quote(ID_COLUMN)));
    sql.push_str(" ORDER BY ");
    sql.push_str(&keys.join(", "));
}

fn parse_row(row: &Row<'_>, schema: &EntitySchema, attributes: &[&str]) -> RepoResult<Record> {
    let mut record = Record::new(decode(row, 0, schema, ID_COLUMN)?);
    let mut index = 1;
    if schema.timestamps() {
        record.created_at = decode(row, index, schema, CREATED_AT_COLUMN)?;
        record.updated_at = decode(row, index + 1, schema, UPDATED_AT_COLUMN)?;
        index += 2;
    }
    if schema.soft_deletes() {
        record.deleted_at = decode(row, index, schema, DELETED_AT_COLUMN)?;
        index += 1;
    }
    for (offset, column) in attributes.iter().enumerate() {
        let value: FieldValue = decode(row, index + offset, schema, column)?;
        record.attributes.insert((*column).to_string(), value);
    }
    Ok(record)
}

/// Reads one cell; cells of an unexpected storage class are `InvalidData`.
fn decode<T: FromSql>(
    row: &Row<'_>,
    index: usize,
    schema: &EntitySchema,
    column: &str,
) -> RepoResult<T> {
    row.get(index).map_err(|err| match err {
        rusqlite::Error::FromSqlConversionFailure(..) | rusqlite::Error::InvalidColumnType(..) => {
            RepoError::InvalidData(format!("`{}`.`{column}`: {err}", schema.table()))
        }
        other => other.into(),
    })
}
