//! SQLite backend
//!
//! SQLite's column typing is dynamic; decoding leans on the declared type
//! name and falls back to text. Timestamps are stored as RFC 3339 text and
//! coerced back by `FromDbValue`.

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnection, SqliteRow};
use sqlx::{Column, Connection, Row as _, Sqlite, TypeInfo, ValueRef};

use super::{normalize_placeholders, Dialect, Driver, DriverConnection, ExecResult};
use crate::config::DatabaseConfig;
use crate::error::{OrmError, OrmResult};
use crate::row::Row;
use crate::value::DbValue;

pub struct SqliteDriver;

#[async_trait]
impl Driver for SqliteDriver {
    async fn connect(&self, config: &DatabaseConfig) -> OrmResult<Box<dyn DriverConnection>> {
        let url = config.connection_url();
        tracing::debug!(database = %config.database, "opening sqlite connection");
        let conn = SqliteConnection::connect(&url)
            .await
            .map_err(|e| OrmError::Connection(e.to_string()))?;
        Ok(Box::new(SqliteDriverConnection { conn }))
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }
}

pub struct SqliteDriverConnection {
    conn: SqliteConnection,
}

fn bind<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &DbValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        DbValue::Null => query.bind(None::<String>),
        DbValue::Bool(b) => query.bind(*b),
        DbValue::Int32(i) => query.bind(*i),
        DbValue::Int64(i) => query.bind(*i),
        DbValue::Float64(f) => query.bind(*f),
        DbValue::String(s) => query.bind(s.clone()),
        DbValue::Bytes(b) => query.bind(b.clone()),
        DbValue::Uuid(u) => query.bind(u.to_string()),
        DbValue::DateTime(dt) => query.bind(dt.to_rfc3339()),
        DbValue::Json(j) => query.bind(j.to_string()),
    }
}

fn decode_row(row: &SqliteRow) -> OrmResult<Row> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (i, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        values.push(decode_value(row, i, column.type_info().name())?);
    }
    Ok(Row::new(columns, values))
}

fn decode_value(row: &SqliteRow, index: usize, type_name: &str) -> OrmResult<DbValue> {
    let raw = row.try_get_raw(index).map_err(OrmError::from)?;
    if raw.is_null() {
        return Ok(DbValue::Null);
    }
    let value = match type_name {
        "INTEGER" => DbValue::Int64(row.try_get(index)?),
        "REAL" => DbValue::Float64(row.try_get(index)?),
        "BOOLEAN" => DbValue::Bool(row.try_get(index)?),
        "BLOB" => DbValue::Bytes(row.try_get(index)?),
        // TEXT covers declared DATETIME/DATE affinities as well
        _ => DbValue::String(row.try_get(index)?),
    };
    Ok(value)
}

#[async_trait]
impl DriverConnection for SqliteDriverConnection {
    async fn execute(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<ExecResult> {
        let sql = normalize_placeholders(sql);
        let mut query = sqlx::query(&sql);
        for param in params {
            query = bind(query, param);
        }
        let result = query.execute(&mut self.conn).await.map_err(OrmError::from)?;
        let last_insert_id = match result.last_insert_rowid() {
            0 => None,
            id => Some(id),
        };
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id,
        })
    }

    async fn fetch_all(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<Vec<Row>> {
        let sql = normalize_placeholders(sql);
        let mut query = sqlx::query(&sql);
        for param in params {
            query = bind(query, param);
        }
        let rows = query.fetch_all(&mut self.conn).await.map_err(OrmError::from)?;
        rows.iter().map(decode_row).collect()
    }

    async fn fetch_optional(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<Option<Row>> {
        let sql = normalize_placeholders(sql);
        let mut query = sqlx::query(&sql);
        for param in params {
            query = bind(query, param);
        }
        let row = query
            .fetch_optional(&mut self.conn)
            .await
            .map_err(OrmError::from)?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn ping(&mut self) -> OrmResult<()> {
        self.conn
            .ping()
            .await
            .map_err(|e| OrmError::Connection(e.to_string()))
    }

    async fn close(self: Box<Self>) -> OrmResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| OrmError::Connection(e.to_string()))
    }
}
