//! MySQL-family backend
//!
//! Placeholders are rewritten from `$n` to `?` before execution; generated
//! identities come back through `last_insert_id` instead of RETURNING.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::mysql::{MySqlArguments, MySqlConnection, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, MySql, Row as _, TypeInfo, ValueRef};

use super::{normalize_placeholders, Dialect, Driver, DriverConnection, ExecResult};
use crate::config::DatabaseConfig;
use crate::error::{OrmError, OrmResult};
use crate::row::Row;
use crate::value::DbValue;

pub struct MySqlDriver;

#[async_trait]
impl Driver for MySqlDriver {
    async fn connect(&self, config: &DatabaseConfig) -> OrmResult<Box<dyn DriverConnection>> {
        let url = config.connection_url();
        tracing::debug!(host = %config.host, database = %config.database, "opening mysql connection");
        let conn = MySqlConnection::connect(&url)
            .await
            .map_err(|e| OrmError::Connection(e.to_string()))?;
        Ok(Box::new(MySqlDriverConnection { conn }))
    }

    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }
}

pub struct MySqlDriverConnection {
    conn: MySqlConnection,
}

fn bind<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &DbValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        DbValue::Null => query.bind(None::<String>),
        DbValue::Bool(b) => query.bind(*b),
        DbValue::Int32(i) => query.bind(*i),
        DbValue::Int64(i) => query.bind(*i),
        DbValue::Float64(f) => query.bind(*f),
        DbValue::String(s) => query.bind(s.clone()),
        DbValue::Bytes(b) => query.bind(b.clone()),
        DbValue::Uuid(u) => query.bind(u.to_string()),
        DbValue::DateTime(dt) => query.bind(*dt),
        DbValue::Json(j) => query.bind(j.clone()),
    }
}

fn decode_row(row: &MySqlRow) -> OrmResult<Row> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (i, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        values.push(decode_value(row, i, column.type_info().name())?);
    }
    Ok(Row::new(columns, values))
}

fn decode_value(row: &MySqlRow, index: usize, type_name: &str) -> OrmResult<DbValue> {
    let raw = row.try_get_raw(index).map_err(OrmError::from)?;
    if raw.is_null() {
        return Ok(DbValue::Null);
    }
    let value = match type_name {
        "BOOLEAN" => DbValue::Bool(row.try_get(index)?),
        "TINYINT" => DbValue::Int32(row.try_get::<i8, _>(index)? as i32),
        "SMALLINT" => DbValue::Int32(row.try_get::<i16, _>(index)? as i32),
        "INT" | "MEDIUMINT" => DbValue::Int32(row.try_get(index)?),
        "BIGINT" => DbValue::Int64(row.try_get(index)?),
        "INT UNSIGNED" | "BIGINT UNSIGNED" => {
            DbValue::Int64(row.try_get::<u64, _>(index)? as i64)
        }
        "FLOAT" => DbValue::Float64(row.try_get::<f32, _>(index)? as f64),
        "DOUBLE" => DbValue::Float64(row.try_get(index)?),
        "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" => {
            DbValue::String(row.try_get(index)?)
        }
        "TIMESTAMP" => DbValue::DateTime(row.try_get::<DateTime<Utc>, _>(index)?),
        "DATETIME" => {
            let naive: NaiveDateTime = row.try_get(index)?;
            DbValue::DateTime(DateTime::from_naive_utc_and_offset(naive, Utc))
        }
        "DATE" => DbValue::String(row.try_get::<NaiveDate, _>(index)?.to_string()),
        "JSON" => DbValue::Json(row.try_get(index)?),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => {
            DbValue::Bytes(row.try_get(index)?)
        }
        other => {
            return Err(OrmError::Decode(format!(
                "unsupported mysql column type '{}'",
                other
            )))
        }
    };
    Ok(value)
}

#[async_trait]
impl DriverConnection for MySqlDriverConnection {
    async fn execute(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<ExecResult> {
        let sql = normalize_placeholders(sql);
        let mut query = sqlx::query(&sql);
        for param in params {
            query = bind(query, param);
        }
        let result = query.execute(&mut self.conn).await.map_err(OrmError::from)?;
        let last_insert_id = match result.last_insert_id() {
            0 => None,
            id => Some(id as i64),
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
