//! PostgreSQL backend

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::postgres::{PgArguments, PgConnection, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, Postgres, Row as _, TypeInfo, ValueRef};

use super::{Dialect, Driver, DriverConnection, ExecResult};
use crate::config::DatabaseConfig;
use crate::error::{OrmError, OrmResult};
use crate::row::Row;
use crate::value::DbValue;

pub struct PostgresDriver;

#[async_trait]
impl Driver for PostgresDriver {
    async fn connect(&self, config: &DatabaseConfig) -> OrmResult<Box<dyn DriverConnection>> {
        let url = config.connection_url();
        tracing::debug!(host = %config.host, database = %config.database, "opening postgres connection");
        let conn = PgConnection::connect(&url)
            .await
            .map_err(|e| OrmError::Connection(e.to_string()))?;
        Ok(Box::new(PostgresConnection { conn }))
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }
}

pub struct PostgresConnection {
    conn: PgConnection,
}

fn bind<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &DbValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        DbValue::Null => query.bind(None::<String>),
        DbValue::Bool(b) => query.bind(*b),
        DbValue::Int32(i) => query.bind(*i),
        DbValue::Int64(i) => query.bind(*i),
        DbValue::Float64(f) => query.bind(*f),
        DbValue::String(s) => query.bind(s.clone()),
        DbValue::Bytes(b) => query.bind(b.clone()),
        DbValue::Uuid(u) => query.bind(*u),
        DbValue::DateTime(dt) => query.bind(*dt),
        DbValue::Json(j) => query.bind(j.clone()),
    }
}

fn decode_row(row: &PgRow) -> OrmResult<Row> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (i, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        values.push(decode_value(row, i, column.type_info().name())?);
    }
    Ok(Row::new(columns, values))
}

fn decode_value(row: &PgRow, index: usize, type_name: &str) -> OrmResult<DbValue> {
    let raw = row.try_get_raw(index).map_err(OrmError::from)?;
    if raw.is_null() {
        return Ok(DbValue::Null);
    }
    let value = match type_name {
        "BOOL" => DbValue::Bool(row.try_get(index)?),
        "INT2" => DbValue::Int32(row.try_get::<i16, _>(index)? as i32),
        "INT4" => DbValue::Int32(row.try_get(index)?),
        "INT8" => DbValue::Int64(row.try_get(index)?),
        "FLOAT4" => DbValue::Float64(row.try_get::<f32, _>(index)? as f64),
        "FLOAT8" => DbValue::Float64(row.try_get(index)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => {
            DbValue::String(row.try_get(index)?)
        }
        "UUID" => DbValue::Uuid(row.try_get(index)?),
        "TIMESTAMPTZ" => DbValue::DateTime(row.try_get::<DateTime<Utc>, _>(index)?),
        "TIMESTAMP" => {
            let naive: NaiveDateTime = row.try_get(index)?;
            DbValue::DateTime(DateTime::from_naive_utc_and_offset(naive, Utc))
        }
        "DATE" => DbValue::String(row.try_get::<NaiveDate, _>(index)?.to_string()),
        "JSON" | "JSONB" => DbValue::Json(row.try_get(index)?),
        "BYTEA" => DbValue::Bytes(row.try_get(index)?),
        other => {
            return Err(OrmError::Decode(format!(
                "unsupported postgres column type '{}'",
                other
            )))
        }
    };
    Ok(value)
}

#[async_trait]
impl DriverConnection for PostgresConnection {
    async fn execute(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<ExecResult> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind(query, param);
        }
        let result = query.execute(&mut self.conn).await.map_err(OrmError::from)?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            // identity values travel through RETURNING on this backend
            last_insert_id: None,
        })
    }

    async fn fetch_all(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<Vec<Row>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind(query, param);
        }
        let rows = query.fetch_all(&mut self.conn).await.map_err(OrmError::from)?;
        rows.iter().map(decode_row).collect()
    }

    async fn fetch_optional(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<Option<Row>> {
        let mut query = sqlx::query(sql);
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
