//! Database backend abstraction
//!
//! One narrow capability interface per backend: open a connection from
//! configuration, execute a statement with bound parameters, run a query
//! returning rows, and close. Dialect quirks (placeholder syntax, identity
//! return, quoting) live behind `Dialect`; everything above this module is
//! backend-agnostic.

pub mod mysql;
pub mod postgres;
pub mod sqlite;

use async_trait::async_trait;

use crate::config::{BackendKind, DatabaseConfig};
use crate::error::OrmResult;
use crate::row::Row;
use crate::value::DbValue;

/// Outcome of a statement execution
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Generated identity for inserts on backends without RETURNING support.
    pub last_insert_id: Option<i64>,
}

/// Factory for live backend connections
#[async_trait]
pub trait Driver: Send + Sync {
    /// Open a new connection from the configuration.
    async fn connect(&self, config: &DatabaseConfig) -> OrmResult<Box<dyn DriverConnection>>;

    fn dialect(&self) -> Dialect;
}

/// A live backend session, owned exclusively by one borrower at a time
#[async_trait]
pub trait DriverConnection: Send {
    /// Execute a statement; placeholders in `sql` use `$n` syntax and are
    /// normalized to the backend's native form internally.
    async fn execute(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<ExecResult>;

    async fn fetch_all(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<Vec<Row>>;

    async fn fetch_optional(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<Option<Row>>;

    /// Cheap liveness probe used by the pool before re-lending a connection.
    async fn ping(&mut self) -> OrmResult<()>;

    async fn close(self: Box<Self>) -> OrmResult<()>;
}

/// SQL dialect differences the ORM has to know about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    /// Whether `INSERT … RETURNING <pk>` is the identity-return path.
    pub fn supports_returning(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    pub fn identifier_quote(&self) -> char {
        match self {
            Dialect::MySql => '`',
            _ => '"',
        }
    }

    pub fn begin_sql(&self) -> &'static str {
        match self {
            Dialect::MySql => "START TRANSACTION",
            _ => "BEGIN",
        }
    }
}

/// Select the driver implementation for a configured backend.
pub fn driver_for(kind: BackendKind) -> Box<dyn Driver> {
    match kind {
        BackendKind::Postgres => Box::new(postgres::PostgresDriver),
        BackendKind::MySql => Box::new(mysql::MySqlDriver),
        BackendKind::Sqlite => Box::new(sqlite::SqliteDriver),
    }
}

/// Rewrite `$n` placeholders to `?` for backends with positional-only
/// binding. The builder emits placeholders in strictly increasing textual
/// order, so dropping the index preserves parameter alignment.
pub(crate) fn normalize_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' && chars.peek().is_some_and(|n| n.is_ascii_digit()) {
            while chars.peek().is_some_and(|n| n.is_ascii_digit()) {
                chars.next();
            }
            out.push('?');
        } else {
            out.push(c);
        }
    }
    out
}
