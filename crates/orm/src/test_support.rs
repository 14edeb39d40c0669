//! Scriptable in-memory driver for tests
//!
//! Stands in for a network backend: records every statement issued (in
//! order, with its bound parameters) and serves scripted responses, so pool,
//! transaction, and facade behavior can be asserted without a live database.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::backend::{Dialect, Driver, DriverConnection, ExecResult};
use crate::config::DatabaseConfig;
use crate::error::{OrmError, OrmResult};
use crate::row::Row;
use crate::value::DbValue;

/// One scripted reply, consumed in FIFO order across all connections
pub enum FakeResponse {
    Rows(Vec<Row>),
    Exec(ExecResult),
    Error(OrmError),
}

#[derive(Clone, Default)]
pub struct FakeDriver {
    pub dialect: Option<Dialect>,
    pub statements: Arc<Mutex<Vec<(String, Vec<DbValue>)>>>,
    pub responses: Arc<Mutex<VecDeque<FakeResponse>>>,
    pub connect_count: Arc<AtomicUsize>,
    pub fail_connect: Arc<AtomicBool>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dialect(dialect: Dialect) -> Self {
        Self {
            dialect: Some(dialect),
            ..Self::default()
        }
    }

    pub fn push_response(&self, response: FakeResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Statements issued so far, in issue order.
    pub fn issued(&self) -> Vec<(String, Vec<DbValue>)> {
        self.statements.lock().unwrap().clone()
    }

    pub fn issued_sql(&self) -> Vec<String> {
        self.issued().into_iter().map(|(sql, _)| sql).collect()
    }

    fn next_response(&self) -> Option<FakeResponse> {
        self.responses.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn connect(&self, _config: &DatabaseConfig) -> OrmResult<Box<dyn DriverConnection>> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(OrmError::Connection("scripted connect failure".into()));
        }
        let id = self.connect_count.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            id,
            driver: self.clone(),
        }))
    }

    fn dialect(&self) -> Dialect {
        self.dialect.unwrap_or(Dialect::Sqlite)
    }
}

pub struct FakeConnection {
    pub id: usize,
    driver: FakeDriver,
}

impl FakeConnection {
    fn record(&self, sql: &str, params: &[DbValue]) {
        self.driver
            .statements
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
    }
}

#[async_trait]
impl DriverConnection for FakeConnection {
    async fn execute(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<ExecResult> {
        self.record(sql, params);
        match self.driver.next_response() {
            Some(FakeResponse::Exec(result)) => Ok(result),
            Some(FakeResponse::Error(err)) => Err(err),
            Some(FakeResponse::Rows(_)) | None => Ok(ExecResult {
                rows_affected: 1,
                last_insert_id: Some(1),
            }),
        }
    }

    async fn fetch_all(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<Vec<Row>> {
        self.record(sql, params);
        match self.driver.next_response() {
            Some(FakeResponse::Rows(rows)) => Ok(rows),
            Some(FakeResponse::Error(err)) => Err(err),
            _ => Ok(Vec::new()),
        }
    }

    async fn fetch_optional(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<Option<Row>> {
        self.record(sql, params);
        match self.driver.next_response() {
            Some(FakeResponse::Rows(rows)) => Ok(rows.into_iter().next()),
            Some(FakeResponse::Error(err)) => Err(err),
            _ => Ok(None),
        }
    }

    async fn ping(&mut self) -> OrmResult<()> {
        Ok(())
    }

    async fn close(self: Box<Self>) -> OrmResult<()> {
        Ok(())
    }
}

/// A single-row helper for scripting query results.
pub fn row(pairs: &[(&str, DbValue)]) -> Row {
    Row::new(
        pairs.iter().map(|(name, _)| name.to_string()).collect(),
        pairs.iter().map(|(_, value)| value.clone()).collect(),
    )
}
