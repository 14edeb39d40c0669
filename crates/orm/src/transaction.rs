//! Transaction management
//!
//! A transaction borrows exactly one pooled connection for its whole
//! lifetime; every statement issued through the handle runs on that
//! connection, in issue order. `commit`/`rollback` consume the handle and
//! return the connection to the pool. Dropping an open handle marks the
//! connection broken so it is discarded rather than re-pooled; closing the
//! session rolls the transaction back server-side, so a borrowed connection
//! can never leak mid-transaction.

use tracing::{debug, warn};

use crate::backend::ExecResult;
use crate::error::{OrmError, OrmResult};
use crate::pool::{Pool, PooledConnection};
use crate::row::Row;
use crate::value::DbValue;

/// A scoped unit of work bound to one borrowed connection
pub struct Transaction {
    conn: Option<PooledConnection>,
}

impl Transaction {
    /// Borrow a connection from the pool and open a transaction on it.
    pub async fn begin(pool: &Pool) -> OrmResult<Transaction> {
        let mut conn = pool.acquire().await?;
        conn.execute(pool.dialect().begin_sql(), &[])
            .await
            .map_err(|e| OrmError::Transaction(format!("failed to begin: {}", e)))?;
        debug!("transaction started");
        Ok(Transaction { conn: Some(conn) })
    }

    /// Nested transactions are not supported: a live handle always has an
    /// open transaction, so this is always `TransactionAlreadyOpen`.
    pub fn begin_nested(&self) -> OrmResult<()> {
        Err(OrmError::TransactionAlreadyOpen)
    }

    fn conn_mut(&mut self) -> OrmResult<&mut PooledConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| OrmError::Transaction("transaction already finished".into()))
    }

    pub async fn execute(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<ExecResult> {
        self.conn_mut()?.execute(sql, params).await
    }

    pub async fn fetch_all(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<Vec<Row>> {
        self.conn_mut()?.fetch_all(sql, params).await
    }

    pub async fn fetch_optional(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<Option<Row>> {
        self.conn_mut()?.fetch_optional(sql, params).await
    }

    /// Commit and release the connection. A failed commit leaves the
    /// connection suspect; it is discarded, never returned to the idle set.
    pub async fn commit(mut self) -> OrmResult<()> {
        let mut conn = self
            .conn
            .take()
            .ok_or_else(|| OrmError::Transaction("transaction already finished".into()))?;
        match conn.execute("COMMIT", &[]).await {
            Ok(_) => {
                debug!("transaction committed");
                Ok(())
            }
            Err(err) => {
                conn.mark_broken();
                Err(OrmError::Transaction(format!("commit failed: {}", err)))
            }
        }
    }

    /// Roll back and release the connection.
    pub async fn rollback(mut self) -> OrmResult<()> {
        let mut conn = self
            .conn
            .take()
            .ok_or_else(|| OrmError::Transaction("transaction already finished".into()))?;
        match conn.execute("ROLLBACK", &[]).await {
            Ok(_) => {
                debug!("transaction rolled back");
                Ok(())
            }
            Err(err) => {
                conn.mark_broken();
                Err(OrmError::Transaction(format!("rollback failed: {}", err)))
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            // Cannot await here; discarding the connection terminates the
            // backend session, which rolls the open transaction back.
            warn!("transaction dropped without commit or rollback; discarding its connection");
            conn.mark_broken();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::test_support::FakeDriver;

    fn pool_with(driver: FakeDriver) -> Pool {
        Pool::new(Box::new(driver), DatabaseConfig::sqlite_in_memory().pool_size(1))
    }

    #[tokio::test]
    async fn statements_run_in_order_on_one_connection() {
        let driver = FakeDriver::new();
        let pool = pool_with(driver.clone());

        let mut tx = Transaction::begin(&pool).await.unwrap();
        tx.execute("INSERT INTO t (a) VALUES ($1)", &[DbValue::Int64(1)])
            .await
            .unwrap();
        tx.execute("UPDATE t SET a = $1", &[DbValue::Int64(2)])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(
            driver.issued_sql(),
            vec![
                "BEGIN",
                "INSERT INTO t (a) VALUES ($1)",
                "UPDATE t SET a = $1",
                "COMMIT",
            ]
        );
        // connection returned to the idle set
        assert_eq!(pool.stats().idle, 1);
    }

    #[tokio::test]
    async fn rollback_sends_rollback_and_releases() {
        let driver = FakeDriver::new();
        let pool = pool_with(driver.clone());

        let mut tx = Transaction::begin(&pool).await.unwrap();
        tx.execute("INSERT INTO t (a) VALUES ($1)", &[DbValue::Int64(1)])
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(driver.issued_sql().last().unwrap(), "ROLLBACK");
        assert_eq!(pool.stats().idle, 1);
    }

    #[tokio::test]
    async fn transaction_holds_the_only_connection() {
        let driver = FakeDriver::new();
        let pool = pool_with(driver);

        let tx = Transaction::begin(&pool).await.unwrap();
        let err = pool
            .acquire_timeout(std::time::Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, OrmError::PoolTimeout { .. }));
        drop(tx);
    }

    #[tokio::test]
    async fn dropped_open_transaction_discards_connection() {
        let driver = FakeDriver::new();
        let pool = pool_with(driver.clone());

        {
            let mut tx = Transaction::begin(&pool).await.unwrap();
            tx.execute("INSERT INTO t (a) VALUES ($1)", &[DbValue::Int64(1)])
                .await
                .unwrap();
            // dropped without commit
        }

        let stats = pool.stats();
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.live, 0);
        assert!(!driver.issued_sql().contains(&"COMMIT".to_string()));

        // the slot is free again for a fresh connection
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn failed_commit_discards_connection() {
        use crate::test_support::FakeResponse;

        let driver = FakeDriver::new();
        let pool = pool_with(driver.clone());

        let tx = Transaction::begin(&pool).await.unwrap();
        driver.push_response(FakeResponse::Error(OrmError::Connection("reset".into())));
        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, OrmError::Transaction(_)));
        assert_eq!(pool.stats().live, 0);
    }

    #[tokio::test]
    async fn nested_begin_is_an_error() {
        let driver = FakeDriver::new();
        let pool = pool_with(driver);

        let tx = Transaction::begin(&pool).await.unwrap();
        assert!(matches!(
            tx.begin_nested(),
            Err(OrmError::TransactionAlreadyOpen)
        ));
        drop(tx);
    }

    #[tokio::test]
    async fn mysql_dialect_uses_start_transaction() {
        use crate::backend::Dialect;

        let driver = FakeDriver::with_dialect(Dialect::MySql);
        let pool = pool_with(driver.clone());

        let tx = Transaction::begin(&pool).await.unwrap();
        assert_eq!(driver.issued_sql(), vec!["START TRANSACTION"]);
        drop(tx);
    }
}
