//! Connection pool
//!
//! A bounded set of live driver connections with strict borrow/return
//! discipline. Capacity is enforced by a semaphore (waiters queue FIFO), the
//! idle set is a LIFO stack so hot connections stay warm, and idle
//! connections past their TTL are evicted on the next acquisition. The pool
//! is the only shared mutable state in the crate; its bookkeeping is guarded
//! by one mutex that is never held across an await point.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::backend::{Dialect, Driver, DriverConnection, ExecResult};
use crate::config::DatabaseConfig;
use crate::error::{OrmError, OrmResult};
use crate::row::Row;
use crate::value::DbValue;

/// Pool sizing and lifetime knobs
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub capacity: u32,
    pub acquire_timeout: Duration,
    pub idle_ttl: Duration,
}

impl From<&DatabaseConfig> for PoolConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            capacity: config.pool_size.max(1),
            acquire_timeout: config.acquire_timeout,
            idle_ttl: config.idle_ttl,
        }
    }
}

/// Point-in-time pool counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: u32,
    pub live: u32,
    pub idle: u32,
    pub in_use: u32,
}

struct IdleConn {
    conn: Box<dyn DriverConnection>,
    parked_at: Instant,
}

struct PoolState {
    idle: Vec<IdleConn>,
    live: u32,
    closed: bool,
}

pub(crate) struct PoolInner {
    driver: Box<dyn Driver>,
    db_config: DatabaseConfig,
    config: PoolConfig,
    semaphore: Arc<Semaphore>,
    state: Mutex<PoolState>,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Bounded connection pool; cheap to clone and share across tasks
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    pub fn new(driver: Box<dyn Driver>, db_config: DatabaseConfig) -> Self {
        let config = PoolConfig::from(&db_config);
        Self {
            inner: Arc::new(PoolInner {
                semaphore: Arc::new(Semaphore::new(config.capacity as usize)),
                state: Mutex::new(PoolState {
                    idle: Vec::new(),
                    live: 0,
                    closed: false,
                }),
                driver,
                db_config,
                config,
            }),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.inner.driver.dialect()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Borrow a connection, waiting up to the configured acquisition timeout.
    pub async fn acquire(&self) -> OrmResult<PooledConnection> {
        self.acquire_timeout(self.inner.config.acquire_timeout).await
    }

    /// Borrow a connection, waiting at most `timeout` for a free slot.
    pub async fn acquire_timeout(&self, timeout: Duration) -> OrmResult<PooledConnection> {
        if self.inner.lock().closed {
            return Err(OrmError::PoolClosed);
        }

        let semaphore = Arc::clone(&self.inner.semaphore);
        let permit = match tokio::time::timeout(timeout, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            // the semaphore is closed during shutdown
            Ok(Err(_)) => return Err(OrmError::PoolClosed),
            Err(_) => {
                tracing::warn!(waited_ms = timeout.as_millis() as u64, "pool acquisition timed out");
                return Err(OrmError::PoolTimeout {
                    waited_ms: timeout.as_millis() as u64,
                });
            }
        };

        let reused = {
            let mut state = self.inner.lock();
            if state.closed {
                return Err(OrmError::PoolClosed);
            }
            let mut found = None;
            while let Some(idle) = state.idle.pop() {
                if idle.parked_at.elapsed() >= self.inner.config.idle_ttl {
                    // stale; drop it and keep looking, a fresh connection
                    // replaces it below
                    state.live -= 1;
                    tracing::debug!("evicted idle connection past ttl");
                    continue;
                }
                found = Some(idle.conn);
                break;
            }
            if found.is_none() {
                state.live += 1;
            }
            found
        };

        let conn = match reused {
            Some(conn) => conn,
            None => match self.inner.driver.connect(&self.inner.db_config).await {
                Ok(conn) => conn,
                Err(err) => {
                    self.inner.lock().live -= 1;
                    return Err(err);
                }
            },
        };

        tracing::debug!(stats = ?self.stats(), "connection acquired");
        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            _permit: permit,
            broken: false,
        })
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.lock();
        let idle = state.idle.len() as u32;
        PoolStats {
            capacity: self.inner.config.capacity,
            live: state.live,
            idle,
            in_use: state.live - idle,
        }
    }

    /// Drain every idle connection and shut the pool down. Subsequent
    /// acquisitions fail fast with `PoolClosed`; outstanding borrows are
    /// discarded when returned.
    pub async fn close(&self) {
        let drained: Vec<IdleConn> = {
            let mut state = self.inner.lock();
            state.closed = true;
            state.live -= state.idle.len() as u32;
            state.idle.drain(..).collect()
        };
        self.inner.semaphore.close();
        for idle in drained {
            if let Err(err) = idle.conn.close().await {
                tracing::warn!(error = %err, "error closing idle connection during shutdown");
            }
        }
        tracing::debug!("pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

/// An exclusively-borrowed connection; returns itself to the pool on drop
pub struct PooledConnection {
    conn: Option<Box<dyn DriverConnection>>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
    broken: bool,
}

impl PooledConnection {
    fn conn_mut(&mut self) -> OrmResult<&mut Box<dyn DriverConnection>> {
        self.conn
            .as_mut()
            .ok_or_else(|| OrmError::Connection("connection already released".into()))
    }

    pub async fn execute(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<ExecResult> {
        let result = self.conn_mut()?.execute(sql, params).await;
        self.poison_on_error(&result);
        result
    }

    pub async fn fetch_all(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<Vec<Row>> {
        let result = self.conn_mut()?.fetch_all(sql, params).await;
        self.poison_on_error(&result);
        result
    }

    pub async fn fetch_optional(&mut self, sql: &str, params: &[DbValue]) -> OrmResult<Option<Row>> {
        let result = self.conn_mut()?.fetch_optional(sql, params).await;
        self.poison_on_error(&result);
        result
    }

    pub async fn ping(&mut self) -> OrmResult<()> {
        self.conn_mut()?.ping().await
    }

    /// Mark the connection unfit for reuse; it will be discarded instead of
    /// parked when this borrow ends.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    fn poison_on_error<T>(&mut self, result: &OrmResult<T>) {
        if let Err(err) = result {
            if err.poisons_connection() {
                self.broken = true;
            }
        }
    }
}

// the boxed connection itself is opaque
impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("broken", &self.broken)
            .field("released", &self.conn.is_none())
            .finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let mut state = self.pool.state.lock().unwrap_or_else(|e| e.into_inner());
            if self.broken || state.closed {
                // underlying session closes when the boxed connection drops
                state.live -= 1;
            } else {
                state.idle.push(IdleConn {
                    conn,
                    parked_at: Instant::now(),
                });
            }
        }
        // permit drops after bookkeeping, waking the next waiter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Dialect;
    use crate::test_support::FakeDriver;

    fn pool_with(driver: FakeDriver, capacity: u32) -> Pool {
        let config = DatabaseConfig::sqlite_in_memory().pool_size(capacity);
        Pool::new(Box::new(driver), config)
    }

    #[tokio::test]
    async fn acquire_and_release_keeps_invariant() {
        let driver = FakeDriver::new();
        let pool = pool_with(driver, 3);

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        let stats = pool.stats();
        assert_eq!(stats.live, 2);
        assert_eq!(stats.in_use, 2);
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.idle + stats.in_use, stats.live);
        assert!(stats.live <= stats.capacity);

        drop(a);
        drop(b);
        let stats = pool.stats();
        assert_eq!(stats.live, 2);
        assert_eq!(stats.idle, 2);
        assert_eq!(stats.in_use, 0);
    }

    #[tokio::test]
    async fn second_acquire_times_out_at_capacity_one() {
        let driver = FakeDriver::new();
        let pool = pool_with(driver, 1);

        let held = pool.acquire().await.unwrap();
        let err = pool.acquire_timeout(Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, OrmError::PoolTimeout { .. }));

        drop(held);
        assert!(pool.acquire_timeout(Duration::ZERO).await.is_ok());
    }

    #[tokio::test]
    async fn idle_connections_are_reused_lifo() {
        let driver = FakeDriver::new();
        let pool = pool_with(driver.clone(), 2);

        let conn = pool.acquire().await.unwrap();
        drop(conn);
        let _conn = pool.acquire().await.unwrap();
        // second borrow reused the parked connection
        assert_eq!(driver.connect_count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_idle_connection_is_replaced() {
        let driver = FakeDriver::new();
        let config = DatabaseConfig::sqlite_in_memory()
            .pool_size(2)
            .idle_ttl(Duration::ZERO);
        let pool = Pool::new(Box::new(driver.clone()), config);

        let conn = pool.acquire().await.unwrap();
        drop(conn);
        let _conn = pool.acquire().await.unwrap();
        assert_eq!(driver.connect_count.load(std::sync::atomic::Ordering::SeqCst), 2);
        let stats = pool.stats();
        assert_eq!(stats.live, 1);
        assert_eq!(stats.in_use, 1);
    }

    #[tokio::test]
    async fn broken_connection_is_discarded_not_parked() {
        let driver = FakeDriver::new();
        let pool = pool_with(driver.clone(), 2);

        let mut conn = pool.acquire().await.unwrap();
        conn.mark_broken();
        drop(conn);

        let stats = pool.stats();
        assert_eq!(stats.live, 0);
        assert_eq!(stats.idle, 0);

        let _conn = pool.acquire().await.unwrap();
        assert_eq!(driver.connect_count.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn connection_errors_poison_the_borrow() {
        use crate::test_support::FakeResponse;

        let driver = FakeDriver::new();
        driver.push_response(FakeResponse::Error(OrmError::Connection("reset".into())));
        let pool = pool_with(driver, 1);

        let mut conn = pool.acquire().await.unwrap();
        assert!(conn.execute("SELECT 1", &[]).await.is_err());
        drop(conn);
        assert_eq!(pool.stats().live, 0);
    }

    #[tokio::test]
    async fn statement_errors_do_not_poison() {
        use crate::test_support::FakeResponse;

        let driver = FakeDriver::new();
        driver.push_response(FakeResponse::Error(OrmError::Statement(
            "unique violation".into(),
        )));
        let pool = pool_with(driver, 1);

        let mut conn = pool.acquire().await.unwrap();
        assert!(conn.execute("INSERT", &[]).await.is_err());
        drop(conn);
        assert_eq!(pool.stats().idle, 1);
    }

    #[tokio::test]
    async fn closed_pool_fails_fast() {
        let driver = FakeDriver::new();
        let pool = pool_with(driver, 2);

        let conn = pool.acquire().await.unwrap();
        pool.close().await;
        assert!(pool.is_closed());
        assert!(matches!(pool.acquire().await, Err(OrmError::PoolClosed)));

        // outstanding borrow is discarded on return, not re-pooled
        drop(conn);
        let stats = pool.stats();
        assert_eq!(stats.live, 0);
        assert_eq!(stats.idle, 0);
    }

    #[tokio::test]
    async fn waiter_is_woken_by_release() {
        let driver = FakeDriver::new();
        let pool = pool_with(driver, 1);

        let held = pool.acquire().await.unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire_timeout(Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;
        drop(held);
        let result = waiter.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn connect_failure_releases_reserved_slot() {
        let driver = FakeDriver::new();
        driver
            .fail_connect
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let pool = pool_with(driver.clone(), 1);

        assert!(matches!(pool.acquire().await, Err(OrmError::Connection(_))));
        assert_eq!(pool.stats().live, 0);

        driver
            .fail_connect
            .store(false, std::sync::atomic::Ordering::SeqCst);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn borrowed_connection_renders_debug_state() {
        let pool = pool_with(FakeDriver::new(), 1);
        let conn = pool.acquire().await.unwrap();
        let rendered = format!("{:?}", conn);
        assert!(rendered.contains("broken: false"));
        assert!(rendered.contains("released: false"));
    }

    #[test]
    fn dialect_comes_from_driver() {
        let pool = pool_with(FakeDriver::with_dialect(Dialect::Postgres), 1);
        assert_eq!(pool.dialect(), Dialect::Postgres);
    }
}
