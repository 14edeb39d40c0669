//! Error types for the ORM
//!
//! One taxonomy for the whole crate: connection-level failures (retryable at
//! the pool by discarding the connection), pool lifecycle failures, statement
//! failures (never retried), row decode failures, and transaction failures.

use thiserror::Error;

/// Result type alias for ORM operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error type covering every failure the ORM surfaces
#[derive(Debug, Clone, Error)]
pub enum OrmError {
    /// Network or authentication failure while opening or using a connection
    #[error("connection error: {0}")]
    Connection(String),

    /// No connection became available before the acquisition timeout
    #[error("pool timeout after {waited_ms}ms")]
    PoolTimeout { waited_ms: u64 },

    /// The pool has been shut down
    #[error("pool is closed")]
    PoolClosed,

    /// Statement-level failure: constraint violation, syntax error
    #[error("statement error: {0}")]
    Statement(String),

    /// Row-to-model type mismatch; indicates a schema/model mismatch bug
    #[error("decode error: {0}")]
    Decode(String),

    /// Commit or rollback failure; the backing connection is discarded
    #[error("transaction error: {0}")]
    Transaction(String),

    /// `begin` was called on a handle that already has an open transaction
    #[error("transaction already open")]
    TransactionAlreadyOpen,

    /// Record not found in the named table
    #[error("record not found in table '{0}'")]
    NotFound(String),

    /// A `before-*` observer rejected the operation
    #[error("validation error: {0}")]
    Validation(String),

    /// Identity-based operation attempted on an unsaved instance
    #[error("primary key is missing")]
    MissingPrimaryKey,

    /// Bad connection or pool configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Query construction error
    #[error("query error: {0}")]
    Query(String),
}

impl OrmError {
    /// Whether the connection that produced this error must be discarded
    /// rather than returned to the idle pool.
    pub fn poisons_connection(&self) -> bool {
        matches!(self, OrmError::Connection(_) | OrmError::Transaction(_))
    }
}

impl From<sqlx::Error> for OrmError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Configuration(_) => OrmError::Connection(err.to_string()),
            sqlx::Error::Database(_) => OrmError::Statement(err.to_string()),
            sqlx::Error::RowNotFound => OrmError::NotFound(String::new()),
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::TypeNotFound { .. }
            | sqlx::Error::Decode(_) => OrmError::Decode(err.to_string()),
            _ => OrmError::Statement(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        OrmError::Decode(err.to_string())
    }
}
