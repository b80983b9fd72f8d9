//! Store error types.
//!
//! Besides describing what went wrong, a `StoreError` says how the caller
//! should react: retry it ([`StoreError::is_transient`]), abort the run
//! ([`StoreError::is_fatal`]), or treat it as a failure of the one write.

use thiserror::Error;

/// Work-queue store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to open or create the database.
    #[error("failed to open database: {0}")]
    Open(String),

    /// Migration execution failed.
    #[error("migration failed: {0}")]
    Migration(String),

    /// The provider is throttling writes.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The store cannot be reached at all.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store refused a write.
    #[error("write rejected: {0}")]
    Rejected(String),

    /// Row with the given handle does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Failed to decode a stored value.
    #[error("decode error: {0}")]
    Decode(String),

    /// Underlying `SQLx` error.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error during database operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// SQLITE_BUSY and SQLITE_LOCKED; extended codes share the low byte.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

impl StoreError {
    /// Whether retrying the same operation after a pause may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited(_) => true,
            Self::Sqlx(sqlx::Error::PoolTimedOut) => true,
            Self::Sqlx(sqlx::Error::Database(db)) => db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)),
            _ => false,
        }
    }

    /// Whether the store is unreachable and the run must stop.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_)
                | Self::Open(_)
                | Self::Io(_)
                | Self::Sqlx(sqlx::Error::PoolClosed | sqlx::Error::Io(_))
        )
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
