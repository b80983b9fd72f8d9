//! Database connection management.
//!
//! `StorePool` wraps a `SQLx` `SQLite` pool. File databases run in WAL mode
//! with a busy timeout; `:memory:` databases are pinned to one long-lived
//! connection, since every new connection would see an empty database.

use crate::error::{Result, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// In-memory database marker accepted by [`StorePool::new`].
pub const MEMORY: &str = ":memory:";

/// Connection pool for the work-queue database.
#[derive(Debug, Clone)]
pub struct StorePool {
    pool: Pool<Sqlite>,
}

impl StorePool {
    /// Open (creating if missing) the database at `path`.
    ///
    /// # Errors
    /// Returns `StoreError::Open` if the path is not valid UTF-8 or the
    /// database cannot be opened.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or_else(|| StoreError::Open("invalid database path: not valid UTF-8".to_string()))?;

        let pool = if path_str == MEMORY {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| StoreError::Open(format!("invalid connection string: {e}")))?;

            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
        } else {
            if let Some(dir) = path.as_ref().parent() {
                if !dir.as_os_str().is_empty() {
                    std::fs::create_dir_all(dir)?;
                }
            }

            let options = SqliteConnectOptions::new()
                .filename(path.as_ref())
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5))
                .foreign_keys(true);

            SqlitePoolOptions::new()
                .max_connections(4)
                .connect_with(options)
                .await
        }
        .map_err(|e| StoreError::Open(format!("failed to open {path_str}: {e}")))?;

        tracing::info!("Database pool created at {}", path_str);

        Ok(Self { pool })
    }

    /// Get a reference to the underlying `SQLx` pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Close the connection pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Database pool closed");
    }

    /// Check that the database answers queries.
    ///
    /// # Errors
    /// Returns `StoreError::Unavailable` if a trivial query fails.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pool_creation() {
        let pool = StorePool::new(MEMORY).await.expect("create pool");
        pool.ping().await.expect("ping");
    }

    #[tokio::test]
    async fn test_memory_pool_keeps_state() {
        let pool = StorePool::new(MEMORY).await.expect("create pool");
        sqlx::query("CREATE TABLE t (x INTEGER)")
            .execute(pool.pool())
            .await
            .expect("create table");
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t")
            .fetch_one(pool.pool())
            .await
            .expect("table still visible");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_file_pool_creates_parent_dir() {
        let tmp = tempfile::TempDir::new().expect("temp dir");
        let path = tmp.path().join("data").join("queue.db");
        let pool = StorePool::new(&path).await.expect("create pool");
        pool.ping().await.expect("ping");
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let pool = StorePool::new(MEMORY).await.expect("create pool");
        pool.close().await;
        let err = pool.ping().await.expect_err("closed pool");
        assert!(err.is_fatal());
    }
}
