//! Rollcall Work-Queue Store
//!
//! Durable storage for the run list (pending targets), the append-only
//! profile history, per-cell notes and the tag mapping. Backed by `SQLite`
//! through `SQLx`, with migrations embedded in the binary.
//!
//! # Example
//!
//! ```ignore
//! use rollcall_store::{Database, WorkQueueStore};
//!
//! let db = Database::open("rollcall.db").await?;
//! let pending = db.list_pending().await?;
//! ```
//!
//! # Tables
//!
//! - **run_list**: nickname, status (`Pending`/`Done`/`Error`), remarks, source
//! - **profiles**: one row per observation, 18 columns in fixed order
//! - **cell_notes**: at most one note per (row, column)
//! - **tags**: tag → nickname assignments, read as a lookup table

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod connection;
pub mod error;
pub mod migrations;
pub mod profiles;
pub mod run_list;
pub mod store;
pub mod tags;

pub use connection::{StorePool, MEMORY};
pub use error::{Result, StoreError};
pub use profiles::ProfileRow;
pub use store::WorkQueueStore;

use std::path::Path;

/// High-level database handle.
///
/// Opening a `Database` applies any pending migrations, so a fresh file is
/// ready for use immediately.
#[derive(Debug, Clone)]
pub struct Database {
    pool: StorePool,
}

impl Database {
    /// Open (or create) the database at `path` and migrate it.
    ///
    /// # Errors
    /// Returns `StoreError::Open` if the file cannot be opened and
    /// `StoreError::Migration` if the schema cannot be brought up to date.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let pool = StorePool::new(path).await?;
        migrations::run_migrations(pool.pool()).await?;
        Ok(Self { pool })
    }

    /// Fresh in-memory database, migrated. Mainly for tests.
    pub async fn in_memory() -> Result<Self> {
        Self::open(MEMORY).await
    }

    /// Get the current schema version.
    pub async fn get_schema_version(&self) -> Result<i64> {
        migrations::get_schema_version(self.pool.pool()).await
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Sqlite> {
        self.pool.pool()
    }

    /// Check that the database still answers queries.
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    /// Close the database connection gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
