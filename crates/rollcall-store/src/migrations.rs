//! Schema for the run list, the profile history, cell notes and tags.
//!
//! The SQL files under `migrations/` are compiled into the binary; sqlx
//! records what has been applied in `_sqlx_migrations`.

use crate::error::{Result, StoreError};
use sqlx::migrate::Migrator;
use sqlx::{Pool, Sqlite};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Highest migration version shipped with this build.
#[must_use]
pub fn latest_version() -> i64 {
    MIGRATOR.iter().map(|m| m.version).max().unwrap_or(0)
}

/// Bring the schema up to [`latest_version`]. Already applied steps are skipped.
///
/// # Errors
/// `StoreError::Migration` when a step fails.
pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    let before = get_schema_version(pool).await?;
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| StoreError::Migration(format!("schema upgrade from v{before} failed: {e}")))?;

    let after = get_schema_version(pool).await?;
    if after == before {
        tracing::debug!("Schema already at v{}", after);
    } else {
        tracing::info!("Schema upgraded v{} -> v{}", before, after);
    }
    Ok(())
}

/// Applied schema version; 0 on a fresh database.
pub async fn get_schema_version(pool: &Pool<Sqlite>) -> Result<i64> {
    let tracked: i64 = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations')",
    )
    .fetch_one(pool)
    .await?;
    if tracked == 0 {
        return Ok(0);
    }

    let version: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(version), 0) FROM _sqlx_migrations WHERE success = 1",
    )
    .fetch_one(pool)
    .await?;
    Ok(version)
}
