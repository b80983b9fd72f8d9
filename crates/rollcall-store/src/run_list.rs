//! Work-queue (`run_list` table) operations.
//!
//! Targets are inserted by a producer, read in row order by the pipeline and
//! have their status and remarks rewritten once per processing attempt.
//! Rows are never deleted here.

use crate::error::{Result, StoreError};
use rollcall_core::{Identifier, RowHandle, Target, TargetStatus};
use sqlx::{Pool, Row, Sqlite};

/// Source recorded when a row has none.
pub const DEFAULT_SOURCE: &str = "RunList";

/// Insert a new `Pending` target.
pub async fn enqueue_target(
    pool: &Pool<Sqlite>,
    nickname: &Identifier,
    source: &str,
) -> Result<RowHandle> {
    let source = if source.trim().is_empty() {
        DEFAULT_SOURCE
    } else {
        source.trim()
    };

    let result = sqlx::query(
        "INSERT INTO run_list (nickname, status, remarks, source) VALUES (?, ?, '', ?)",
    )
    .bind(nickname.as_str())
    .bind(TargetStatus::Pending.to_string())
    .bind(source)
    .execute(pool)
    .await?;

    Ok(RowHandle::new(result.last_insert_rowid()))
}

/// All `Pending` targets in row order.
///
/// Rows with a blank nickname are skipped.
pub async fn list_pending(pool: &Pool<Sqlite>) -> Result<Vec<Target>> {
    let rows = sqlx::query(
        "SELECT row_id, nickname, status, remarks, source
         FROM run_list
         WHERE status = ?
         ORDER BY row_id",
    )
    .bind(TargetStatus::Pending.to_string())
    .fetch_all(pool)
    .await?;

    let mut targets = Vec::with_capacity(rows.len());
    for row in rows {
        let nickname: String = row.try_get("nickname")?;
        let Ok(identifier) = Identifier::new(nickname) else {
            continue;
        };
        targets.push(target_from_row(identifier, &row)?);
    }

    Ok(targets)
}

/// Rewrite a target's status, and its remarks when `remarks` is non-empty.
///
/// # Errors
/// Returns `StoreError::NotFound` if the row does not exist.
pub async fn update_status(
    pool: &Pool<Sqlite>,
    row: RowHandle,
    status: TargetStatus,
    remarks: &str,
) -> Result<()> {
    let result = if remarks.is_empty() {
        sqlx::query("UPDATE run_list SET status = ? WHERE row_id = ?")
            .bind(status.to_string())
            .bind(row.get())
            .execute(pool)
            .await?
    } else {
        sqlx::query("UPDATE run_list SET status = ?, remarks = ? WHERE row_id = ?")
            .bind(status.to_string())
            .bind(remarks)
            .bind(row.get())
            .execute(pool)
            .await?
    };

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!("RunList row {row} not found")));
    }

    Ok(())
}

/// Fetch one target by row, whatever its status.
pub async fn get_target(pool: &Pool<Sqlite>, row: RowHandle) -> Result<Option<Target>> {
    let record = sqlx::query(
        "SELECT row_id, nickname, status, remarks, source FROM run_list WHERE row_id = ?",
    )
    .bind(row.get())
    .fetch_optional(pool)
    .await?;

    match record {
        Some(r) => {
            let nickname: String = r.try_get("nickname")?;
            let identifier =
                Identifier::new(nickname).map_err(|e| StoreError::Decode(e.to_string()))?;
            Ok(Some(target_from_row(identifier, &r)?))
        }
        None => Ok(None),
    }
}

/// Number of rows per status label, sorted by label.
pub async fn count_by_status(pool: &Pool<Sqlite>) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM run_list GROUP BY status ORDER BY status",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Put every `Error` target back to `Pending` so the next run retries it.
///
/// Returns the number of rows reset.
pub async fn reset_errors(pool: &Pool<Sqlite>, remarks: &str) -> Result<u64> {
    let result = sqlx::query("UPDATE run_list SET status = ?, remarks = ? WHERE status = ?")
        .bind(TargetStatus::Pending.to_string())
        .bind(remarks)
        .bind(TargetStatus::Error.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

fn target_from_row(identifier: Identifier, row: &sqlx::sqlite::SqliteRow) -> Result<Target> {
    let status_label: String = row.try_get("status")?;
    let source: String = row.try_get("source")?;

    Ok(Target {
        identifier,
        queue_row: RowHandle::new(row.try_get("row_id")?),
        status: TargetStatus::parse(&status_label)
            .unwrap_or_else(|| TargetStatus::normalize(&status_label)),
        remarks: row.try_get("remarks")?,
        source: if source.trim().is_empty() {
            DEFAULT_SOURCE.to_string()
        } else {
            source
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    async fn setup_test_db() -> Database {
        Database::in_memory().await.expect("create test database")
    }

    fn id(s: &str) -> Identifier {
        Identifier::new(s).expect("valid identifier")
    }

    #[tokio::test]
    async fn test_enqueue_and_list_pending_in_order() {
        let db = setup_test_db().await;
        let a = enqueue_target(db.pool(), &id("alice"), "Target").await.expect("enqueue");
        let b = enqueue_target(db.pool(), &id("bob"), "").await.expect("enqueue");

        let pending = list_pending(db.pool()).await.expect("list pending");
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].identifier.as_str(), "alice");
        assert_eq!(pending[0].queue_row, a);
        assert_eq!(pending[0].source, "Target");
        assert_eq!(pending[1].queue_row, b);
        assert_eq!(pending[1].source, DEFAULT_SOURCE);
    }

    #[tokio::test]
    async fn test_list_pending_skips_other_statuses_and_blank_nicknames() {
        let db = setup_test_db().await;
        let done = enqueue_target(db.pool(), &id("done-user"), "").await.expect("enqueue");
        update_status(db.pool(), done, TargetStatus::Done, "ok")
            .await
            .expect("update");
        sqlx::query("INSERT INTO run_list (nickname, status) VALUES ('  ', 'Pending')")
            .execute(db.pool())
            .await
            .expect("insert blank");
        enqueue_target(db.pool(), &id("carol"), "").await.expect("enqueue");

        let pending = list_pending(db.pool()).await.expect("list pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].identifier.as_str(), "carol");
    }

    #[tokio::test]
    async fn test_update_status_keeps_remarks_when_empty() {
        let db = setup_test_db().await;
        let row = enqueue_target(db.pool(), &id("dave"), "").await.expect("enqueue");

        update_status(db.pool(), row, TargetStatus::Error, "Scrape failed")
            .await
            .expect("update");
        update_status(db.pool(), row, TargetStatus::Done, "")
            .await
            .expect("update");

        let target = get_target(db.pool(), row).await.expect("get").expect("exists");
        assert_eq!(target.status, TargetStatus::Done);
        assert_eq!(target.remarks, "Scrape failed");
    }

    #[tokio::test]
    async fn test_update_status_missing_row() {
        let db = setup_test_db().await;
        let err = update_status(db.pool(), RowHandle::new(99), TargetStatus::Done, "x")
            .await
            .expect_err("missing row");
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reset_errors_and_counts() {
        let db = setup_test_db().await;
        let a = enqueue_target(db.pool(), &id("a1"), "").await.expect("enqueue");
        let b = enqueue_target(db.pool(), &id("b1"), "").await.expect("enqueue");
        enqueue_target(db.pool(), &id("c1"), "").await.expect("enqueue");
        update_status(db.pool(), a, TargetStatus::Error, "boom").await.expect("update");
        update_status(db.pool(), b, TargetStatus::Done, "ok").await.expect("update");

        let counts = count_by_status(db.pool()).await.expect("counts");
        assert_eq!(
            counts,
            vec![
                ("Done".to_string(), 1),
                ("Error".to_string(), 1),
                ("Pending".to_string(), 1)
            ]
        );

        let reset = reset_errors(db.pool(), "Reset by operator").await.expect("reset");
        assert_eq!(reset, 1);
        assert_eq!(list_pending(db.pool()).await.expect("pending").len(), 2);
    }
}
