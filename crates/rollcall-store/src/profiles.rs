//! Profile history (`profiles` table) and cell notes.
//!
//! The history is append-only: rows are added and annotated, never updated
//! or removed.

use crate::error::{Result, StoreError};
use chrono::Utc;
use rollcall_core::{Column, ProfileRecord, RowHandle, COLUMN_COUNT};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite};

/// One stored profile row with its handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRow {
    /// Handle of the stored row.
    pub row: RowHandle,
    /// Values in column order.
    pub values: Vec<String>,
}

impl ProfileRow {
    /// Rebuild the record held in this row.
    #[must_use]
    pub fn record(&self) -> ProfileRecord {
        ProfileRecord::from_row(&self.values)
    }
}

fn column_list() -> String {
    Column::ALL
        .iter()
        .map(|c| c.sql_name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Append a row at the end of the history.
///
/// Missing trailing values are stored empty and extra values are ignored.
pub async fn append_row(pool: &Pool<Sqlite>, values: &[String]) -> Result<RowHandle> {
    let placeholders = vec!["?"; COLUMN_COUNT].join(", ");
    let sql = format!(
        "INSERT INTO profiles ({}) VALUES ({placeholders})",
        column_list()
    );

    let mut query = sqlx::query(&sql);
    for i in 0..COLUMN_COUNT {
        query = query.bind(values.get(i).map_or("", String::as_str));
    }
    let result = query.execute(pool).await?;

    Ok(RowHandle::new(result.last_insert_rowid()))
}

/// Every stored row in insertion order.
pub async fn load_all(pool: &Pool<Sqlite>) -> Result<Vec<ProfileRow>> {
    let sql = format!("SELECT row_id, {} FROM profiles ORDER BY row_id", column_list());
    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    rows.iter()
        .map(|r| {
            let row = RowHandle::new(r.try_get::<i64, _>(0)?);
            let values = (1..=COLUMN_COUNT)
                .map(|i| r.try_get::<String, _>(i))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ProfileRow { row, values })
        })
        .collect()
}

/// Number of stored rows.
pub async fn profile_count(pool: &Pool<Sqlite>) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM profiles")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Attach a note to one cell, replacing any earlier note there.
///
/// # Errors
/// Returns `StoreError::NotFound` if the row does not exist.
pub async fn annotate_cell(
    pool: &Pool<Sqlite>,
    row: RowHandle,
    column: Column,
    note: &str,
) -> Result<()> {
    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM profiles WHERE row_id = ?")
        .bind(row.get())
        .fetch_one(pool)
        .await?
        > 0;

    if !exists {
        return Err(StoreError::NotFound(format!("Profile row {row} not found")));
    }

    sqlx::query(
        "INSERT INTO cell_notes (row_id, column_name, note, updated_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(row_id, column_name)
         DO UPDATE SET note = excluded.note, updated_at = excluded.updated_at",
    )
    .bind(row.get())
    .bind(column.sql_name())
    .bind(note)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// The note on one cell, if any.
pub async fn get_note(pool: &Pool<Sqlite>, row: RowHandle, column: Column) -> Result<Option<String>> {
    let note = sqlx::query_scalar::<_, String>(
        "SELECT note FROM cell_notes WHERE row_id = ? AND column_name = ?",
    )
    .bind(row.get())
    .bind(column.sql_name())
    .fetch_optional(pool)
    .await?;

    Ok(note)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    async fn setup_test_db() -> Database {
        Database::in_memory().await.expect("create test database")
    }

    fn sample(nick: &str, city: &str) -> Vec<String> {
        let mut record = ProfileRecord::new(nick);
        record.set(Column::City, city);
        record.into_row()
    }

    #[tokio::test]
    async fn test_append_and_load_in_order() {
        let db = setup_test_db().await;
        let first = append_row(db.pool(), &sample("alice", "Lahore"))
            .await
            .expect("append");
        let second = append_row(db.pool(), &sample("alice", "Karachi"))
            .await
            .expect("append");
        assert!(second.get() > first.get());

        let rows = load_all(db.pool()).await.expect("load");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row, first);
        assert_eq!(rows[0].record().get(Column::City), "Lahore");
        assert_eq!(rows[1].record().get(Column::City), "Karachi");
        assert_eq!(profile_count(db.pool()).await.expect("count"), 2);
    }

    #[tokio::test]
    async fn test_append_pads_short_rows() {
        let db = setup_test_db().await;
        append_row(db.pool(), &["bob".to_string()])
            .await
            .expect("append");

        let rows = load_all(db.pool()).await.expect("load");
        assert_eq!(rows[0].values.len(), COLUMN_COUNT);
        assert_eq!(rows[0].values[0], "bob");
        assert!(rows[0].values[1..].iter().all(String::is_empty));
    }

    #[tokio::test]
    async fn test_annotate_replaces_previous_note() {
        let db = setup_test_db().await;
        let row = append_row(db.pool(), &sample("carol", ""))
            .await
            .expect("append");

        annotate_cell(db.pool(), row, Column::City, "first")
            .await
            .expect("annotate");
        annotate_cell(db.pool(), row, Column::City, "second")
            .await
            .expect("annotate");

        assert_eq!(
            get_note(db.pool(), row, Column::City).await.expect("note"),
            Some("second".to_string())
        );
        assert_eq!(get_note(db.pool(), row, Column::Age).await.expect("note"), None);
    }

    #[tokio::test]
    async fn test_annotate_missing_row() {
        let db = setup_test_db().await;
        let err = annotate_cell(db.pool(), RowHandle::new(7), Column::NickName, "x")
            .await
            .expect_err("missing row");
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
