//! Reconciliation of freshly extracted records against stored history.
//!
//! The profile table is append-only. A record for a nickname that is
//! already known is still appended as a new row; the cells that changed
//! get a note on the new row recording the old value, and the cache moves
//! on to the new row as the latest known state.

use crate::retry::RetryPolicy;
use rollcall_core::{Column, Identifier, LocalClock, ProfileRecord, RowHandle};
use rollcall_store::{ProfileRow, StoreError, WorkQueueStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One changed cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub column: Column,
    pub old: String,
    pub new: String,
}

/// Classification of an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendStatus {
    New,
    UpdatedDuplicate,
    UnchangedDuplicate,
    Error,
}

impl fmt::Display for AppendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::UpdatedDuplicate => write!(f, "updated_duplicate"),
            Self::UnchangedDuplicate => write!(f, "unchanged_duplicate"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Result of [`ReconciliationEngine::append`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendOutcome {
    pub status: AppendStatus,
    /// The appended row; `None` when the write failed
    pub row: Option<RowHandle>,
    pub changed_fields: Vec<FieldChange>,
    pub message: String,
}

/// Fields that changed between two versions of a record.
///
/// A field counts as changed only when both values are non-empty and they
/// differ; a gap on either side is never a change.
#[must_use]
pub fn detect_changes(old: &ProfileRecord, new: &ProfileRecord) -> Vec<FieldChange> {
    Column::ALL
        .iter()
        .filter_map(|&column| {
            let old_value = old.get(column).trim();
            let new_value = new.get(column).trim();
            (!old_value.is_empty() && !new_value.is_empty() && old_value != new_value).then(|| {
                FieldChange {
                    column,
                    old: old_value.to_string(),
                    new: new_value.to_string(),
                }
            })
        })
        .collect()
}

/// Latest known row for one nickname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRecord {
    pub row: RowHandle,
    pub record: ProfileRecord,
}

/// Lowercased nickname → latest known row.
#[derive(Debug, Clone, Default)]
pub struct ExistingRecordsCache {
    entries: HashMap<String, CachedRecord>,
}

impl ExistingRecordsCache {
    /// Build from stored rows in insertion order; later rows win.
    ///
    /// Rows with a blank nickname are ignored.
    #[must_use]
    pub fn from_rows(rows: Vec<ProfileRow>) -> Self {
        let mut cache = Self::default();
        for row in rows {
            let record = row.record();
            let key = record.lookup_key();
            if key.is_empty() {
                continue;
            }
            cache.entries.insert(
                key,
                CachedRecord {
                    row: row.row,
                    record,
                },
            );
        }
        cache
    }

    #[must_use]
    pub fn get(&self, identifier: &Identifier) -> Option<&CachedRecord> {
        self.entries.get(&identifier.lookup_key())
    }

    #[must_use]
    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.entries.contains_key(&identifier.lookup_key())
    }

    /// Point `identifier` at `row`.
    pub fn insert(&mut self, identifier: &Identifier, row: RowHandle, record: ProfileRecord) {
        self.entries
            .insert(identifier.lookup_key(), CachedRecord { row, record });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Appends records to the store and keeps the cache and change notes current.
pub struct ReconciliationEngine<S: WorkQueueStore + ?Sized> {
    store: Arc<S>,
    cache: ExistingRecordsCache,
    tags: HashMap<String, String>,
    retry: RetryPolicy,
    clock: LocalClock,
}

impl<S: WorkQueueStore + ?Sized> ReconciliationEngine<S> {
    /// Create an engine over an already built cache and tag mapping.
    pub fn new(
        store: Arc<S>,
        cache: ExistingRecordsCache,
        tags: HashMap<String, String>,
        retry: RetryPolicy,
        clock: LocalClock,
    ) -> Self {
        Self {
            store,
            cache,
            tags,
            retry,
            clock,
        }
    }

    /// Load the full profile table and the tag mapping from the store.
    ///
    /// A tag mapping that cannot be read is logged and treated as empty,
    /// unless the store is unreachable.
    pub async fn load(
        store: Arc<S>,
        retry: RetryPolicy,
        clock: LocalClock,
    ) -> Result<Self, StoreError> {
        let rows = retry
            .run("load profiles", || store.load_all_profile_rows())
            .await?;
        let row_count = rows.len();
        let cache = ExistingRecordsCache::from_rows(rows);
        tracing::debug!(
            "Loaded {} existing profiles from {} rows",
            cache.len(),
            row_count
        );

        let tags = match retry.run("load tags", || store.load_tag_mapping()).await {
            Ok(tags) => tags,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!("Tag mapping unavailable, continuing without tags: {}", e);
                HashMap::new()
            }
        };
        tracing::debug!("Loaded {} tagged profiles", tags.len());

        Ok(Self::new(store, cache, tags, retry, clock))
    }

    #[must_use]
    pub fn cache(&self) -> &ExistingRecordsCache {
        &self.cache
    }

    /// Append `record` as a new row for `identifier`, tagging, diffing and
    /// annotating it.
    ///
    /// The row's NICK NAME is always the identifier, so the stored history
    /// and the cache agree on the key whatever nickname the page showed.
    /// Only an unreachable store is returned as `Err`; any other write
    /// failure is reported as [`AppendStatus::Error`] and leaves the cache
    /// untouched.
    pub async fn append(
        &mut self,
        identifier: &Identifier,
        mut record: ProfileRecord,
        source: &str,
    ) -> Result<AppendOutcome, StoreError> {
        record.set(Column::NickName, identifier.as_str());
        if let Some(tags) = self.tags.get(&identifier.lookup_key()) {
            record.set(Column::Tags, tags);
        }
        record.set(Column::Source, source);

        let previous = self.cache.get(identifier);
        let is_duplicate = previous.is_some();
        let changed_fields = previous
            .map(|cached| detect_changes(&cached.record, &record))
            .unwrap_or_default();

        let store = &self.store;
        let values = record.values().to_vec();
        let row = match self
            .retry
            .run("append profile", || store.append_profile_row(&values))
            .await
        {
            Ok(row) => row,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                return Ok(AppendOutcome {
                    status: AppendStatus::Error,
                    row: None,
                    changed_fields: Vec::new(),
                    message: e.to_string(),
                })
            }
        };

        for change in &changed_fields {
            let note = format!(
                "Changed from: {}\nNew: {}\nTime: {}",
                change.old,
                change.new,
                self.clock.stamp()
            );
            if let Err(e) = self.annotate(row, change.column, &note).await {
                tracing::warn!(
                    "Failed to annotate {} on row {}: {}",
                    change.column,
                    row,
                    e
                );
            }
        }

        let (status, message) = match (is_duplicate, changed_fields.is_empty()) {
            (false, _) => (AppendStatus::New, "New profile appended".to_string()),
            (true, true) => (
                AppendStatus::UnchangedDuplicate,
                "Duplicate appended (no changes)".to_string(),
            ),
            (true, false) => (
                AppendStatus::UpdatedDuplicate,
                format!("Duplicate appended with {} changes", changed_fields.len()),
            ),
        };

        self.cache.insert(identifier, row, record);

        Ok(AppendOutcome {
            status,
            row: Some(row),
            changed_fields,
            message,
        })
    }

    /// Write a cell note through the retry policy.
    pub async fn annotate(
        &self,
        row: RowHandle,
        column: Column,
        note: &str,
    ) -> Result<(), StoreError> {
        let store = &self.store;
        self.retry
            .run("annotate cell", || store.annotate_cell(row, column, note))
            .await
    }
}
