//! The work-queue store interface the pipeline runs against.
//!
//! `Database` is the production implementation; tests substitute their own
//! (for instance to inject rate-limit errors).

use crate::error::Result;
use crate::profiles::ProfileRow;
use crate::{profiles, run_list, tags, Database};
use async_trait::async_trait;
use rollcall_core::{Column, RowHandle, Target, TargetStatus};
use std::collections::HashMap;

/// Operations the pipeline needs from durable storage.
#[async_trait]
pub trait WorkQueueStore: Send + Sync {
    /// Targets whose status is `Pending`, in queue order.
    async fn list_pending(&self) -> Result<Vec<Target>>;

    /// Set a target's status; `remarks` is written only when non-empty.
    async fn update_status(&self, row: RowHandle, status: TargetStatus, remarks: &str)
        -> Result<()>;

    /// Append a profile row and return its handle.
    async fn append_profile_row(&self, values: &[String]) -> Result<RowHandle>;

    /// Attach a note to one cell of a profile row.
    async fn annotate_cell(&self, row: RowHandle, column: Column, note: &str) -> Result<()>;

    /// All profile rows in insertion order.
    async fn load_all_profile_rows(&self) -> Result<Vec<ProfileRow>>;

    /// Lowercased nickname → joined tags.
    async fn load_tag_mapping(&self) -> Result<HashMap<String, String>>;
}

#[async_trait]
impl WorkQueueStore for Database {
    async fn list_pending(&self) -> Result<Vec<Target>> {
        run_list::list_pending(self.pool()).await
    }

    async fn update_status(
        &self,
        row: RowHandle,
        status: TargetStatus,
        remarks: &str,
    ) -> Result<()> {
        run_list::update_status(self.pool(), row, status, remarks).await
    }

    async fn append_profile_row(&self, values: &[String]) -> Result<RowHandle> {
        profiles::append_row(self.pool(), values).await
    }

    async fn annotate_cell(&self, row: RowHandle, column: Column, note: &str) -> Result<()> {
        profiles::annotate_cell(self.pool(), row, column, note).await
    }

    async fn load_all_profile_rows(&self) -> Result<Vec<ProfileRow>> {
        profiles::load_all(self.pool()).await
    }

    async fn load_tag_mapping(&self) -> Result<HashMap<String, String>> {
        tags::load_tag_mapping(self.pool()).await
    }
}
