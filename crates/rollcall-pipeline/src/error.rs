use crate::report::RunStatistics;
use rollcall_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Run interrupted after {} targets", stats.processed)]
    Interrupted { stats: RunStatistics },

    #[error("Profile extractor unavailable: {0}")]
    ExtractorUnavailable(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid run configuration: {0}")]
    Config(String),
}

impl PipelineError {
    /// Whether the run stopped because the operator asked it to.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
