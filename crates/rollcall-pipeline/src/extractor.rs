//! The profile-extraction capability the orchestrator consumes.

use rollcall_browser::BrowserError;
use rollcall_core::{Identifier, ProfileRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why an extraction produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The page did not become ready in time
    Timeout,
    /// Navigation or browser-level error for this page
    BrowserError,
    /// Anything else
    Unknown,
    /// The extractor cannot be reached at all; fatal for the run
    Unavailable,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::BrowserError => write!(f, "browser error"),
            Self::Unknown => write!(f, "unknown"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Failed extraction of one target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct ExtractionFailure {
    /// Failure category
    pub kind: FailureKind,
    /// Human-readable cause
    pub detail: String,
}

impl ExtractionFailure {
    /// Failure of the given kind.
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Shorthand for a [`FailureKind::Timeout`] failure.
    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, detail)
    }

    /// Whether the run must stop rather than move on to the next target.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.kind == FailureKind::Unavailable
    }
}

impl From<BrowserError> for ExtractionFailure {
    fn from(err: BrowserError) -> Self {
        let kind = match &err {
            BrowserError::Timeout(_) => FailureKind::Timeout,
            BrowserError::SessionClosed => FailureKind::Unavailable,
            BrowserError::Navigation(_)
            | BrowserError::SelectorNotFound(_)
            | BrowserError::Chromium(_) => FailureKind::BrowserError,
        };
        Self::new(kind, err.to_string())
    }
}

/// Turns an identifier into a structured profile record.
#[async_trait::async_trait]
pub trait ProfileExtractor: Send + Sync {
    async fn extract(&self, identifier: &Identifier) -> Result<ProfileRecord, ExtractionFailure>;
}
