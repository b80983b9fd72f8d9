//! Rollcall Pipeline - target processing from queue to profile table.
//!
//! This crate drains the work queue: for each pending nickname it loads the
//! public profile, classifies it against the profiles already stored,
//! appends a snapshot row with change notes, and records the outcome back on
//! the queue.
//!
//! # Features
//!
//! - Adaptive pacing that slows down at batch boundaries and recovers during quiet periods
//! - Bounded retry for transient store errors
//! - Append-only profile history with per-cell change notes
//! - Graceful interruption that puts the in-flight target back to `Pending`
//!
//! # Example
//!
//! ```rust,ignore
//! use rollcall_pipeline::{ForumExtractor, RunConfig, RunOrchestrator};
//! use std::sync::Arc;
//!
//! let extractor = ForumExtractor::from_config(Arc::new(browser), &config, clock)?;
//! let orchestrator = RunOrchestrator::new(
//!     Arc::new(database),
//!     Arc::new(extractor),
//!     RunConfig::from_app_config(&config),
//!     clock,
//! );
//!
//! let report = orchestrator.run_configured().await?;
//! println!("{report}");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[allow(missing_docs)]
pub mod error;
pub mod extractor;
#[allow(missing_docs)]
pub mod forum;
#[allow(missing_docs)]
pub mod orchestrator;
#[allow(missing_docs)]
pub mod pacer;
#[allow(missing_docs)]
pub mod parser;
#[allow(missing_docs)]
pub mod reconcile;
#[allow(missing_docs)]
pub mod report;
#[allow(missing_docs)]
pub mod retry;

// Re-export commonly used types
pub use error::{PipelineError, Result};
pub use extractor::{ExtractionFailure, FailureKind, ProfileExtractor};
pub use forum::{ForumExtractor, ForumTimings};
pub use orchestrator::{RunConfig, RunOrchestrator};
pub use pacer::AdaptivePacer;
pub use parser::{convert_relative_date, ProfilePageParser, RecentPost};
pub use reconcile::{
    detect_changes, AppendOutcome, AppendStatus, ExistingRecordsCache, FieldChange,
    ReconciliationEngine,
};
pub use report::{format_eta, RunReport, RunStatistics};
pub use retry::RetryPolicy;
