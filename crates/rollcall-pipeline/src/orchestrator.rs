//! The run loop: drain pending targets, extract, reconcile, record status.
//!
//! Each target goes through four steps:
//!
//! 1. Extract the profile through the [`ProfileExtractor`]
//! 2. Classify it against the existing-records cache (new or duplicate)
//! 3. Append and annotate through the [`ReconciliationEngine`]
//! 4. Record the outcome on the target's work-queue row
//!
//! Cancellation is checked before each target, after each extraction and
//! during every sleep, including the backoff between status write retries. A target interrupted mid-flight goes back to
//! `Pending` so the next run picks it up.

use crate::error::{PipelineError, Result};
use crate::extractor::{ExtractionFailure, ProfileExtractor};
use crate::pacer::AdaptivePacer;
use crate::reconcile::{AppendStatus, ReconciliationEngine};
use crate::report::{format_eta, RunReport, RunStatistics};
use crate::retry::RetryPolicy;
use rollcall_core::{
    AppConfig, Column, DuplicatePolicy, LocalClock, ProfileRecord, RowHandle, Target,
    TargetStatus,
};
use rollcall_store::WorkQueueStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Knobs for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Cap on targets taken from the queue; `None` takes all
    pub max_targets: Option<usize>,
    /// Targets between batch pauses; 0 disables batching
    pub batch_size: usize,
    /// Base delay range between targets, in seconds
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
    /// Fixed pause at each batch boundary
    pub batch_pause: Duration,
    /// Retry policy for store operations
    pub retry: RetryPolicy,
    pub duplicate_policy: DuplicatePolicy,
}

impl RunConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        let scraping = &config.scraping;
        Self {
            max_targets: (scraping.max_targets > 0).then_some(scraping.max_targets),
            batch_size: scraping.batch_size,
            min_delay_secs: scraping.min_delay_secs,
            max_delay_secs: scraping.max_delay_secs,
            batch_pause: Duration::from_secs(scraping.batch_pause_secs),
            retry: RetryPolicy::new(
                config.store.write_attempts,
                Duration::from_secs(config.store.retry_backoff_secs),
            ),
            duplicate_policy: scraping.duplicate_policy,
        }
    }

    /// Reject delay ranges the pacer cannot draw from.
    pub fn validate(&self) -> Result<()> {
        let (min, max) = (self.min_delay_secs, self.max_delay_secs);
        if !min.is_finite() || !max.is_finite() || min < 0.0 || min > max {
            return Err(PipelineError::Config(format!(
                "invalid delay range {min}-{max}s"
            )));
        }
        Ok(())
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

/// Drives one run over the work queue.
pub struct RunOrchestrator<S, E>
where
    S: WorkQueueStore + ?Sized,
    E: ProfileExtractor + ?Sized,
{
    store: Arc<S>,
    extractor: Arc<E>,
    config: RunConfig,
    clock: LocalClock,
    cancel: CancellationToken,
}

impl<S, E> RunOrchestrator<S, E>
where
    S: WorkQueueStore + ?Sized,
    E: ProfileExtractor + ?Sized,
{
    pub fn new(store: Arc<S>, extractor: Arc<E>, config: RunConfig, clock: LocalClock) -> Self {
        Self {
            store,
            extractor,
            config,
            clock,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned token, e.g. one cancelled on Ctrl-C.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that interrupts the run when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run with the configured target cap and batch size.
    pub async fn run_configured(&self) -> Result<RunReport> {
        self.run(self.config.max_targets, self.config.batch_size)
            .await
    }

    /// Process up to `max_targets` pending targets (all when `None` or 0).
    ///
    /// # Errors
    /// - `PipelineError::Interrupted` when cancelled; the counters so far
    ///   are carried in the error
    /// - `PipelineError::ExtractorUnavailable` when the browser session is gone
    /// - `PipelineError::Store` when the store is unreachable
    /// - `PipelineError::Config` when the delay range is unusable
    pub async fn run(&self, max_targets: Option<usize>, batch_size: usize) -> Result<RunReport> {
        self.config.validate()?;
        let started = Instant::now();
        let retry = self.config.retry;
        let store = &self.store;

        let mut pending = retry
            .run("list pending", || store.list_pending())
            .await?;
        if let Some(max) = max_targets.filter(|&max| max > 0) {
            pending.truncate(max);
        }
        let total = pending.len();
        tracing::info!("Processing {} pending profiles", total);

        let mut stats = RunStatistics::default();
        let mut batch_pauses = 0;
        if total == 0 {
            return Ok(self.report(stats, started, total, batch_pauses));
        }

        let mut engine =
            ReconciliationEngine::load(Arc::clone(&self.store), retry, self.clock).await?;
        let mut pacer = AdaptivePacer::new(self.config.min_delay_secs, self.config.max_delay_secs);

        for (index, target) in pending.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!("Run interrupted before {}", target.identifier);
                return Err(PipelineError::Interrupted { stats });
            }

            tracing::info!(
                "[{}/{}] [ETA: {}] {}",
                index + 1,
                total,
                format_eta(stats.processed, total, started.elapsed()),
                target.identifier
            );

            let extracted = self.extractor.extract(&target.identifier).await;

            if self.cancel.is_cancelled() {
                self.requeue_interrupted(target).await;
                return Err(PipelineError::Interrupted { stats });
            }

            self.process_target(target, extracted, &mut engine, &mut stats, &mut pacer)
                .await?;
            stats.processed += 1;

            if batch_size > 0 && stats.processed % batch_size == 0 && stats.processed < total {
                pacer.on_batch_complete();
                batch_pauses += 1;
                tracing::info!(
                    "Batch of {} complete, pausing {:?}",
                    batch_size,
                    self.config.batch_pause
                );
                if !self.pause(self.config.batch_pause).await {
                    tracing::warn!("Run interrupted during batch pause");
                    return Err(PipelineError::Interrupted { stats });
                }
            }

            pacer.on_success();
            if index + 1 < total && !self.pause(pacer.next_delay()).await {
                tracing::warn!("Run interrupted while waiting");
                return Err(PipelineError::Interrupted { stats });
            }
        }

        let report = self.report(stats, started, total, batch_pauses);
        tracing::info!(
            "Run complete: {} processed, {} new, {} duplicates, {} errors",
            stats.processed,
            stats.new_profiles,
            stats.duplicates,
            stats.errors
        );
        Ok(report)
    }

    async fn process_target(
        &self,
        target: &Target,
        extracted: std::result::Result<ProfileRecord, ExtractionFailure>,
        engine: &mut ReconciliationEngine<S>,
        stats: &mut RunStatistics,
        pacer: &mut AdaptivePacer,
    ) -> Result<()> {
        let stamp = self.clock.stamp();

        let record = match extracted {
            Ok(record) => record,
            Err(failure) if failure.is_fatal() => {
                tracing::error!("Extractor unavailable at {}: {}", target.identifier, failure);
                return Err(PipelineError::ExtractorUnavailable(failure.detail));
            }
            Err(failure) => {
                tracing::error!("Failed to scrape {}: {}", target.identifier, failure);
                stats.errors += 1;
                self.write_status(
                    target,
                    TargetStatus::Error,
                    &format!("Scrape failed @ {stamp}"),
                    pacer,
                )
                .await?;
                return Ok(());
            }
        };

        let original = engine.cache().get(&target.identifier).map(|cached| cached.row);
        let Some(original) = original else {
            let outcome = engine.append(&target.identifier, record, &target.source).await?;
            if outcome.status == AppendStatus::Error {
                return self.write_failed(target, &outcome.message, stats, pacer).await;
            }
            tracing::info!("New profile {}: {}", target.identifier, outcome.message);
            let remarks = format!("New profile @ {stamp}");
            if self.write_status(target, TargetStatus::Done, &remarks, pacer).await? {
                stats.new_profiles += 1;
            } else {
                stats.errors += 1;
            }
            return Ok(());
        };

        tracing::info!(
            "Duplicate {} (original row {})",
            target.identifier,
            original
        );

        // A duplicate always ends Done; a failed snapshot append is only logged.
        if self.config.duplicate_policy == DuplicatePolicy::Append {
            let outcome = engine.append(&target.identifier, record, &target.source).await?;
            if outcome.status == AppendStatus::Error {
                tracing::warn!(
                    "Failed to append snapshot for duplicate {}: {}",
                    target.identifier,
                    outcome.message
                );
            } else {
                tracing::debug!("{}: {}", target.identifier, outcome.message);
            }
        }

        self.note_duplicate(engine, original, &stamp).await?;

        let remarks = format!("Duplicate (row {original}) @ {stamp}");
        if self.write_status(target, TargetStatus::Done, &remarks, pacer).await? {
            stats.duplicates += 1;
        } else {
            stats.errors += 1;
        }
        Ok(())
    }

    async fn note_duplicate(
        &self,
        engine: &ReconciliationEngine<S>,
        original: RowHandle,
        stamp: &str,
    ) -> Result<()> {
        let note = format!("Duplicate attempt @ {stamp}");
        match engine.annotate(original, Column::NickName, &note).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                tracing::warn!("Failed to annotate original row {}: {}", original, e);
                Ok(())
            }
        }
    }

    async fn write_failed(
        &self,
        target: &Target,
        message: &str,
        stats: &mut RunStatistics,
        pacer: &mut AdaptivePacer,
    ) -> Result<()> {
        tracing::error!("Failed to store {}: {}", target.identifier, message);
        stats.errors += 1;
        let remarks = format!("Write failed @ {}: {}", self.clock.stamp(), message);
        self.write_status(target, TargetStatus::Error, &remarks, pacer)
            .await?;
        Ok(())
    }

    /// Returns `Ok(false)` when the write failed but the run can go on.
    async fn write_status(
        &self,
        target: &Target,
        status: TargetStatus,
        remarks: &str,
        pacer: &mut AdaptivePacer,
    ) -> Result<bool> {
        let store = &self.store;
        let row = target.queue_row;
        match self
            .config
            .retry
            .run_cancellable("update status", &self.cancel, || {
                store.update_status(row, status, remarks)
            })
            .await
        {
            Ok(()) => Ok(true),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                if e.is_transient() {
                    pacer.on_rate_limited();
                }
                tracing::error!(
                    "Failed to record {} for {} (queue row {}): {}",
                    status,
                    target.identifier,
                    row,
                    e
                );
                Ok(false)
            }
        }
    }

    /// Put the in-flight target back to `Pending`.
    ///
    /// Runs after cancellation, so the backoff is not cut short.
    async fn requeue_interrupted(&self, target: &Target) {
        let remarks = format!("Interrupted @ {}", self.clock.stamp());
        let store = &self.store;
        let row = target.queue_row;
        if let Err(e) = self
            .config
            .retry
            .run("requeue", || {
                store.update_status(row, TargetStatus::Pending, &remarks)
            })
            .await
        {
            tracing::warn!(
                "Failed to requeue interrupted target {}: {}",
                target.identifier,
                e
            );
        }
    }

    /// Sleep unless cancelled first; `false` means cancelled.
    async fn pause(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }

    fn report(
        &self,
        stats: RunStatistics,
        started: Instant,
        total: usize,
        batch_pauses: usize,
    ) -> RunReport {
        RunReport {
            stats,
            elapsed: started.elapsed(),
            total_considered: total,
            batch_pauses,
        }
    }
}
