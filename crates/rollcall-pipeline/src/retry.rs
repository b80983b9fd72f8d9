//! Bounded retry for store writes.

use rollcall_store::StoreError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retries transient store errors a fixed number of times with a fixed pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; zero is treated as one.
    #[must_use]
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempts are used up. The last error is returned.
    pub async fn run<T, F, Fut>(&self, what: &str, op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        self.attempt(what, None, op).await
    }

    /// Like [`RetryPolicy::run`], but gives up with the last error as soon
    /// as `cancel` fires during a backoff.
    pub async fn run_cancellable<T, F, Fut>(
        &self,
        what: &str,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        self.attempt(what, Some(cancel), op).await
    }

    async fn attempt<T, F, Fut>(
        &self,
        what: &str,
        cancel: Option<&CancellationToken>,
        mut op: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        what,
                        attempt,
                        self.max_attempts,
                        e,
                        self.backoff
                    );
                    let cancelled = match cancel {
                        Some(cancel) => tokio::select! {
                            () = cancel.cancelled() => true,
                            () = tokio::time::sleep(self.backoff) => false,
                        },
                        None => {
                            tokio::time::sleep(self.backoff).await;
                            false
                        }
                    };
                    if cancelled {
                        tracing::warn!("{} abandoned after attempt {}: cancelled", what, attempt);
                        return Err(e);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(60))
    }
}
