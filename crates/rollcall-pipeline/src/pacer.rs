//! Adaptive inter-request delay.
//!
//! Delays ratchet up at batch boundaries and decay back toward the
//! configured baseline during sustained quiet periods. Each sleep is drawn
//! uniformly from the current range.

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// Hard ceiling for the lower delay bound, in seconds.
pub const MIN_DELAY_CEILING: f64 = 3.0;
/// Hard ceiling for the upper delay bound, in seconds.
pub const MAX_DELAY_CEILING: f64 = 6.0;

const DECAY_FACTOR: f64 = 0.95;
const BATCH_FACTOR: f64 = 1.1;
const DECAY_INTERVAL: Duration = Duration::from_secs(10);

/// Stateful delay controller for one run.
#[derive(Debug, Clone)]
pub struct AdaptivePacer {
    base_min: f64,
    base_max: f64,
    current_min: f64,
    current_max: f64,
    consecutive_hits: u32,
    last_reset: Instant,
}

impl AdaptivePacer {
    /// Create a pacer from the configured delay range, in seconds.
    ///
    /// Bases above the hard ceilings are clamped to them.
    #[must_use]
    pub fn new(min_delay: f64, max_delay: f64) -> Self {
        let base_min = min_delay.clamp(0.0, MIN_DELAY_CEILING);
        let base_max = max_delay.clamp(base_min, MAX_DELAY_CEILING);
        if base_min < min_delay || base_max < max_delay {
            tracing::warn!(
                "Delay range {:.2}-{:.2}s clamped to {:.2}-{:.2}s",
                min_delay,
                max_delay,
                base_min,
                base_max
            );
        }

        Self {
            base_min,
            base_max,
            current_min: base_min,
            current_max: base_max,
            consecutive_hits: 0,
            last_reset: Instant::now(),
        }
    }

    /// Current delay range `(min, max)` in seconds.
    #[must_use]
    pub fn current_range(&self) -> (f64, f64) {
        (self.current_min, self.current_max)
    }

    /// Configured baseline `(min, max)` in seconds.
    #[must_use]
    pub fn base_range(&self) -> (f64, f64) {
        (self.base_min, self.base_max)
    }

    #[must_use]
    pub fn consecutive_hits(&self) -> u32 {
        self.consecutive_hits
    }

    /// Record a provider-side rate-limit hit.
    pub fn on_rate_limited(&mut self) {
        self.consecutive_hits = self.consecutive_hits.saturating_add(1);
    }

    /// Adjust after a finished request: decay toward the baseline once more
    /// than ten seconds have passed since the last decay.
    pub fn on_success(&mut self) {
        self.consecutive_hits = self.consecutive_hits.saturating_sub(1);

        if self.last_reset.elapsed() > DECAY_INTERVAL {
            self.current_min = (self.current_min * DECAY_FACTOR).max(self.base_min);
            self.current_max = (self.current_max * DECAY_FACTOR).max(self.base_max);
            self.last_reset = Instant::now();
            tracing::debug!(
                "Delay decayed to {:.2}-{:.2}s",
                self.current_min,
                self.current_max
            );
        }
    }

    /// Adjust at a batch boundary: grow both bounds by 10%, capped.
    pub fn on_batch_complete(&mut self) {
        self.current_min = (self.current_min * BATCH_FACTOR)
            .max(self.base_min)
            .min(MIN_DELAY_CEILING);
        self.current_max = (self.current_max * BATCH_FACTOR)
            .max(self.base_max)
            .min(MAX_DELAY_CEILING);
        tracing::debug!(
            "Delay raised to {:.2}-{:.2}s after batch",
            self.current_min,
            self.current_max
        );
    }

    /// A delay drawn uniformly from the current range.
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        let secs = if self.current_max > self.current_min {
            rand::thread_rng().gen_range(self.current_min..=self.current_max)
        } else {
            self.current_min
        };
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Sleep for [`AdaptivePacer::next_delay`].
    pub async fn sleep(&self) {
        tokio::time::sleep(self.next_delay()).await;
    }
}
