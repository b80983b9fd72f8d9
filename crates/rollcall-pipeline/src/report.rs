//! Run statistics and the end-of-run report.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Counters accumulated over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub processed: usize,
    pub new_profiles: usize,
    pub duplicates: usize,
    pub errors: usize,
}

/// What a finished run hands to the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub stats: RunStatistics,
    /// Wall-clock duration of the run
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    /// Pending targets selected for this run
    pub total_considered: usize,
    /// Batch boundaries that triggered a pause
    #[serde(default)]
    pub batch_pauses: usize,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scraping finished in {}", format_duration(self.elapsed))?;
        writeln!(
            f,
            "  Total Processed: {}/{}",
            self.stats.processed, self.total_considered
        )?;
        writeln!(f, "  New Profiles:    {}", self.stats.new_profiles)?;
        writeln!(f, "  Duplicates:      {}", self.stats.duplicates)?;
        write!(f, "  Errors:          {}", self.stats.errors)
    }
}

/// Estimated time left, from the rate observed so far.
///
/// Returns `"Calculating..."` until at least one target is done.
#[must_use]
pub fn format_eta(processed: usize, total: usize, elapsed: Duration) -> String {
    if processed == 0 {
        return "Calculating...".to_string();
    }

    let elapsed = elapsed.as_secs_f64();
    #[allow(clippy::cast_precision_loss)]
    let rate = if elapsed > 0.0 {
        processed as f64 / elapsed
    } else {
        0.0
    };
    let remaining = total.saturating_sub(processed);
    #[allow(clippy::cast_precision_loss)]
    let eta = if rate > 0.0 {
        remaining as f64 / rate
    } else {
        0.0
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let eta = Duration::from_secs(eta as u64);
    format_duration(eta)
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
