//! Fixed-offset local clock.
//!
//! The forum and the operators work in one local timezone, so every timestamp
//! written to the store (remarks, notes, scrape times) is rendered in a fixed
//! UTC offset rather than in the host's timezone.

use crate::error::{Result, RollcallError};
use chrono::{DateTime, FixedOffset, Offset, Utc};

/// Default offset: UTC+5.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 5 * 60;

/// `dd-Mon-yy hh:mm AM`, used for remarks, notes and scrape times.
pub const FULL_FORMAT: &str = "%d-%b-%y %I:%M %p";

/// `dd-Mon-yy`, used for dates resolved from relative text.
pub const DATE_FORMAT: &str = "%d-%b-%y";

/// Clock producing timestamps in a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalClock {
    offset: FixedOffset,
}

impl LocalClock {
    /// Create a clock for the given offset east of UTC, in minutes.
    ///
    /// # Errors
    /// Returns error if the offset is outside ±24 hours.
    pub fn new(offset_minutes: i32) -> Result<Self> {
        let offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
            RollcallError::Validation(format!("UTC offset out of range: {offset_minutes} minutes"))
        })?;
        Ok(Self { offset })
    }

    /// Current time in the clock's offset.
    #[must_use]
    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }

    /// Current time rendered with [`FULL_FORMAT`].
    #[must_use]
    pub fn stamp(&self) -> String {
        self.now().format(FULL_FORMAT).to_string()
    }

    /// The clock's UTC offset.
    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }
}

impl Default for LocalClock {
    fn default() -> Self {
        Self {
            offset: FixedOffset::east_opt(DEFAULT_UTC_OFFSET_MINUTES * 60)
                .unwrap_or_else(|| Utc.fix()),
        }
    }
}
