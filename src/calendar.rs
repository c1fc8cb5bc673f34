//! Conversion between absolute instants and the agency's service-day clock.
//!
//! Observations carry wall-clock instants; the schedule speaks in seconds
//! from midnight of the local service day. [`Calendar`] is the capability the
//! engine is handed so tests can pin the conversion without a real timezone
//! database lookup.

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;

/// Converts absolute instants into the agency's local calendar.
pub trait Calendar: Send + Sync {
    /// Seconds elapsed since local midnight for the instant.
    fn seconds_into_day(&self, instant: DateTime<Utc>) -> i32;

    /// Local day of year (1-based), used to tell apart runs of the same
    /// block on different service days.
    fn day_of_year(&self, instant: DateTime<Utc>) -> u32;
}

/// [`Calendar`] implementation for a fixed agency timezone.
pub struct AgencyCalendar {
    tz: Tz,
}

impl AgencyCalendar {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Calendar for AgencyCalendar {
    fn seconds_into_day(&self, instant: DateTime<Utc>) -> i32 {
        instant.with_timezone(&self.tz).num_seconds_from_midnight() as i32
    }

    fn day_of_year(&self, instant: DateTime<Utc>) -> u32 {
        instant.with_timezone(&self.tz).ordinal()
    }
}
