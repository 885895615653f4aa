//! Time source and timezone-aware calendar helpers.
//!
//! Recurrence, materialization and streak reconciliation never read the
//! wall clock themselves. Callers resolve "now" and "today" through a
//! [`Clock`] and pass the values in, so every computation can be replayed
//! deterministically in tests.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};

use crate::error::{ConfigError, Result};

/// Largest accepted UTC offset, in minutes.
pub const MAX_UTC_OFFSET_MINUTES: i32 = 18 * 60;

/// Source of the current instant and the user's timezone.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Timezone used to turn instants into calendar dates.
    fn offset(&self) -> FixedOffset;

    /// Today's date in the configured timezone.
    fn today(&self) -> NaiveDate {
        local_date(self.now(), self.offset())
    }
}

/// Wall clock with a configured UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Build from an offset in minutes east of UTC.
    ///
    /// # Errors
    /// Returns an error if the offset is outside ±18 hours.
    pub fn from_offset_minutes(minutes: i32) -> Result<Self> {
        Ok(Self::new(offset_from_minutes(minutes)?))
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(utc_offset())
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

/// A clock frozen at one instant. Used by tests and replay.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Utc>,
    offset: FixedOffset,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self { now, offset }
    }

    /// A UTC clock at noon of `date`.
    pub fn at_date(date: NaiveDate) -> Self {
        let now = Utc.from_utc_datetime(&(date.and_time(NaiveTime::MIN) + Duration::hours(12)));
        Self::new(now, utc_offset())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

/// The UTC offset (+00:00).
pub fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// Convert minutes east of UTC into a [`FixedOffset`].
///
/// # Errors
/// Returns [`ConfigError::InvalidValue`] outside ±18 hours.
pub fn offset_from_minutes(minutes: i32) -> Result<FixedOffset> {
    if minutes.abs() > MAX_UTC_OFFSET_MINUTES {
        return Err(ConfigError::InvalidValue {
            key: "clock.utc_offset_minutes".to_string(),
            message: format!("{minutes} is outside ±{MAX_UTC_OFFSET_MINUTES}"),
        }
        .into());
    }
    FixedOffset::east_opt(minutes * 60).ok_or_else(|| {
        ConfigError::InvalidValue {
            key: "clock.utc_offset_minutes".to_string(),
            message: format!("{minutes} is not a valid offset"),
        }
        .into()
    })
}

/// Calendar date of `instant` as seen in `offset`.
pub fn local_date(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}
