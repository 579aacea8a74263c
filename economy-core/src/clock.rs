//! Time source for the engine
//!
//! Energy rollover, daily rewards, cooldowns and VIP expiry all read the
//! clock through this trait so the engine can be driven deterministically.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use parking_lot::Mutex;
use std::fmt;

/// Source of the current time
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Start at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Jump to `instant`
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock() = instant;
    }

    /// Move forward by `by`
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Calendar day of `instant` in the reference timezone
pub fn calendar_day(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}

/// Whole calendar days from `earlier` to `later` (negative if reversed)
pub fn days_between(earlier: DateTime<Utc>, later: DateTime<Utc>, offset: FixedOffset) -> i64 {
    (calendar_day(later, offset) - calendar_day(earlier, offset)).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_advance() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(Duration::hours(13));
        assert_eq!(clock.now(), Utc.with_ymd_and_hms(2025, 1, 2, 1, 0, 0).unwrap());
    }

    #[test]
    fn test_calendar_day_respects_offset() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let plus_three = FixedOffset::east_opt(3 * 3600).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 3, 10, 22, 30, 0).unwrap();

        assert_eq!(calendar_day(late, utc), NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
        assert_eq!(calendar_day(late, plus_three), NaiveDate::from_ymd_opt(2025, 3, 11).unwrap());
    }

    #[test]
    fn test_days_between_crosses_midnight() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let before = Utc.with_ymd_and_hms(2025, 3, 10, 23, 59, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 3, 11, 0, 1, 0).unwrap();
        assert_eq!(days_between(before, after, utc), 1);
        assert_eq!(days_between(after, after, utc), 0);
    }
}
