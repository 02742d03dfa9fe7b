use std::sync::Mutex;

use chrono::{DateTime, Duration, FixedOffset, Local, Offset, Utc};

/// Source of the current time. Every time-windowed rule reads `now` through this trait so
/// tests can freeze and advance time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Wall-clock time in the user's local time zone, used by dayparting and
    /// do-not-disturb.
    fn local_now(&self) -> DateTime<FixedOffset>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct MockClock {
    state: Mutex<(DateTime<Utc>, FixedOffset)>,
}

impl MockClock {
    /// Creates a clock frozen at `now` in UTC.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new((now, utc_offset())),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.lock().0 = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        state.0 += by;
    }

    /// Shifts the local time zone reported by [`Clock::local_now`].
    pub fn set_offset(&self, offset: FixedOffset) {
        self.lock().1 = offset;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, (DateTime<Utc>, FixedOffset)> {
        // A poisoned clock still holds a valid timestamp.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        self.lock().0
    }

    fn local_now(&self) -> DateTime<FixedOffset> {
        let (now, offset) = *self.lock();
        now.with_timezone(&offset)
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn mock_clock_advances() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let clock = MockClock::new(start);
        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now(), start + Duration::minutes(90));
    }

    #[test]
    fn mock_clock_reports_local_time_in_offset() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let clock = MockClock::new(start);
        clock.set_offset(FixedOffset::east_opt(8 * 3600).unwrap());
        assert_eq!(clock.local_now().hour(), 20);
        assert_eq!(clock.local_now(), start);
    }
}
