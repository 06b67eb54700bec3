//! A clock that only moves when told to.

use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use mockable::Clock;
use parking_lot::Mutex;

/// Manually advanced clock shared by the engine and the reference backend.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Creates a clock stopped at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Creates a clock stopped at midday UTC of the given date.
    pub fn at(year: i32, month: u32, day: u32) -> Self {
        Self::new(
            Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
                .single()
                .expect("valid date"),
        )
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    /// Jumps to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }
}

impl Clock for FixedClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_only_on_request() {
        let clock = FixedClock::at(2026, 3, 1);
        let start = clock.utc();
        assert_eq!(clock.utc(), start);
        clock.advance(Duration::minutes(16));
        assert_eq!(clock.utc() - start, Duration::minutes(16));
    }
}
