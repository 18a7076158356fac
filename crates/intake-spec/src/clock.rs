use std::sync::{Mutex, PoisonError};

use jiff::civil::Date;
use jiff::tz::TimeZone;
use jiff::{SignedDuration, Timestamp, Zoned};

/// Source of "now" for debouncing, snapshot timestamps and age calculation.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
    fn today(&self) -> Date;
}

/// Wall clock in the system time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }

    fn today(&self) -> Date {
        Zoned::now().date()
    }
}

/// Clock that only moves when told to. Dates are taken in UTC.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: Timestamp) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Moves the clock forward; out-of-range results leave it unchanged.
    pub fn advance(&self, by: SignedDuration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        if let Ok(next) = now.checked_add(by) {
            *now = next;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn today(&self) -> Date {
        self.now().to_zoned(TimeZone::UTC).date()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_in_steps() {
        let start: Timestamp = "2026-04-15T09:00:00Z".parse().expect("timestamp");
        let clock = ManualClock::new(start);
        clock.advance(SignedDuration::from_millis(250));
        assert_eq!(clock.now(), start + SignedDuration::from_millis(250));
        assert_eq!(clock.today(), jiff::civil::date(2026, 4, 15));

        clock.set("2026-12-31T23:59:59Z".parse().expect("timestamp"));
        assert_eq!(clock.today(), jiff::civil::date(2026, 12, 31));
    }
}
