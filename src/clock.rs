//! Time source for incarnation and backup timestamps.
//!
//! The core only needs instants that are unique and ordered. Backup ids are
//! derived from `(type, instant)`, so every clock here hands out strictly
//! increasing instants at microsecond resolution.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Supplies the current instant.
pub trait Clock: Send + Sync {
    /// Returns the current instant. Successive calls never return the same value.
    fn now(&self) -> DateTime<Utc>;
}

fn from_micros(micros: i64) -> DateTime<Utc> {
    Utc.timestamp_micros(micros)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Wall-clock time, bumped forward by a microsecond whenever two reads collide.
#[derive(Debug, Default)]
pub struct SystemClock {
    last_micros: AtomicI64,
}

impl SystemClock {
    /// Create a new system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_micros();
        let mut prev = self.last_micros.load(Ordering::Relaxed);
        loop {
            let next = wall.max(prev + 1);
            match self.last_micros.compare_exchange_weak(
                prev,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return from_micros(next),
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Deterministic clock for tests and scripted sessions.
///
/// Each read returns the current instant and then advances by `step`.
pub struct ManualClock {
    current_micros: AtomicI64,
    step_micros: i64,
}

impl ManualClock {
    /// Start at `start`, advancing one second per read.
    #[must_use]
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self::with_step(start, Duration::seconds(1))
    }

    /// Start at `start`, advancing `step` per read. Steps below one microsecond
    /// are raised to one microsecond.
    #[must_use]
    pub fn with_step(start: DateTime<Utc>, step: Duration) -> Self {
        let step_micros = step.num_microseconds().unwrap_or(1).max(1);
        Self {
            current_micros: AtomicI64::new(start.timestamp_micros()),
            step_micros,
        }
    }

    /// Move the clock forward without producing a reading.
    pub fn advance(&self, by: Duration) {
        let micros = by.num_microseconds().unwrap_or(0).max(0);
        self.current_micros.fetch_add(micros, Ordering::AcqRel);
    }

    /// The instant the next read will return.
    #[must_use]
    pub fn peek(&self) -> DateTime<Utc> {
        from_micros(self.current_micros.load(Ordering::Acquire))
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("next", &self.peek())
            .field("step_micros", &self.step_micros)
            .finish()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        from_micros(
            self.current_micros
                .fetch_add(self.step_micros, Ordering::AcqRel),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_strictly_increasing() {
        let clock = SystemClock::new();
        let mut prev = clock.now();
        for _ in 0..1000 {
            let next = clock.now();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn manual_clock_steps_and_advances() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::starting_at(start);
        assert_eq!(clock.now(), start);
        assert_eq!(clock.now(), start + Duration::seconds(1));

        clock.advance(Duration::minutes(5));
        assert_eq!(clock.peek(), start + Duration::seconds(2) + Duration::minutes(5));
    }

    #[test]
    fn manual_clock_zero_step_still_moves() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::with_step(start, Duration::zero());
        let a = clock.now();
        let b = clock.now();
        assert!(b > a);
    }
}
