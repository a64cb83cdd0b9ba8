//! Process-wide source of the current instant.
//!
//! Every time-dependent step in the core (dispatch, resolution, returns,
//! accrual) reads the time from a [`Clock`] handed to it rather than from
//! the system directly. Production wiring uses [`SystemClock`]; tests drive
//! a [`ManualClock`] forward explicitly.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};

/// Errors that can occur when moving a manual clock.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// The requested instant is outside the representable range.
    #[error("clock out of range: cannot advance {millis}ms from {from}")]
    OutOfRange {
        /// Instant the clock was at.
        from: DateTime<Utc>,
        /// Requested step in milliseconds.
        millis: i64,
    },
}

/// A source of the current instant.
pub trait Clock: Send + Sync + core::fmt::Debug {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Stored as milliseconds since the Unix epoch in an atomic, so it can be
/// shared between the test body and spawned scheduler tasks.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// A clock frozen at `start` (truncated to the millisecond).
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    /// Jump to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        self.millis.store(instant.timestamp_millis(), Ordering::Release);
    }

    /// Move forward (or back, for negative deltas) by `delta` and return the
    /// new instant.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::OutOfRange`] if the result cannot be
    /// represented.
    pub fn advance(&self, delta: TimeDelta) -> Result<DateTime<Utc>, ClockError> {
        let from = self.now();
        let next = from
            .checked_add_signed(delta)
            .ok_or(ClockError::OutOfRange {
                from,
                millis: delta.num_milliseconds(),
            })?;
        self.set(next);
        Ok(next)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::Acquire)).unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn manual_clock_stands_still() {
        let clock = ManualClock::new(start());
        assert_eq!(clock.now(), start());
        assert_eq!(clock.now(), start());
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(start());
        let later = clock.advance(TimeDelta::hours(2)).unwrap();
        assert_eq!(later, clock.now());
        assert_eq!(later.signed_duration_since(start()), TimeDelta::hours(2));
    }

    #[test]
    fn manual_clock_rejects_overflow() {
        let clock = ManualClock::new(DateTime::<Utc>::MAX_UTC);
        assert!(clock.advance(TimeDelta::days(1)).is_err());
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
