//! Injectable time source
//!
//! Propagation delay, listing staleness and share-status polling all read
//! time through [`Clock`] so tests can drive them with [`ManualClock`]
//! instead of sleeping.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::Duration;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Block for `duration` (or pretend to)
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Manually driven time; `sleep` advances the clock instead of blocking
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let step = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
        *self.now.lock() += step;
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Whole-duration difference `later - earlier`, clamped at zero
pub fn elapsed(earlier: DateTime<Utc>, later: DateTime<Utc>) -> Duration {
    (later - earlier).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances_on_sleep() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        clock.sleep(Duration::from_secs(10));
        assert_eq!(elapsed(start, clock.now()), Duration::from_secs(10));

        clock.advance(Duration::from_secs(5));
        assert_eq!(elapsed(start, clock.now()), Duration::from_secs(15));
    }

    #[test]
    fn test_elapsed_clamps_negative() {
        let now = Utc::now();
        let earlier = now - chrono::Duration::seconds(3);
        assert_eq!(elapsed(now, earlier), Duration::ZERO);
    }
}
