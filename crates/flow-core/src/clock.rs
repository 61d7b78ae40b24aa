//! Time sources for cost computation.
//!
//! Cost models never read the wall clock directly; they go through a
//! [`Clock`] so wait-time penalties can be pinned in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of "now" in microseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_micros(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now_micros: u64) -> Self {
        Self {
            now: AtomicU64::new(now_micros),
        }
    }

    pub fn set(&self, now_micros: u64) {
        self.now.store(now_micros, Ordering::Relaxed);
    }

    pub fn advance_micros(&self, delta: u64) {
        self.now.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn advance_millis(&self, delta: u64) {
        self.advance_micros(delta * 1_000);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        clock.advance_millis(300);
        assert_eq!(clock.now_micros(), 301_000);

        clock.set(5);
        assert_eq!(clock.now_micros(), 5);
    }

    #[test]
    fn system_clock_is_past_2020() {
        // 2020-01-01T00:00:00Z in microseconds.
        assert!(SystemClock.now_micros() > 1_577_836_800_000_000);
    }
}
