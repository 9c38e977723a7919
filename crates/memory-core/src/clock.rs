//! Wall-clock abstraction
//!
//! Everything that needs "now" (cache TTLs, decay age, lifecycle
//! timestamps) goes through this trait instead of calling
//! `SystemTime::now()` directly, so tests can inject a [`FakeClock`]
//! and assert exact boundary behavior (spec §8 decay/TTL scenarios)
//! without sleeping.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current time, in seconds since epoch (spec §6: "all
/// persisted timestamps are seconds since epoch").
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> i64;

    fn now_millis(&self) -> i64 {
        self.now_secs() * 1000
    }
}

/// Real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_secs() as i64
    }
}

/// Deterministic clock for tests, gated the same way the teacher gates
/// its test-only fakes.
#[cfg(any(test, feature = "test-support"))]
pub struct FakeClock {
    now: AtomicI64,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeClock {
    pub fn new(start_secs: i64) -> Self {
        Self {
            now: AtomicI64::new(start_secs),
        }
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, secs: i64) {
        self.now.store(secs, Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Clock for FakeClock {
    fn now_secs(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances() {
        let clock = FakeClock::new(1000);
        assert_eq!(clock.now_secs(), 1000);
        clock.advance(60);
        assert_eq!(clock.now_secs(), 1060);
    }

    #[test]
    fn system_clock_is_plausible() {
        let now = SystemClock.now_secs();
        assert!(now > 1_700_000_000);
    }
}
