//! Injectable time source.
//!
//! Spec §4.3: no component may read system time directly. Every
//! time-dependent component (the watchdog, the lifecycle FSM, guards with
//! cooldowns, the WS manager's heartbeat check) takes a `Arc<dyn Clock>`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// A source of the current time, in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall-clock time via `chrono`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A test-injected clock that can be set and advanced, and may move
/// backward (callers must tolerate this; see `ConnectivityWatchdog`).
#[derive(Debug)]
pub struct FakeClock {
    millis: AtomicI64,
}

impl FakeClock {
    #[must_use]
    pub fn new(start_ms: i64) -> Arc<Self> {
        Arc::new(Self { millis: AtomicI64::new(start_ms) })
    }

    pub fn set(&self, ms: i64) {
        self.millis.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.millis.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances() {
        let clock = FakeClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);
    }

    #[test]
    fn fake_clock_can_move_backward() {
        let clock = FakeClock::new(1_000);
        clock.set(500);
        assert_eq!(clock.now_ms(), 500);
    }

    #[test]
    fn system_clock_is_monotonic_increasing_enough() {
        let clock = SystemClock;
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
