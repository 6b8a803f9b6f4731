//! Connectivity watchdog.
//!
//! Spec §4.12: tracks the last time market data was observed and grades
//! staleness into `Healthy`/`Degraded`/`Critical`. Grounded on the
//! teacher's heartbeat-tracking idiom in its WS client, generalized into a
//! standalone, clock-injected component.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityStatus {
    Healthy,
    Degraded,
    Critical,
}

pub struct ConnectivityWatchdog {
    clock: Arc<dyn Clock>,
    warning_ms: i64,
    critical_ms: i64,
    last_touch_ms: AtomicI64,
}

impl ConnectivityWatchdog {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, warning_ms: i64, critical_ms: i64) -> Self {
        let now = clock.now_ms();
        Self { clock, warning_ms, critical_ms, last_touch_ms: AtomicI64::new(now) }
    }

    pub fn touch(&self) {
        self.last_touch_ms.store(self.clock.now_ms(), Ordering::SeqCst);
    }

    /// `now - lastTouch`. Tolerates a clock that moves backward; the
    /// result may be negative, in which case [`status`](Self::status)
    /// resolves to `Healthy`.
    #[must_use]
    pub fn silence_ms(&self) -> i64 {
        self.clock.now_ms() - self.last_touch_ms.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn status(&self) -> ConnectivityStatus {
        let elapsed = self.silence_ms();
        if elapsed < self.warning_ms {
            ConnectivityStatus::Healthy
        } else if elapsed < self.critical_ms {
            ConnectivityStatus::Degraded
        } else {
            ConnectivityStatus::Critical
        }
    }

    #[must_use]
    pub fn should_block_entries(&self) -> bool {
        self.status() != ConnectivityStatus::Healthy
    }
}
