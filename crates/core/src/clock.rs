// SPDX-License-Identifier: MIT

//! Clock abstraction so timestamps (`created_at`, `task_start_date`, ...)
//! are testable without sleeping real wall-clock time.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time for the engine.
///
/// All `*_date` fields on [`crate::Run`] and [`crate::Project`] are stamped
/// through this trait rather than calling `SystemTime::now()` directly, so
/// the scheduler's ordering and timeout invariants (§8) can be tested
/// deterministically.
pub trait Clock: Clone + Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn epoch_ms(&self) -> u64;

    /// Current time as an RFC3339 timestamp (for log lines and payloads).
    fn now_rfc3339(&self) -> String {
        let ms = self.epoch_ms();
        let secs = (ms / 1000) as i64;
        let nanos = ((ms % 1000) * 1_000_000) as u32;
        chrono::DateTime::from_timestamp(secs, nanos)
            .unwrap_or_default()
            .to_rfc3339()
    }
}

/// Real wall-clock time.
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Deterministic, manually-advanced clock for tests.
#[derive(Clone)]
pub struct FakeClock {
    millis: Arc<AtomicI64>,
}

impl FakeClock {
    pub fn new(start_epoch_ms: u64) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start_epoch_ms as i64)),
        }
    }

    /// Advance the clock by `ms` milliseconds, returning the new value.
    pub fn advance_ms(&self, ms: u64) -> u64 {
        self.millis.fetch_add(ms as i64, Ordering::SeqCst);
        self.epoch_ms()
    }

    pub fn set_ms(&self, epoch_ms: u64) {
        self.millis.store(epoch_ms as i64, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(1_700_000_000_000)
    }
}

impl Clock for FakeClock {
    fn epoch_ms(&self) -> u64 {
        self.millis.load(Ordering::SeqCst).max(0) as u64
    }
}
