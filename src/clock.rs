use parking_lot::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Monotonic-ish time source used by every temporal check in the pipeline.
/// Production uses the system clock; tests inject `FixedClock` so temporal
/// edge cases (clock drift, expiry) are deterministic.
pub trait Clock: Send + Sync {
    /// Wall-clock seconds since the Unix epoch.
    fn now(&self) -> i64;
    /// Monotonic seconds, used only for rate-limiter refill math.
    fn now_monotonic(&self) -> f64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    fn now_monotonic(&self) -> f64 {
        // Instant has no epoch, so for rate-limiter purposes we use the
        // same wall-clock source at sub-second resolution.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Deterministic clock for tests: starts at a fixed instant and only moves
/// when explicitly advanced.
pub struct FixedClock {
    seconds: Mutex<i64>,
}

impl FixedClock {
    pub fn new(seconds: i64) -> Self {
        Self {
            seconds: Mutex::new(seconds),
        }
    }

    pub fn advance(&self, delta_seconds: i64) {
        *self.seconds.lock() += delta_seconds;
    }

    pub fn set(&self, seconds: i64) {
        *self.seconds.lock() = seconds;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        *self.seconds.lock()
    }

    fn now_monotonic(&self) -> f64 {
        *self.seconds.lock() as f64
    }
}
