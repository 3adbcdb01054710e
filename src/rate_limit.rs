use crate::clock::Clock;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub const GLOBAL_KEY: &str = "global";

#[derive(Debug, Clone)]
struct BucketState {
    tokens: f64,
    last_update: f64,
}

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Tokens refilled per second (requests-per-minute / 60).
    pub rate: f64,
    /// Bucket capacity.
    pub burst: f64,
}

impl RateLimiterConfig {
    pub fn from_requests_per_minute(requests_per_minute: u32, burst_size: u32) -> Self {
        Self {
            rate: requests_per_minute as f64 / 60.0,
            burst: burst_size as f64,
        }
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::from_requests_per_minute(100, 120)
    }
}

/// Keyed token-bucket admission gate. Fail-open: the default key is the
/// single global bucket, matching the source behavior; an implementation
/// MAY key per-principal instead without changing the bucket semantics.
pub struct RateLimiter {
    config: RateLimiterConfig,
    clock: Arc<dyn Clock>,
    buckets: Mutex<HashMap<String, BucketState>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Admit a request under `key`, returning `true` if it is within the
    /// bucket's current budget.
    pub fn admit(&self, key: &str) -> bool {
        let now = self.clock.now_monotonic();
        let mut buckets = self.buckets.lock();

        let state = match buckets.get_mut(key) {
            None => {
                buckets.insert(
                    key.to_string(),
                    BucketState {
                        tokens: self.config.burst - 1.0,
                        last_update: now,
                    },
                );
                return true;
            }
            Some(state) => state,
        };

        let elapsed = (now - state.last_update).max(0.0);
        state.tokens = (state.tokens + elapsed * self.config.rate).min(self.config.burst);
        state.last_update = now;

        if state.tokens < 1.0 {
            false
        } else {
            state.tokens -= 1.0;
            true
        }
    }

    pub fn admit_global(&self) -> bool {
        self.admit(GLOBAL_KEY)
    }
}
