use crate::clock::Clock;
use crate::models::MetricsSnapshot;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-lifetime counters, read without locking via relaxed atomics.
/// None of these values need to be observed consistently with each other,
/// only to converge eventually.
pub struct Metrics {
    total_requests: AtomicU64,
    allow_count: AtomicU64,
    deny_count: AtomicU64,
    monitor_count: AtomicU64,
    rate_limit_hits: AtomicU64,
    replay_detections: AtomicU64,
    latency_ms_sum: AtomicU64,
    start_time: i64,
}

impl Metrics {
    pub fn new(clock: &Arc<dyn Clock>) -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            allow_count: AtomicU64::new(0),
            deny_count: AtomicU64::new(0),
            monitor_count: AtomicU64::new(0),
            rate_limit_hits: AtomicU64::new(0),
            replay_detections: AtomicU64::new(0),
            latency_ms_sum: AtomicU64::new(0),
            start_time: clock.now(),
        }
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_allow(&self) {
        self.allow_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deny(&self) {
        self.deny_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_monitor(&self) {
        self.monitor_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limit_hit(&self) {
        self.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replay_detection(&self) {
        self.replay_detections.fetch_add(1, Ordering::Relaxed);
    }

    /// Added on every Orchestrator exit path, including early short-circuit
    /// returns, not only the terminal decision.
    pub fn record_latency(&self, latency_ms: u64) {
        self.latency_ms_sum.fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self, clock: &Arc<dyn Clock>) -> MetricsSnapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let latency_ms_sum = self.latency_ms_sum.load(Ordering::Relaxed);
        let avg_latency_ms = if total_requests == 0 {
            0.0
        } else {
            latency_ms_sum as f64 / total_requests as f64
        };

        MetricsSnapshot {
            total_requests,
            allow_count: self.allow_count.load(Ordering::Relaxed),
            deny_count: self.deny_count.load(Ordering::Relaxed),
            monitor_count: self.monitor_count.load(Ordering::Relaxed),
            rate_limit_hits: self.rate_limit_hits.load(Ordering::Relaxed),
            replay_detections: self.replay_detections.load(Ordering::Relaxed),
            latency_ms_sum,
            avg_latency_ms,
            uptime_seconds: (clock.now() - self.start_time).max(0) as u64,
        }
    }
}
