use crate::clock::Clock;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ReplaySuppressorConfig {
    pub max_size: usize,
    pub purge_interval_seconds: u64,
}

impl Default for ReplaySuppressorConfig {
    fn default() -> Self {
        Self {
            max_size: 100_000,
            purge_interval_seconds: 60,
        }
    }
}

/// In-memory seen-set keyed by `jti`, fail-closed: any internal
/// inconsistency must be treated as "already seen" by the caller, never as
/// "not seen". This module has no fallible path, so that guarantee holds
/// by construction rather than by caller discipline.
pub struct ReplaySuppressor {
    config: ReplaySuppressorConfig,
    clock: Arc<dyn Clock>,
    seen: Mutex<HashMap<String, i64>>,
}

impl ReplaySuppressor {
    pub fn new(config: ReplaySuppressorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Atomically check whether `jti` has been seen and, if not, record it
    /// with expiry `exp`. Returns `true` if this is a replay. A single
    /// critical section so check-then-record can't race across requests.
    pub fn check_and_record(&self, jti: &str, exp: i64) -> bool {
        let mut seen = self.seen.lock();

        if seen.contains_key(jti) {
            return true;
        }

        seen.insert(jti.to_string(), exp);

        if seen.len() > self.config.max_size {
            let now = self.clock.now();
            seen.retain(|_, entry_exp| *entry_exp >= now);
        }

        false
    }

    /// Remove entries whose `exp` has already elapsed. Never removes an
    /// entry whose `exp >= now`, so a purge can only shrink the set, never
    /// cause a previously-rejected replay to be re-admitted.
    pub fn purge_expired(&self) {
        let now = self.clock.now();
        self.seen.lock().retain(|_, exp| *exp >= now);
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    fn suppressor(max_size: usize) -> (ReplaySuppressor, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(1_000));
        let config = ReplaySuppressorConfig {
            max_size,
            purge_interval_seconds: 60,
        };
        (ReplaySuppressor::new(config, clock.clone()), clock)
    }

    #[test]
    fn first_sighting_is_not_a_replay() {
        let (suppressor, _clock) = suppressor(10);
        assert!(!suppressor.check_and_record("jti-1", 2_000));
    }

    #[test]
    fn second_sighting_of_same_jti_is_a_replay() {
        let (suppressor, _clock) = suppressor(10);
        assert!(!suppressor.check_and_record("jti-1", 2_000));
        assert!(suppressor.check_and_record("jti-1", 2_000));
    }

    #[test]
    fn distinct_jtis_are_independent() {
        let (suppressor, _clock) = suppressor(10);
        assert!(!suppressor.check_and_record("jti-1", 2_000));
        assert!(!suppressor.check_and_record("jti-2", 2_000));
    }

    #[test]
    fn purge_expired_drops_elapsed_entries_only() {
        let (suppressor, clock) = suppressor(10);
        suppressor.check_and_record("expired", 1_500);
        suppressor.check_and_record("still-valid", 5_000);

        clock.set(2_000);
        suppressor.purge_expired();

        assert_eq!(suppressor.len(), 1);
        assert!(!suppressor.check_and_record("expired", 3_000));
        assert!(suppressor.check_and_record("still-valid", 5_000));
    }

    #[test]
    fn never_purges_entry_whose_exp_has_not_elapsed() {
        let (suppressor, clock) = suppressor(10);
        suppressor.check_and_record("jti-1", 10_000);
        clock.set(9_999);
        suppressor.purge_expired();
        assert_eq!(suppressor.len(), 1);
    }
}
