use crate::clock::Clock;
use crate::decision::decide;
use crate::metrics::Metrics;
use crate::models::{DenyReason, GatewayError, Response, TelemetryEvent, Verdict};
use crate::rate_limit::RateLimiter;
use crate::replay::ReplaySuppressor;
use crate::score::ScoreBackend;
use crate::telemetry::TelemetryEmitter;
use crate::verifier::CredentialVerifier;
use chrono::Utc;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::instrument;

/// Sequences the five-step pipeline from `spec.md` §4.7: rate limit,
/// verify, replay check, score, decide. Never returns `Err` to its caller:
/// every path, including an internal failure unwound from steps C3-C6,
/// resolves to a `Response`.
pub struct Orchestrator {
    clock: Arc<dyn Clock>,
    rate_limiter: RateLimiter,
    verifier: CredentialVerifier,
    replay_suppressor: ReplaySuppressor,
    score_backend: Arc<dyn ScoreBackend>,
    telemetry: TelemetryEmitter,
    metrics: Metrics,
}

impl Orchestrator {
    pub fn new(
        clock: Arc<dyn Clock>,
        rate_limiter: RateLimiter,
        verifier: CredentialVerifier,
        replay_suppressor: ReplaySuppressor,
        score_backend: Arc<dyn ScoreBackend>,
        telemetry: TelemetryEmitter,
        metrics: Metrics,
    ) -> Self {
        Self {
            clock,
            rate_limiter,
            verifier,
            replay_suppressor,
            score_backend,
            telemetry,
            metrics,
        }
    }

    pub fn metrics_snapshot(&self, clock: &Arc<dyn Clock>) -> crate::models::MetricsSnapshot {
        self.metrics.snapshot(clock)
    }

    pub fn replay_cache_size(&self) -> usize {
        self.replay_suppressor.len()
    }

    /// Drives the background eviction sweep from `spec.md` §5; never
    /// removes an entry whose `exp` has not yet elapsed.
    pub fn purge_expired_replays(&self) {
        self.replay_suppressor.purge_expired();
    }

    #[instrument(skip(self, credential), fields(request_id = %request_id))]
    pub async fn validate(&self, credential: &str, request_id: String) -> Response {
        let started_at = self.clock.now_monotonic();
        self.metrics.record_request();

        if !self.rate_limiter.admit_global() {
            return self.deny(DenyReason::RateLimitExceeded, request_id, started_at, None);
        }

        // C3 and C4 are synchronous; a single catch_unwind covers both so an
        // unexpected panic in either never takes down the caller's task.
        let verify_and_replay = panic::catch_unwind(AssertUnwindSafe(|| {
            let payload = self.verifier.verify(credential)?;
            let is_replay = self
                .replay_suppressor
                .check_and_record(&payload.jti, payload.exp);
            Ok((payload, is_replay))
        }));

        let (payload, is_replay) = match verify_and_replay {
            Ok(Ok(pair)) => pair,
            Ok(Err(err)) => {
                let err: crate::models::VerifyError = err;
                return self.deny(err.into_deny_reason(), request_id, started_at, None);
            }
            Err(panic) => {
                let message = format!("verify/replay step panicked: {}", panic_message(&panic));
                return self.internal_error(GatewayError(message), request_id, started_at);
            }
        };

        if is_replay {
            self.metrics.record_replay_detection();
            return self.deny(
                DenyReason::ReplayDetected,
                request_id,
                started_at,
                Some(&payload.sub),
            );
        }

        // C5 and C6 run on a spawned task so a panic inside the score
        // backend (or the pure decide() fold) surfaces as a JoinError
        // instead of unwinding into this request's async task.
        let score_backend = self.score_backend.clone();
        let sub = payload.sub.clone();
        let score_and_decide = tokio::spawn(async move {
            let score = score_backend.score(&sub).await;
            let verdict = decide(score);
            (score, verdict)
        });

        let (score, verdict) = match score_and_decide.await {
            Ok(pair) => pair,
            Err(join_err) => {
                let message = format!("score/decide step failed: {join_err}");
                return self.internal_error(GatewayError(message), request_id, started_at);
            }
        };

        match verdict {
            Verdict::Allow => self.metrics.record_allow(),
            Verdict::Monitor => self.metrics.record_monitor(),
            Verdict::Deny => self.metrics.record_deny(),
        }

        let timestamp = Utc::now();
        let latency_ms = self.elapsed_ms(started_at);
        self.metrics.record_latency(latency_ms);

        self.telemetry.emit(TelemetryEvent::Decision {
            version: crate::models::TELEMETRY_VERSION,
            request_id: request_id.clone(),
            timestamp,
            verdict,
            reason: (verdict == Verdict::Deny).then_some(DenyReason::LowScore),
            score: Some(score),
            principal_hash: Some(crate::score::hash_principal(&payload.sub)),
            latency_ms,
        });

        Response::decided(verdict, score, request_id, timestamp)
    }

    fn elapsed_ms(&self, started_at: f64) -> u64 {
        ((self.clock.now_monotonic() - started_at) * 1000.0).max(0.0) as u64
    }

    fn deny(
        &self,
        reason: DenyReason,
        request_id: String,
        started_at: f64,
        principal: Option<&str>,
    ) -> Response {
        self.metrics.record_deny();
        if reason == DenyReason::RateLimitExceeded {
            self.metrics.record_rate_limit_hit();
        }

        let timestamp = Utc::now();
        let latency_ms = self.elapsed_ms(started_at);
        self.metrics.record_latency(latency_ms);

        self.telemetry.emit(TelemetryEvent::Decision {
            version: crate::models::TELEMETRY_VERSION,
            request_id: request_id.clone(),
            timestamp,
            verdict: Verdict::Deny,
            reason: Some(reason),
            score: None,
            principal_hash: principal.map(crate::score::hash_principal),
            latency_ms,
        });

        Response::deny(reason, request_id, timestamp)
    }

    /// Terminal path for a failure inside steps C3-C6 with no typed
    /// `DenyReason` of its own. Emits `gateway.error` telemetry distinct
    /// from the `gateway.decision.made` event every other path produces.
    fn internal_error(
        &self,
        error: GatewayError,
        request_id: String,
        started_at: f64,
    ) -> Response {
        self.metrics.record_deny();

        let timestamp = Utc::now();
        let latency_ms = self.elapsed_ms(started_at);
        self.metrics.record_latency(latency_ms);

        tracing::error!(%request_id, %error, "internal gateway error");

        self.telemetry.emit(TelemetryEvent::Error {
            version: crate::models::TELEMETRY_VERSION,
            request_id: request_id.clone(),
            timestamp,
            error_kind: "internal_error".into(),
            error_message: error.0,
        });

        Response::deny(DenyReason::InternalError, request_id, timestamp)
    }
}

/// Best-effort extraction of a human-readable message from a caught panic
/// payload; panics carry `&str` or `String` in the overwhelming majority of
/// cases, and anything else degrades to a generic message.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::rate_limit::RateLimiterConfig;
    use crate::replay::ReplaySuppressorConfig;
    use crate::score::StubScoreBackend;
    use async_trait::async_trait;
    use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
    use serde_json::json;

    const RSA_PUBLIC: &str = include_str!("../tests/fixtures/rsa_public.pem");
    const RSA_PRIVATE: &str = include_str!("../tests/fixtures/rsa_private.pem");

    fn sign(claims: &serde_json::Value) -> String {
        let key = EncodingKey::from_rsa_pem(RSA_PRIVATE.as_bytes()).unwrap();
        encode(&Header::new(Algorithm::RS256), claims, &key).unwrap()
    }

    fn build_orchestrator(clock: Arc<dyn Clock>) -> Orchestrator {
        let rate_limiter = RateLimiter::new(RateLimiterConfig::default(), clock.clone());
        let key = DecodingKey::from_rsa_pem(RSA_PUBLIC.as_bytes()).unwrap();
        let verifier = CredentialVerifier::new(key, Algorithm::RS256, 30, clock.clone()).unwrap();
        let replay = ReplaySuppressor::new(ReplaySuppressorConfig::default(), clock.clone());
        let metrics = Metrics::new(&clock);
        let telemetry = TelemetryEmitter::new(true);
        Orchestrator::new(
            clock,
            rate_limiter,
            verifier,
            replay,
            Arc::new(StubScoreBackend),
            telemetry,
            metrics,
        )
    }

    #[tokio::test]
    async fn high_trust_principal_is_allowed() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(1_000));
        let orchestrator = build_orchestrator(clock.clone());
        let token = sign(&json!({"sub": "high_alice", "jti": "jti-1", "exp": 5_000}));

        let response = orchestrator.validate(&token, "req-1".into()).await;
        assert_eq!(response.decision, Verdict::Allow);
        assert_eq!(response.score, Some(95));
    }

    #[tokio::test]
    async fn low_trust_principal_is_denied_with_low_score_reason() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(1_000));
        let orchestrator = build_orchestrator(clock.clone());
        let token = sign(&json!({"sub": "carol", "jti": "jti-2", "exp": 5_000}));

        let response = orchestrator.validate(&token, "req-2".into()).await;
        assert_eq!(response.decision, Verdict::Deny);
        assert_eq!(response.reason, Some(DenyReason::LowScore));
    }

    #[tokio::test]
    async fn replayed_jti_is_denied() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(1_000));
        let orchestrator = build_orchestrator(clock.clone());
        let token = sign(&json!({"sub": "high_alice", "jti": "jti-replay", "exp": 5_000}));

        let first = orchestrator.validate(&token, "req-3".into()).await;
        assert_eq!(first.decision, Verdict::Allow);

        let second = orchestrator.validate(&token, "req-4".into()).await;
        assert_eq!(second.decision, Verdict::Deny);
        assert_eq!(second.reason, Some(DenyReason::ReplayDetected));
    }

    #[tokio::test]
    async fn expired_token_maps_to_expired_deny_reason() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(10_000));
        let orchestrator = build_orchestrator(clock.clone());
        let token = sign(&json!({"sub": "high_alice", "jti": "jti-5", "exp": 1_000}));

        let response = orchestrator.validate(&token, "req-5".into()).await;
        assert_eq!(response.decision, Verdict::Deny);
        assert_eq!(response.reason, Some(DenyReason::ExpiredToken));
    }

    #[tokio::test]
    async fn rate_limit_exhaustion_denies_without_crashing() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(1_000));
        let rate_limiter = RateLimiter::new(
            crate::rate_limit::RateLimiterConfig { rate: 0.0, burst: 1.0 },
            clock.clone(),
        );
        let key = DecodingKey::from_rsa_pem(RSA_PUBLIC.as_bytes()).unwrap();
        let verifier = CredentialVerifier::new(key, Algorithm::RS256, 30, clock.clone()).unwrap();
        let replay = ReplaySuppressor::new(ReplaySuppressorConfig::default(), clock.clone());
        let metrics = Metrics::new(&clock);
        let telemetry = TelemetryEmitter::new(true);
        let orchestrator = Orchestrator::new(
            clock,
            rate_limiter,
            verifier,
            replay,
            Arc::new(StubScoreBackend),
            telemetry,
            metrics,
        );

        let token = sign(&json!({"sub": "high_alice", "jti": "jti-6", "exp": 5_000}));
        let first = orchestrator.validate(&token, "req-6".into()).await;
        assert_eq!(first.decision, Verdict::Allow);

        let token2 = sign(&json!({"sub": "high_alice", "jti": "jti-7", "exp": 5_000}));
        let second = orchestrator.validate(&token2, "req-7".into()).await;
        assert_eq!(second.decision, Verdict::Deny);
        assert_eq!(second.reason, Some(DenyReason::RateLimitExceeded));
    }

    struct PanickingScoreBackend;

    #[async_trait]
    impl ScoreBackend for PanickingScoreBackend {
        async fn score(&self, _principal: &str) -> u8 {
            panic!("score backend exploded");
        }
    }

    #[tokio::test]
    async fn score_backend_panic_yields_internal_error() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(1_000));
        let rate_limiter = RateLimiter::new(RateLimiterConfig::default(), clock.clone());
        let key = DecodingKey::from_rsa_pem(RSA_PUBLIC.as_bytes()).unwrap();
        let verifier = CredentialVerifier::new(key, Algorithm::RS256, 30, clock.clone()).unwrap();
        let replay = ReplaySuppressor::new(ReplaySuppressorConfig::default(), clock.clone());
        let metrics = Metrics::new(&clock);
        let telemetry = TelemetryEmitter::new(true);
        let orchestrator = Orchestrator::new(
            clock,
            rate_limiter,
            verifier,
            replay,
            Arc::new(PanickingScoreBackend),
            telemetry,
            metrics,
        );

        let token = sign(&json!({"sub": "high_alice", "jti": "jti-8", "exp": 5_000}));
        let response = orchestrator.validate(&token, "req-8".into()).await;
        assert_eq!(response.decision, Verdict::Deny);
        assert_eq!(response.reason, Some(DenyReason::InternalError));
        assert_eq!(response.score, None);
    }
}
