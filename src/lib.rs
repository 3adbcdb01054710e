//! TrustGate, a token-validating admission gateway.
//!
//! Decides ALLOW / MONITOR / DENY for each inbound request carrying a
//! bearer credential, driven by an independently retrieved trust score
//! rather than by the credential's own claims. The pipeline is: rate limit
//! (C2), verify signature and temporal window (C3), suppress replays (C4),
//! fetch a trust score (C5), and apply a pure threshold (C6). Every step
//! records metrics (C9) and emits structured telemetry (C8).

pub mod clock;
pub mod config;
pub mod decision;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod rate_limit;
pub mod replay;
pub mod score;
pub mod telemetry;
pub mod verifier;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigOverrides, GatewayConfig};
pub use decision::decide;
pub use metrics::Metrics;
pub use models::{
    DenyReason, GatewayError, HealthSnapshot, MetricsSnapshot, Payload, Response, TelemetryEvent,
    Verdict, VerifyError,
};
pub use orchestrator::Orchestrator;
pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use replay::{ReplaySuppressor, ReplaySuppressorConfig};
pub use score::{CachedScoreBackend, RemoteScoreBackend, ScoreBackend, StubScoreBackend};
pub use telemetry::TelemetryEmitter;
pub use verifier::{CredentialVerifier, VerifierConfigError};

use anyhow::{Context, Result};
use jsonwebtoken::Algorithm;
use std::sync::Arc;

/// Build a production `Orchestrator` from a loaded `GatewayConfig`,
/// wiring every component the way `spec.md` §4.7 sequences them.
pub async fn bootstrap(config: &GatewayConfig) -> Result<Orchestrator> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let rate_limiter = RateLimiter::new(
        RateLimiterConfig::from_requests_per_minute(
            config.rate_limit_requests_per_minute,
            config.rate_limit_burst_size,
        ),
        clock.clone(),
    );

    let key_path = config
        .jwt_public_key_path
        .as_deref()
        .context("JWT_PUBLIC_KEY_PATH must be set to start the gateway")?;
    let algorithm = parse_algorithm(&config.jwt_algorithm)?;
    let verifier = CredentialVerifier::from_pem_file(
        key_path,
        algorithm,
        config.jwt_clock_drift_seconds,
        clock.clone(),
    )
    .context("failed to load JWT verification key")?;

    let replay_suppressor = ReplaySuppressor::new(
        ReplaySuppressorConfig {
            max_size: config.replay_cache_max_size,
            purge_interval_seconds: config.replay_cache_purge_interval_seconds,
        },
        clock.clone(),
    );

    let score_backend = build_score_backend(config)?;
    let telemetry = TelemetryEmitter::new(config.telemetry_emit_enabled);
    let metrics = Metrics::new(&clock);

    Ok(Orchestrator::new(
        clock,
        rate_limiter,
        verifier,
        replay_suppressor,
        score_backend,
        telemetry,
        metrics,
    ))
}

fn parse_algorithm(name: &str) -> Result<Algorithm> {
    let algorithm = match name {
        "RS256" => Algorithm::RS256,
        "RS384" => Algorithm::RS384,
        "RS512" => Algorithm::RS512,
        "ES256" => Algorithm::ES256,
        "ES384" => Algorithm::ES384,
        "ES512" => Algorithm::ES512,
        other => anyhow::bail!("JWT_ALGORITHM '{other}' is not in the asymmetric allow-list"),
    };
    Ok(algorithm)
}

fn build_score_backend(config: &GatewayConfig) -> Result<Arc<dyn ScoreBackend>> {
    match config.score_provider_type.as_str() {
        "remote" => {
            let url = config
                .score_api_url
                .clone()
                .context("SCORE_API_URL is required when SCORE_PROVIDER_TYPE=remote")?;
            let key = config.score_api_key.clone().unwrap_or_default();
            Ok(Arc::new(RemoteScoreBackend::new(url, key)))
        }
        "cached" => Ok(Arc::new(CachedScoreBackend::new(
            StubScoreBackend,
            config.score_cache_ttl_seconds,
        ))),
        "direct" => Ok(Arc::new(StubScoreBackend)),
        other => anyhow::bail!("unrecognized SCORE_PROVIDER_TYPE '{other}'"),
    }
}
