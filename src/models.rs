use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Enforcement decision returned for a validated credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Allow,
    Monitor,
    Deny,
}

/// Reason a request was denied. Only ever populated alongside `Verdict::Deny`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    ExpiredToken,
    NotYetValid,
    ReplayDetected,
    RateLimitExceeded,
    InvalidSignature,
    LowScore,
    MalformedToken,
    InternalError,
}

/// Claims extracted from a verified credential. `sub` and `jti` are
/// guaranteed non-empty by the time this is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub sub: String,
    pub jti: String,
    pub exp: i64,
    pub iat: Option<i64>,
    pub nbf: Option<i64>,
}

/// Failure kind from credential verification. A tagged sum type standing in
/// for the source's ad hoc `{"error": "..."}` dict, so the mapping to a
/// `DenyReason` in the orchestrator is exhaustive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("credential is malformed")]
    Malformed,
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("credential has expired")]
    Expired,
    #[error("credential is not yet valid")]
    NotYetValid,
}

impl VerifyError {
    pub fn into_deny_reason(self) -> DenyReason {
        match self {
            VerifyError::Malformed => DenyReason::MalformedToken,
            VerifyError::InvalidSignature => DenyReason::InvalidSignature,
            VerifyError::Expired => DenyReason::ExpiredToken,
            VerifyError::NotYetValid => DenyReason::NotYetValid,
        }
    }
}

/// Catch-all for failures inside steps C3-C6 that have no typed `DenyReason`
/// of their own: a panic unwound from the verifier, replay suppressor, or
/// score backend. Always collapses to `DenyReason::InternalError` at the
/// Orchestrator boundary.
#[derive(Debug, Clone, thiserror::Error)]
#[error("internal gateway error: {0}")]
pub struct GatewayError(pub String);

/// Response returned by the pipeline for every request, successful or not.
/// `reason` and `score` are always present on the wire, as `null` when
/// absent, matching `spec.md` §6's literal JSON shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub decision: Verdict,
    pub reason: Option<DenyReason>,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub score: Option<u8>,
}

impl Response {
    pub fn deny(reason: DenyReason, request_id: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            decision: Verdict::Deny,
            reason: Some(reason),
            request_id,
            timestamp,
            score: None,
        }
    }

    pub fn decided(
        verdict: Verdict,
        score: u8,
        request_id: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let reason = (verdict == Verdict::Deny).then_some(DenyReason::LowScore);
        Self {
            decision: verdict,
            reason,
            request_id,
            timestamp,
            score: Some(score),
        }
    }
}

/// Telemetry event envelope, schema-versioned per `spec.md` §6.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type")]
pub enum TelemetryEvent {
    #[serde(rename = "gateway.decision.made")]
    Decision {
        version: &'static str,
        request_id: String,
        timestamp: DateTime<Utc>,
        verdict: Verdict,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<DenyReason>,
        #[serde(skip_serializing_if = "Option::is_none")]
        score: Option<u8>,
        #[serde(skip_serializing_if = "Option::is_none")]
        principal_hash: Option<String>,
        latency_ms: u64,
    },
    #[serde(rename = "gateway.error")]
    Error {
        version: &'static str,
        request_id: String,
        timestamp: DateTime<Utc>,
        error_kind: String,
        error_message: String,
    },
}

pub const TELEMETRY_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub replay_cache_size: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub allow_count: u64,
    pub deny_count: u64,
    pub monitor_count: u64,
    pub rate_limit_hits: u64,
    pub replay_detections: u64,
    pub latency_ms_sum: u64,
    pub avg_latency_ms: f64,
    pub uptime_seconds: u64,
}
