use crate::models::TelemetryEvent;

/// Emits structured decision/error events as JSON lines on a dedicated
/// `telemetry` tracing target, so downstream collectors can filter them
/// independent of human-readable application logs. Never returns an error
/// to the caller: a serialization failure is logged and dropped.
pub struct TelemetryEmitter {
    enabled: bool,
}

impl TelemetryEmitter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn emit(&self, event: TelemetryEvent) {
        if !self.enabled {
            return;
        }

        match serde_json::to_string(&event) {
            Ok(json) => tracing::info!(target: "telemetry", "{json}"),
            Err(err) => tracing::warn!(target: "telemetry", error = %err, "failed to serialize telemetry event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DenyReason, Verdict, TELEMETRY_VERSION};
    use chrono::Utc;

    #[test]
    fn disabled_emitter_does_not_panic_or_emit() {
        let emitter = TelemetryEmitter::new(false);
        emitter.emit(TelemetryEvent::Decision {
            version: TELEMETRY_VERSION,
            request_id: "req-1".into(),
            timestamp: Utc::now(),
            verdict: Verdict::Allow,
            reason: None,
            score: Some(95),
            principal_hash: None,
            latency_ms: 10,
        });
    }

    #[test]
    fn enabled_emitter_serializes_decision_event() {
        let emitter = TelemetryEmitter::new(true);
        emitter.emit(TelemetryEvent::Decision {
            version: TELEMETRY_VERSION,
            request_id: "req-2".into(),
            timestamp: Utc::now(),
            verdict: Verdict::Deny,
            reason: Some(DenyReason::LowScore),
            score: Some(10),
            principal_hash: Some("abc123".into()),
            latency_ms: 5,
        });
    }
}
