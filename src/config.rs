use config::{Config, ConfigError as BuilderError, Environment};
use serde::Deserialize;
use thiserror::Error;

fn default_app_name() -> String {
    "trustgate".into()
}

fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").into()
}

fn default_environment() -> String {
    "development".into()
}

fn default_log_level() -> String {
    "info".into()
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8080
}

fn default_jwt_algorithm() -> String {
    "RS256".into()
}

fn default_clock_drift() -> i64 {
    30
}

fn default_rate_limit_rpm() -> u32 {
    100
}

fn default_rate_limit_burst() -> u32 {
    120
}

fn default_score_provider_type() -> String {
    "direct".into()
}

fn default_score_cache_ttl() -> u64 {
    300
}

fn default_replay_purge_interval() -> u64 {
    300
}

fn default_replay_max_size() -> usize {
    1_000_000
}

fn default_telemetry_emit_enabled() -> bool {
    true
}

/// Mirrors `spec.md` §6's environment-variable table field for field; names
/// and defaults are load-bearing and must not drift from that list.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_app_version")]
    pub app_version: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    pub jwt_public_key_path: Option<String>,
    #[serde(default = "default_jwt_algorithm")]
    pub jwt_algorithm: String,
    #[serde(default = "default_clock_drift")]
    pub jwt_clock_drift_seconds: i64,

    #[serde(default = "default_rate_limit_rpm")]
    pub rate_limit_requests_per_minute: u32,
    #[serde(default = "default_rate_limit_burst")]
    pub rate_limit_burst_size: u32,

    #[serde(default = "default_score_provider_type")]
    pub score_provider_type: String,
    pub score_api_url: Option<String>,
    pub score_api_key: Option<String>,
    #[serde(default = "default_score_cache_ttl")]
    pub score_cache_ttl_seconds: u64,

    #[serde(default = "default_replay_purge_interval")]
    pub replay_cache_purge_interval_seconds: u64,
    #[serde(default = "default_replay_max_size")]
    pub replay_cache_max_size: usize,

    #[serde(default = "default_telemetry_emit_enabled")]
    pub telemetry_emit_enabled: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Builder(#[from] BuilderError),
}

/// CLI overrides accepted for local runs, mirroring the teacher's
/// `ConfigOverrides` + `set_override` pattern, restricted to the fields a
/// human actually wants to flip without touching the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

pub fn load(overrides: ConfigOverrides) -> Result<GatewayConfig, ConfigError> {
    let mut builder = Config::builder().add_source(Environment::default());

    if let Some(host) = overrides.host {
        builder = builder.set_override("host", host)?;
    }
    if let Some(port) = overrides.port {
        builder = builder.set_override("port", port as i64)?;
    }
    if let Some(log_level) = overrides.log_level {
        builder = builder.set_override("log_level", log_level)?;
    }

    let config: GatewayConfig = builder.build()?.try_deserialize()?;
    validate(&config)?;
    Ok(config)
}

/// Fail-closed startup contract from `spec.md` §6/§7: in production,
/// missing the key material path or a remote score backend without a URL
/// aborts the process instead of deferring to request time.
fn validate(config: &GatewayConfig) -> Result<(), ConfigError> {
    if config.environment == "production" && config.jwt_public_key_path.is_none() {
        return Err(ConfigError::Message(
            "JWT_PUBLIC_KEY_PATH is required in production".into(),
        ));
    }

    if config.score_provider_type == "remote" && config.score_api_url.is_none() {
        return Err(ConfigError::Message(
            "SCORE_API_URL is required when SCORE_PROVIDER_TYPE=remote".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> GatewayConfig {
        GatewayConfig {
            app_name: default_app_name(),
            app_version: default_app_version(),
            environment: default_environment(),
            log_level: default_log_level(),
            host: default_host(),
            port: default_port(),
            jwt_public_key_path: None,
            jwt_algorithm: default_jwt_algorithm(),
            jwt_clock_drift_seconds: default_clock_drift(),
            rate_limit_requests_per_minute: default_rate_limit_rpm(),
            rate_limit_burst_size: default_rate_limit_burst(),
            score_provider_type: default_score_provider_type(),
            score_api_url: None,
            score_api_key: None,
            score_cache_ttl_seconds: default_score_cache_ttl(),
            replay_cache_purge_interval_seconds: default_replay_purge_interval(),
            replay_cache_max_size: default_replay_max_size(),
            telemetry_emit_enabled: default_telemetry_emit_enabled(),
        }
    }

    #[test]
    fn development_without_key_path_is_allowed() {
        assert!(validate(&minimal_config()).is_ok());
    }

    #[test]
    fn production_without_key_path_is_rejected() {
        let mut config = minimal_config();
        config.environment = "production".into();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn remote_score_provider_without_url_is_rejected() {
        let mut config = minimal_config();
        config.score_provider_type = "remote".into();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn remote_score_provider_with_url_is_accepted() {
        let mut config = minimal_config();
        config.score_provider_type = "remote".into();
        config.score_api_url = Some("https://score.example.com".into());
        assert!(validate(&config).is_ok());
    }
}
