use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trustgate::{config, Orchestrator};
use uuid::Uuid;

#[derive(Parser, Debug, Clone)]
#[command(name = "trustgate", about = "Token-validating admission gateway")]
struct GatewayCli {
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

impl GatewayCli {
    fn overrides(&self) -> config::ConfigOverrides {
        config::ConfigOverrides {
            host: self.host.clone(),
            port: self.port,
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = GatewayCli::parse();
    let gateway_config =
        config::load(cli.overrides()).context("failed to load gateway configuration")?;

    init_tracing(&gateway_config.log_level, &gateway_config.environment)
        .context("failed to install tracing subscriber")?;

    let orchestrator = Arc::new(
        trustgate::bootstrap(&gateway_config)
            .await
            .context("failed to bootstrap gateway")?,
    );

    let replay_purge_interval =
        Duration::from_secs(gateway_config.replay_cache_purge_interval_seconds);
    let purge_handle = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(replay_purge_interval);
            loop {
                ticker.tick().await;
                orchestrator.purge_expired_replays();
            }
        })
    };

    let state = AppState {
        orchestrator,
        started_at: unix_now(),
    };

    let router = Router::new()
        .route("/validate", post(validate_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    let addr = format!("{}:{}", gateway_config.host, gateway_config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind gateway address {addr}"))?;

    info!(%addr, "starting trustgate");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;

    purge_handle.abort();
    Ok(())
}

fn init_tracing(log_level: &str, environment: &str) -> Result<()> {
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    if environment == "development" {
        registry.with(fmt::layer().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    }
    .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
    started_at: i64,
}

#[derive(Debug, Deserialize)]
struct ValidateRequest {
    token: String,
}

async fn validate_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ValidateRequest>,
) -> AxumResponse {
    let request_id =
        header_value(&headers, "x-request-id").unwrap_or_else(|| Uuid::new_v4().to_string());

    let response = state
        .orchestrator
        .validate(&request.token, request_id)
        .await;

    Json(response).into_response()
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let clock: Arc<dyn trustgate::Clock> = Arc::new(trustgate::SystemClock);
    let snapshot = trustgate::HealthSnapshot {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: (clock.now() - state.started_at).max(0) as u64,
        replay_cache_size: state.orchestrator.replay_cache_size(),
        timestamp: chrono::Utc::now(),
    };
    Json(snapshot)
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let clock: Arc<dyn trustgate::Clock> = Arc::new(trustgate::SystemClock);
    Json(state.orchestrator.metrics_snapshot(&clock))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|v| v.to_string())
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {
            error!("received shutdown signal");
        },
    }
}
