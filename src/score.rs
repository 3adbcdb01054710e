use async_trait::async_trait;
use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Retrieves a trust score for a principal. Never derived from the
/// credential's own claims; the whole point of this component is that the
/// score comes from somewhere independent of the token being presented.
#[async_trait]
pub trait ScoreBackend: Send + Sync {
    async fn score(&self, principal: &str) -> u8;
}

/// Deterministic stand-in for a real trust-score record store, mirroring
/// the original's `ScoreRepository` stub. A real deployment swaps this for
/// a backend hitting an actual risk engine; this crate only defines the
/// trait object boundary.
pub struct StubScoreBackend;

#[async_trait]
impl ScoreBackend for StubScoreBackend {
    async fn score(&self, principal: &str) -> u8 {
        if principal.starts_with("high_") {
            95
        } else if principal.starts_with("med_") {
            60
        } else {
            5
        }
    }
}

/// Wraps any `ScoreBackend` with a TTL cache keyed by principal id.
pub struct CachedScoreBackend<B: ScoreBackend> {
    inner: B,
    cache: Cache<String, u8>,
}

impl<B: ScoreBackend> CachedScoreBackend<B> {
    pub fn new(inner: B, ttl_seconds: u64) -> Self {
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(ttl_seconds))
            .build();
        Self { inner, cache }
    }
}

#[async_trait]
impl<B: ScoreBackend> ScoreBackend for CachedScoreBackend<B> {
    async fn score(&self, principal: &str) -> u8 {
        if let Some(score) = self.cache.get(principal).await {
            return score;
        }

        let score = self.inner.score(principal).await;
        self.cache.insert(principal.to_string(), score).await;
        score
    }
}

/// Calls a remote scoring service over HTTPS. Fail-closed: any timeout,
/// transport error, non-2xx status, out-of-range, or malformed body folds
/// to `0`, never to a default "safe" score.
pub struct RemoteScoreBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

const REMOTE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(serde::Deserialize)]
struct RemoteScoreResponse {
    score: u8,
}

impl RemoteScoreBackend {
    pub fn new(base_url: String, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("reqwest client builds with default TLS backend");
        Self {
            client,
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl ScoreBackend for RemoteScoreBackend {
    async fn score(&self, principal: &str) -> u8 {
        let hashed = hash_principal(principal);
        let url = format!("{}/score/{}", self.base_url.trim_end_matches('/'), hashed);

        let request = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .timeout(REMOTE_TIMEOUT);

        let response = match tokio::time::timeout(REMOTE_TIMEOUT, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) | Err(_) => return 0,
        };

        if !response.status().is_success() {
            return 0;
        }

        match response.json::<RemoteScoreResponse>().await {
            Ok(body) if body.score <= 100 => body.score,
            _ => 0,
        }
    }
}

/// SHA-256 of the principal id, lowercase hex. Used both for remote-backend
/// lookups and telemetry so raw principal identifiers never leave process
/// memory unhashed.
pub fn hash_principal(principal: &str) -> String {
    let digest = Sha256::digest(principal.as_bytes());
    hex::encode(digest)
}
