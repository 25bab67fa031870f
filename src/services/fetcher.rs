use crate::metrics::Metrics;
use crate::models::AppConfig;
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};

/// Errors from a single catalog request.
///
/// The fetcher never retries; callers decide what a failure means. Inside a
/// poll cycle every variant is counted against the mod and skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Transport error requesting {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("Catalog returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Malformed catalog response from {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("Mod id {id:?} cannot be used in a catalog request")]
    InvalidId { id: String },
}

/// Minimum spacing between request starts.
///
/// The wait is paid *before* a request is sent, measured from the start of
/// the previous one, so throughput is at most one request per gap no matter
/// how fast the catalog answers. The first request through a fresh gate is
/// not delayed. The lock is held while sleeping, which queues concurrent
/// callers behind each other.
#[derive(Debug)]
pub struct RateGate {
    gap: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(gap: Duration) -> Self {
        Self {
            gap,
            last_start: Mutex::new(None),
        }
    }

    pub fn gap(&self) -> Duration {
        self.gap
    }

    /// Wait until a request may start, and mark it as started
    pub async fn wait_turn(&self) {
        let mut last_start = self.last_start.lock().await;

        if let Some(previous) = *last_start {
            let elapsed = previous.elapsed();
            if elapsed < self.gap {
                let remaining = self.gap - elapsed;
                tracing::trace!("Rate gate: waiting {:?}", remaining);
                sleep(remaining).await;
            }
        }

        *last_start = Some(Instant::now());
    }
}

/// A GET request against the catalog API, relative to the base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl CatalogRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// HTTP client that sends every catalog request through a [`RateGate`]
/// and attaches the bearer credential.
pub struct RateLimitedFetcher {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
    gate: RateGate,
    metrics: Option<Arc<Metrics>>,
}

impl RateLimitedFetcher {
    pub fn new(base_url: &str, api_token: &str, gap: Duration, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("modwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        if api_token.is_empty() {
            tracing::warn!("No catalog API token configured; requests will be sent unauthenticated");
        }

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            gate: RateGate::new(gap),
            metrics: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.base_url,
            &config.api_token,
            Duration::from_millis(config.request_gap_ms),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Count every request sent in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn gate(&self) -> &RateGate {
        &self.gate
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send one GET request and decode the JSON body
    pub async fn fetch(&self, request: &CatalogRequest) -> Result<Value, CatalogError> {
        let url = self.url_for(&request.path);

        self.gate.wait_turn().await;
        if let Some(metrics) = &self.metrics {
            metrics.record_request();
        }

        tracing::debug!("GET {} {:?}", url, request.query);

        let mut builder = self
            .client
            .get(&url)
            .query(&request.query)
            .header(ACCEPT, "application/json");
        if !self.api_token.is_empty() {
            builder = builder.bearer_auth(&self.api_token);
        }

        let response = builder.send().await.map_err(|e| CatalogError::Transport {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.text().await.map_err(|e| CatalogError::Transport {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        serde_json::from_str(&body).map_err(|e| CatalogError::Malformed {
            url,
            reason: e.to_string(),
        })
    }
}
