//! NEAR RPC Client - Rate-limited View Call Client
//!
//! Wraps reqwest with a concurrency cap, a request rate limiter and
//! exponential-backoff retries for `query`/`call_function` views.
//! Contract errors returned by the node are not retried.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use super::types::{RpcRequest, RpcResponse};
use crate::adapters::metrics::MetricsRegistry;
use crate::domain::AccountId;
use crate::ports::view::ViewClient;

/// Configuration for the RPC client.
#[derive(Debug, Clone)]
pub struct NearRpcConfig {
  /// JSON-RPC endpoint.
  pub url: String,
  /// Request timeout.
  pub timeout: Duration,
  /// Maximum concurrent requests.
  pub max_concurrent: usize,
  /// Maximum retries on transient errors.
  pub max_retries: u32,
  /// Base delay between retries (exponential backoff).
  pub retry_base_delay: Duration,
  /// Sustained request rate.
  pub requests_per_second: u32,
}

impl Default for NearRpcConfig {
  fn default() -> Self {
    Self {
      url: "https://rpc.testnet.near.org".to_string(),
      timeout: Duration::from_secs(10),
      max_concurrent: 8,
      max_retries: 3,
      retry_base_delay: Duration::from_millis(200),
      requests_per_second: 20,
    }
  }
}

/// Longest wait between two attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Exponential backoff before retry `attempt` (1-based), capped at
/// `MAX_BACKOFF`.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
  2u32
    .checked_pow(attempt.saturating_sub(1))
    .and_then(|factor| base.checked_mul(factor))
    .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}

/// Failure of one request attempt.
enum Attempt {
  /// Worth retrying.
  Transient(anyhow::Error),
  /// Retrying cannot help.
  Fatal(anyhow::Error),
}

/// View-only NEAR JSON-RPC client.
pub struct NearRpcClient {
  /// Underlying HTTP client.
  http: Client,
  /// Client configuration.
  config: NearRpcConfig,
  /// Concurrency limiter.
  semaphore: Arc<Semaphore>,
  /// Request rate limiter.
  limiter: DefaultDirectRateLimiter,
  /// Optional metrics sink.
  metrics: Option<Arc<MetricsRegistry>>,
}

impl NearRpcClient {
  /// Create a new RPC client.
  pub fn new(config: NearRpcConfig) -> Result<Self> {
    let http = Client::builder()
      .timeout(config.timeout)
      .pool_max_idle_per_host(5)
      .build()
      .context("Failed to build HTTP client")?;

    let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
    let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
    let limiter = RateLimiter::direct(Quota::per_second(rate));

    Ok(Self {
      http,
      config,
      semaphore,
      limiter,
      metrics: None,
    })
  }

  /// Attach a metrics registry.
  #[must_use]
  pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
    self.metrics = Some(metrics);
    self
  }

  pub fn url(&self) -> &str {
    &self.config.url
  }

  async fn attempt(&self, body: &RpcRequest<'_>) -> Result<Vec<u8>, Attempt> {
    let response = self
      .http
      .post(&self.config.url)
      .json(body)
      .send()
      .await
      .map_err(|e| Attempt::Transient(e.into()))?;

    match response.status() {
      StatusCode::OK => {}
      StatusCode::TOO_MANY_REQUESTS => {
        warn!("Rate limited by RPC node, backing off");
        sleep(Duration::from_secs(2)).await;
        return Err(Attempt::Transient(anyhow::anyhow!("Rate limited")));
      }
      status if status.is_server_error() => {
        return Err(Attempt::Transient(anyhow::anyhow!("Server error: {status}")));
      }
      status => {
        let text = response.text().await.unwrap_or_default();
        return Err(Attempt::Fatal(anyhow::anyhow!("RPC error {status}: {text}")));
      }
    }

    let parsed: RpcResponse = response
      .json()
      .await
      .map_err(|e| Attempt::Fatal(anyhow::Error::new(e).context("Malformed RPC response")))?;

    if let Some(err) = parsed.error {
      return Err(Attempt::Fatal(anyhow::anyhow!("RPC node error: {err}")));
    }
    let result = parsed
      .result
      .ok_or_else(|| Attempt::Fatal(anyhow::anyhow!("RPC response has no result")))?;
    if let Some(err) = result.error {
      return Err(Attempt::Fatal(anyhow::anyhow!("Contract error: {err}")));
    }
    if !result.logs.is_empty() {
      debug!(logs = ?result.logs, "View logs");
    }
    result
      .result
      .ok_or_else(|| Attempt::Fatal(anyhow::anyhow!("View returned no bytes")))
  }

  /// Execute a view with rate limiting and retries; returns the raw bytes.
  async fn execute_with_retry(&self, body: &RpcRequest<'_>) -> Result<Vec<u8>> {
    let _permit = self
      .semaphore
      .acquire()
      .await
      .context("Semaphore closed")?;

    let mut last_error = None;

    for attempt in 0..=self.config.max_retries {
      if attempt > 0 {
        let delay = backoff_delay(self.config.retry_base_delay, attempt);
        debug!(attempt, delay_ms = delay.as_millis(), "Retrying request");
        if let Some(m) = &self.metrics {
          m.rpc_retries.inc();
        }
        sleep(delay).await;
      }

      self.limiter.until_ready().await;

      match self.attempt(body).await {
        Ok(bytes) => return Ok(bytes),
        Err(Attempt::Fatal(e)) => return Err(e),
        Err(Attempt::Transient(e)) => {
          warn!(error = %e, attempt, "Request failed");
          last_error = Some(e);
        }
      }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Max retries exceeded")))
  }
}

#[async_trait]
impl ViewClient for NearRpcClient {
  #[instrument(skip(self, args), fields(account = %account))]
  async fn view_call(&self, account: &AccountId, method: &str, args: Value) -> Result<Value> {
    let args_base64 = STANDARD.encode(serde_json::to_vec(&args)?);
    let request = RpcRequest::call_function(account.as_str(), method, args_base64);

    let started = Instant::now();
    let outcome = self.execute_with_retry(&request).await;
    if let Some(m) = &self.metrics {
      m.observe_view(method, outcome.is_ok(), started.elapsed().as_secs_f64() * 1000.0);
    }

    let bytes = outcome.with_context(|| format!("View {account}.{method} failed"))?;
    serde_json::from_slice(&bytes)
      .with_context(|| format!("View {account}.{method} returned non-JSON bytes"))
  }
}
