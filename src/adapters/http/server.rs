//! HTTP Server - Probes, Metrics and Read API
//!
//! Exposes via axum 0.7:
//! - `/live`, `/ready`: liveness and readiness probes
//! - `/metrics`: Prometheus text exposition
//! - `/api/indices`: every index with metadata and prices
//! - `/api/indices/:index/prices`: prices of one index
//! - `/api/portfolio/:account`: non-zero holdings of an account
//! - `/api/pools`: (token, pool) choices for the create form
//!
//! Readiness drops when the last view against the chain failed and comes
//! back with the next successful one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::adapters::metrics::MetricsRegistry;
use crate::domain::AccountId;
use crate::ports::view::ViewClient;
use crate::usecases::explorer::Explorer;

/// Shared health state polled by readiness probes.
#[derive(Debug, Clone)]
pub struct HealthState {
    /// Whether the last chain read succeeded.
    pub chain_healthy: Arc<AtomicBool>,
}

impl HealthState {
    /// Create a new health state (healthy by default).
    pub fn new() -> Self {
        Self {
            chain_healthy: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.chain_healthy.load(Ordering::Relaxed)
    }

    fn observe<T>(&self, result: &anyhow::Result<T>) {
        self.chain_healthy.store(result.is_ok(), Ordering::Relaxed);
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a handler needs.
pub struct ApiState<V: ViewClient> {
    pub explorer: Explorer<V>,
    pub metrics: Arc<MetricsRegistry>,
    pub health: HealthState,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error(status: StatusCode, message: String) -> Response {
    (status, Json(ErrorBody { error: message })).into_response()
}

fn respond<T: Serialize>(health: &HealthState, result: anyhow::Result<T>) -> Response {
    health.observe(&result);
    match result {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            warn!(error = %e, "Chain read failed");
            error(StatusCode::BAD_GATEWAY, format!("{e:#}"))
        }
    }
}

fn parse_account(raw: &str) -> Result<AccountId, Response> {
    raw.parse()
        .map_err(|e: crate::domain::ContractError| error(StatusCode::BAD_REQUEST, e.to_string()))
}

/// Axum-based HTTP server.
pub struct HttpServer<V: ViewClient> {
    /// State shared with every handler.
    state: Arc<ApiState<V>>,
    /// Bind address, e.g. `0.0.0.0:8080`.
    bind_address: String,
}

impl<V: ViewClient> HttpServer<V> {
    /// Create a new server.
    pub fn new(state: Arc<ApiState<V>>, bind_address: String) -> Self {
        Self {
            state,
            bind_address,
        }
    }

    pub fn router(state: Arc<ApiState<V>>) -> Router {
        Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .route("/metrics", get(Self::metrics))
            .route("/api/indices", get(Self::indices))
            .route("/api/indices/:index/prices", get(Self::prices))
            .route("/api/portfolio/:account", get(Self::portfolio))
            .route("/api/pools", get(Self::pools))
            .with_state(state)
    }

    /// Serve until shutdown is signalled.
    #[instrument(skip(self, shutdown_rx), fields(address = %self.bind_address))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = Self::router(Arc::clone(&self.state));
        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;

        info!(address = %self.bind_address, "HTTP server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness probe: returns 200 only if chain reads succeed.
    async fn readiness(State(state): State<Arc<ApiState<V>>>) -> impl IntoResponse {
        if state.health.is_ready() {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }

    async fn metrics(State(state): State<Arc<ApiState<V>>>) -> Response {
        match state.metrics.render() {
            Ok(text) => text.into_response(),
            Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }

    async fn indices(State(state): State<Arc<ApiState<V>>>) -> Response {
        let result = state.explorer.explore().await;
        respond(&state.health, result)
    }

    async fn prices(
        State(state): State<Arc<ApiState<V>>>,
        Path(index): Path<String>,
    ) -> Response {
        let index = match parse_account(&index) {
            Ok(index) => index,
            Err(response) => return response,
        };
        let result = state.explorer.token_prices(&index).await;
        respond(&state.health, result)
    }

    async fn portfolio(
        State(state): State<Arc<ApiState<V>>>,
        Path(account): Path<String>,
    ) -> Response {
        let account = match parse_account(&account) {
            Ok(account) => account,
            Err(response) => return response,
        };
        let result = state.explorer.portfolio(&account).await;
        respond(&state.health, result)
    }

    async fn pools(State(state): State<Arc<ApiState<V>>>) -> Response {
        let result = state.explorer.simple_pools_with_wnear().await;
        respond(&state.health, result)
    }
}
