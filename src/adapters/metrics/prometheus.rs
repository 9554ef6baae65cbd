//! Prometheus Metrics Registry - Index Service Observability
//!
//! Counts RPC view calls, executed chain calls and submitted wallet
//! envelopes. Exposed as text on `/metrics` by the HTTP server.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::domain::ChainReport;

/// Centralized Prometheus metrics.
///
/// All metrics follow the naming convention `index_token_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// View call latency histogram (milliseconds).
    pub view_latency_ms: HistogramVec,
    /// View calls by method and status.
    pub view_calls: IntCounterVec,
    /// RPC retries after transport or server errors.
    pub rpc_retries: IntCounter,
    /// Executed chain calls by method and status.
    pub chain_calls: IntCounterVec,
    /// Logical duration of executed chains, in scheduler ticks.
    pub chain_ticks: HistogramVec,
    /// Wallet envelopes handed to the submitter.
    pub envelopes_submitted: IntCounter,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let view_latency_ms = HistogramVec::new(
            HistogramOpts::new(
                "index_token_view_latency_ms",
                "View call latency in milliseconds",
            )
            .buckets(vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0, 5000.0]),
            &["method"],
        )?;

        let view_calls = IntCounterVec::new(
            Opts::new("index_token_view_calls_total", "Total view calls"),
            &["method", "status"],
        )?;

        let rpc_retries = IntCounter::new(
            "index_token_rpc_retries_total",
            "RPC requests retried after a transient error",
        )?;

        let chain_calls = IntCounterVec::new(
            Opts::new(
                "index_token_chain_calls_total",
                "Calls executed by the scheduler",
            ),
            &["method", "status"],
        )?;

        let chain_ticks = HistogramVec::new(
            HistogramOpts::new(
                "index_token_chain_ticks",
                "Scheduler ticks from first start to last finish",
            )
            .buckets(vec![2.0, 4.0, 8.0, 16.0, 32.0, 64.0]),
            &["status"],
        )?;

        let envelopes_submitted = IntCounter::new(
            "index_token_envelopes_submitted_total",
            "Wallet envelopes submitted",
        )?;

        registry.register(Box::new(view_latency_ms.clone()))?;
        registry.register(Box::new(view_calls.clone()))?;
        registry.register(Box::new(rpc_retries.clone()))?;
        registry.register(Box::new(chain_calls.clone()))?;
        registry.register(Box::new(chain_ticks.clone()))?;
        registry.register(Box::new(envelopes_submitted.clone()))?;

        Ok(Self {
            registry,
            view_latency_ms,
            view_calls,
            rpc_retries,
            chain_calls,
            chain_ticks,
            envelopes_submitted,
        })
    }

    /// Record one view call.
    pub fn observe_view(&self, method: &str, ok: bool, latency_ms: f64) {
        let status = if ok { "ok" } else { "error" };
        self.view_calls.with_label_values(&[method, status]).inc();
        self.view_latency_ms
            .with_label_values(&[method])
            .observe(latency_ms);
    }

    /// Record every call of an executed chain.
    pub fn observe_chain(&self, report: &ChainReport) {
        for call in &report.calls {
            let status = if call.success { "ok" } else { "failed" };
            for method in &call.actions {
                self.chain_calls
                    .with_label_values(&[method.as_str(), status])
                    .inc();
            }
        }

        let first = report.calls.iter().map(|c| c.started).min().unwrap_or(0);
        let last = report.calls.iter().map(|c| c.finished).max().unwrap_or(0);
        let status = if report.is_success() { "ok" } else { "failed" };
        #[allow(clippy::cast_precision_loss)]
        self.chain_ticks
            .with_label_values(&[status])
            .observe(last.saturating_sub(first) as f64);
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
