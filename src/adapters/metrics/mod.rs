//! Metrics Adapter
//!
//! Prometheus registry for RPC views, executed call chains and wallet
//! envelopes. Served on `/metrics` by the HTTP adapter.

pub mod prometheus;

pub use prometheus::MetricsRegistry;
