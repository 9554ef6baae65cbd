//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (NEAR JSON-RPC, file I/O, HTTP) and an
//! in-process chain for offline runs.
//!
//! Adapter categories:
//! - `http`: probes, metrics and the read API over axum
//! - `metrics`: Prometheus registry
//! - `persistence`: JSONL transaction outbox
//! - `rpc`: NEAR JSON-RPC view client
//! - `sandbox`: in-process chain (tokens, exchange, indices)

pub mod http;
pub mod metrics;
pub mod persistence;
pub mod rpc;
pub mod sandbox;
