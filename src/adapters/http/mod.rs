//! HTTP Adapter
//!
//! Serves probes, Prometheus metrics and the explorer's read API.

pub mod server;

pub use server::{ApiState, HealthState, HttpServer};
