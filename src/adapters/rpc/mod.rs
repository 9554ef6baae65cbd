//! NEAR JSON-RPC Adapter
//!
//! Implements the `ViewClient` port against a NEAR RPC node.
//!
//! Sub-modules:
//! - `client`: HTTP client with rate limiting and retries
//! - `types`: JSON-RPC request/response definitions

pub mod client;
pub mod types;

pub use client::{NearRpcClient, NearRpcConfig};
