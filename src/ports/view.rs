//! View Client Port - Read-only Contract Queries
//!
//! Defines the trait for calling view methods on deployed contracts.
//! The data layer (`Explorer`) is written only against this port, so
//! it runs unchanged over the JSON-RPC adapter and the local sandbox.
//!
//! Key design decisions:
//! - Arguments and results are plain JSON values (view methods are JSON in/out)
//! - Finality is an adapter concern (the RPC adapter reads `optimistic`)
//! - Errors are per-call; callers decide whether one failure aborts a listing

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::domain::AccountId;

/// Trait for read-only contract access.
#[async_trait]
pub trait ViewClient: Send + Sync + 'static {
  /// Call view method `method` on `account` with JSON `args`.
  ///
  /// # Errors
  /// Returns error if the account has no contract, the method panics,
  /// or the transport fails.
  async fn view_call(
    &self,
    account: &AccountId,
    method: &str,
    args: Value,
  ) -> anyhow::Result<Value>;
}

/// Decode a view result into `T`.
///
/// # Errors
/// Returns error if the JSON does not match `T`.
pub fn decode<T: DeserializeOwned>(
  value: Value,
  account: &AccountId,
  method: &str,
) -> anyhow::Result<T> {
  serde_json::from_value(value)
    .map_err(|e| anyhow::anyhow!("Unexpected {method} result from {account}: {e}"))
}
