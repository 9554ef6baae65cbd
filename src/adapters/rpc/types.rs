//! NEAR JSON-RPC Request/Response Types
//!
//! Only the `query` method with `call_function` is used. Results carry the
//! raw return bytes of the view method; contract panics come back inside
//! `result.error`, transport and node errors in the top-level `error`.

use serde::{Deserialize, Serialize};

/// Finality requested for every view.
pub const FINALITY_OPTIMISTIC: &str = "optimistic";

/// JSON-RPC envelope.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest<'a> {
  pub jsonrpc: &'static str,
  pub id: &'static str,
  pub method: &'static str,
  pub params: QueryParams<'a>,
}

/// `query` parameters for a view function call.
#[derive(Debug, Clone, Serialize)]
pub struct QueryParams<'a> {
  pub request_type: &'static str,
  pub finality: &'static str,
  pub account_id: &'a str,
  pub method_name: &'a str,
  /// Base64 of the JSON arguments.
  pub args_base64: String,
}

impl<'a> RpcRequest<'a> {
  /// `query`/`call_function` against `account_id`.
  pub fn call_function(account_id: &'a str, method_name: &'a str, args_base64: String) -> Self {
    Self {
      jsonrpc: "2.0",
      id: "dontcare",
      method: "query",
      params: QueryParams {
        request_type: "call_function",
        finality: FINALITY_OPTIMISTIC,
        account_id,
        method_name,
        args_base64,
      },
    }
  }
}

/// JSON-RPC response.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
  #[serde(default)]
  pub result: Option<CallResult>,
  #[serde(default)]
  pub error: Option<RpcError>,
}

/// Outcome of a view call.
#[derive(Debug, Clone, Deserialize)]
pub struct CallResult {
  /// Raw return bytes.
  #[serde(default)]
  pub result: Option<Vec<u8>>,
  #[serde(default)]
  pub logs: Vec<String>,
  /// Contract-side failure message.
  #[serde(default)]
  pub error: Option<String>,
  #[serde(default)]
  pub block_height: Option<u64>,
}

/// Node-side error.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub code: Option<i64>,
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub data: Option<serde_json::Value>,
}

impl std::fmt::Display for RpcError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.message)?;
    if let Some(name) = &self.name {
      write!(f, " ({name})")?;
    }
    if let Some(data) = &self.data {
      write!(f, ": {data}")?;
    }
    Ok(())
  }
}
