//! Configuration Module - TOML-based Configuration
//!
//! Loads and validates configuration from `config.toml`. Every account
//! the product talks to (manager, exchange, wNEAR), the gas schedule of
//! deployed indices and the wallet deposits are externalized here;
//! nothing network-specific is hardcoded in the domain layer.

pub mod loader;

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::rpc::NearRpcConfig;
use crate::domain::units::{parse_near, Gas};
use crate::domain::{AccountId, Balance, U128};
use crate::usecases::explorer::ExplorerSettings;
use crate::usecases::index_contract::{ContractSettings, GasSchedule};

/// Top-level configuration.
///
/// Loaded from `config.toml` at startup and validated before anything
/// touches the network.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Identity and logging.
  pub app: AppSection,
  /// Where views go.
  pub network: NetworkConfig,
  /// Well-known accounts.
  pub contracts: ContractsConfig,
  /// Gas attached by deployed indices, in TGas.
  #[serde(default)]
  pub gas: GasConfig,
  /// Deposits attached by the wallet transactions.
  #[serde(default)]
  pub deposits: DepositConfig,
  /// Price quoting and pool discovery.
  #[serde(default)]
  pub quote: QuoteConfig,
  /// Default signer of built transactions.
  #[serde(default)]
  pub wallet: WalletConfig,
  /// HTTP serving surface.
  #[serde(default)]
  pub server: ServerConfig,
  /// Transaction outbox.
  #[serde(default)]
  pub outbox: OutboxConfig,
}

/// Identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
  /// Human-readable name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// Backend the read path and the simulator use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
  /// NEAR JSON-RPC node.
  Rpc,
  /// In-process demo chain.
  Sandbox,
}

/// NEAR network configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
  #[serde(default = "default_mode")]
  pub mode: NetworkMode,
  /// JSON-RPC endpoint.
  #[serde(default = "default_rpc_url")]
  pub rpc_url: String,
  /// Request timeout (milliseconds).
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
  /// Maximum in-flight requests.
  #[serde(default = "default_max_concurrent")]
  pub max_concurrent: usize,
  /// Retries on transient errors.
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  /// Base delay of the exponential backoff (milliseconds).
  #[serde(default = "default_retry_base_delay_ms")]
  pub retry_base_delay_ms: u64,
  /// Sustained request rate.
  #[serde(default = "default_requests_per_second")]
  pub requests_per_second: u32,
}

/// Well-known accounts.
///
/// Account ids are ALWAYS in config, never hardcoded.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractsConfig {
  /// Index manager.
  pub manager: AccountId,
  /// Ref-style exchange.
  pub exchange: AccountId,
  /// Wrapped NEAR.
  pub wnear: AccountId,
}

/// Gas schedule in TGas.
#[derive(Debug, Clone, Deserialize)]
pub struct GasConfig {
  #[serde(default = "default_five")]
  pub storage_deposit: u64,
  #[serde(default = "default_five")]
  pub register_tokens: u64,
  #[serde(default = "default_seven")]
  pub near_deposit: u64,
  #[serde(default = "default_forty")]
  pub ft_transfer_call: u64,
  #[serde(default = "default_twenty")]
  pub swap: u64,
  #[serde(default = "default_forty")]
  pub withdraw: u64,
  #[serde(default = "default_forty")]
  pub ft_transfer: u64,
  /// Fixed allotment of the post-swap continuation.
  #[serde(default = "default_callback")]
  pub callback: u64,
  #[serde(default = "default_five")]
  pub mint: u64,
}

impl Default for GasConfig {
  fn default() -> Self {
    Self {
      storage_deposit: default_five(),
      register_tokens: default_five(),
      near_deposit: default_seven(),
      ft_transfer_call: default_forty(),
      swap: default_twenty(),
      withdraw: default_forty(),
      ft_transfer: default_forty(),
      callback: default_callback(),
      mint: default_five(),
    }
  }
}

impl GasConfig {
  pub fn schedule(&self) -> GasSchedule {
    GasSchedule {
      storage_deposit: Gas::from_tgas(self.storage_deposit),
      register_tokens: Gas::from_tgas(self.register_tokens),
      near_deposit: Gas::from_tgas(self.near_deposit),
      ft_transfer_call: Gas::from_tgas(self.ft_transfer_call),
      swap: Gas::from_tgas(self.swap),
      withdraw: Gas::from_tgas(self.withdraw),
      ft_transfer: Gas::from_tgas(self.ft_transfer),
      callback: Gas::from_tgas(self.callback),
      mint: Gas::from_tgas(self.mint),
    }
  }

  fn values(&self) -> [(&'static str, u64); 9] {
    [
      ("storage_deposit", self.storage_deposit),
      ("register_tokens", self.register_tokens),
      ("near_deposit", self.near_deposit),
      ("ft_transfer_call", self.ft_transfer_call),
      ("swap", self.swap),
      ("withdraw", self.withdraw),
      ("ft_transfer", self.ft_transfer),
      ("callback", self.callback),
      ("mint", self.mint),
    ]
  }
}

/// Wallet deposits, as decimal NEAR strings.
#[derive(Debug, Clone, Deserialize)]
pub struct DepositConfig {
  /// Attached to `deploy_new_index`.
  #[serde(default = "default_create_index_near")]
  pub create_index_near: String,
}

impl Default for DepositConfig {
  fn default() -> Self {
    Self {
      create_index_near: default_create_index_near(),
    }
  }
}

impl DepositConfig {
  /// `create_index_near` in yoctoNEAR.
  ///
  /// # Errors
  /// Returns error if the amount is not a decimal NEAR value.
  pub fn create_index(&self) -> Result<Balance> {
    parse_near(&self.create_index_near)
      .with_context(|| format!("Invalid NEAR amount: {}", self.create_index_near))
  }
}

/// Quoting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteConfig {
  /// `amount_in` of every price quote, in the token's smallest unit.
  #[serde(default = "default_probe_amount")]
  pub probe_amount: u64,
  /// Page size for `get_pools`.
  #[serde(default = "default_pool_page_size")]
  pub pool_page_size: u64,
}

impl Default for QuoteConfig {
  fn default() -> Self {
    Self {
      probe_amount: default_probe_amount(),
      pool_page_size: default_pool_page_size(),
    }
  }
}

/// Wallet configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WalletConfig {
  /// Signer used when the command line names none.
  pub signer: Option<AccountId>,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Bind address for probes, metrics and the read API.
  #[serde(default = "default_bind_address")]
  pub bind_address: String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      bind_address: default_bind_address(),
    }
  }
}

/// Outbox configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OutboxConfig {
  /// Directory holding `outbox/*.jsonl`.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
}

impl Default for OutboxConfig {
  fn default() -> Self {
    Self {
      data_dir: default_data_dir(),
    }
  }
}

impl AppConfig {
  pub fn rpc(&self) -> NearRpcConfig {
    NearRpcConfig {
      url: self.network.rpc_url.clone(),
      timeout: Duration::from_millis(self.network.timeout_ms),
      max_concurrent: self.network.max_concurrent,
      max_retries: self.network.max_retries,
      retry_base_delay: Duration::from_millis(self.network.retry_base_delay_ms),
      requests_per_second: self.network.requests_per_second,
    }
  }

  /// Settings every index deployed by the manager starts with.
  pub fn contract_settings(&self) -> ContractSettings {
    ContractSettings {
      exchange: self.contracts.exchange.clone(),
      wnear: self.contracts.wnear.clone(),
      gas: self.gas.schedule(),
    }
  }

  pub fn explorer_settings(&self) -> ExplorerSettings {
    ExplorerSettings {
      manager: self.contracts.manager.clone(),
      exchange: self.contracts.exchange.clone(),
      wnear: self.contracts.wnear.clone(),
      probe_amount: U128(u128::from(self.quote.probe_amount)),
      pool_page_size: self.quote.pool_page_size,
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_mode() -> NetworkMode {
  NetworkMode::Rpc
}

fn default_rpc_url() -> String {
  "https://rpc.testnet.near.org".to_string()
}

fn default_timeout_ms() -> u64 {
  10_000
}

fn default_max_concurrent() -> usize {
  8
}

fn default_max_retries() -> u32 {
  3
}

fn default_retry_base_delay_ms() -> u64 {
  200
}

fn default_requests_per_second() -> u32 {
  20
}

fn default_five() -> u64 {
  5
}

fn default_seven() -> u64 {
  7
}

fn default_twenty() -> u64 {
  20
}

fn default_forty() -> u64 {
  40
}

fn default_callback() -> u64 {
  160
}

fn default_create_index_near() -> String {
  "26".to_string()
}

fn default_probe_amount() -> u64 {
  1_000_000 // one unit of a 6-decimal token
}

fn default_pool_page_size() -> u64 {
  200
}

fn default_bind_address() -> String {
  "0.0.0.0:8080".to_string()
}

fn default_data_dir() -> String {
  "data".to_string()
}
