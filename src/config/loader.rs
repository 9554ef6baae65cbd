//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::{AppConfig, NetworkMode};
use crate::domain::units::Gas;

/// Upper bound on RPC retries per view.
const MAX_RETRIES: u32 = 10;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    mode = ?config.network.mode,
    manager = %config.contracts.manager,
    exchange = %config.contracts.exchange,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration text.
///
/// # Errors
/// Returns error if parsing or validation fails.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content).context("Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Distinct well-known accounts
/// - A usable RPC endpoint in rpc mode
/// - Positive gas that fits the 300 TGas ceiling
/// - Positive deposits, probe amount and page size
fn validate_config(config: &AppConfig) -> Result<()> {
  // Accounts
  let c = &config.contracts;
  anyhow::ensure!(
    c.manager != c.exchange && c.manager != c.wnear && c.exchange != c.wnear,
    "manager, exchange and wnear must be distinct accounts"
  );

  // Network
  if config.network.mode == NetworkMode::Rpc {
    anyhow::ensure!(
      config.network.rpc_url.starts_with("http://") || config.network.rpc_url.starts_with("https://"),
      "rpc_url must be an http(s) URL, got {}",
      config.network.rpc_url
    );
  }
  anyhow::ensure!(
    config.network.timeout_ms > 0,
    "timeout_ms must be positive"
  );
  anyhow::ensure!(
    config.network.max_concurrent > 0,
    "max_concurrent must be positive"
  );
  anyhow::ensure!(
    config.network.requests_per_second > 0,
    "requests_per_second must be positive"
  );
  anyhow::ensure!(
    config.network.max_retries <= MAX_RETRIES,
    "max_retries must be at most {MAX_RETRIES}, got {}",
    config.network.max_retries
  );

  // Gas
  let ceiling = Gas::MAX.as_tgas();
  for (name, tgas) in config.gas.values() {
    anyhow::ensure!(
      tgas > 0 && tgas <= ceiling,
      "gas.{} must be in (0, {}] TGas, got {}",
      name,
      ceiling,
      tgas
    );
  }

  // Deposits
  anyhow::ensure!(
    config.deposits.create_index()? > 0,
    "deposits.create_index_near must be positive"
  );

  // Quotes
  anyhow::ensure!(
    config.quote.probe_amount > 0,
    "quote.probe_amount must be positive"
  );
  anyhow::ensure!(
    config.quote.pool_page_size > 0,
    "quote.pool_page_size must be positive"
  );

  Ok(())
}
