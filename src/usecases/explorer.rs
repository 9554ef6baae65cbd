//! Explorer - Read-only Index Data Layer
//!
//! Everything the browse, portfolio and create pages display:
//! - index listing with metadata and per-token indicative prices
//! - per-account portfolio (zero balances excluded)
//! - pool discovery for the create form (simple wNEAR pools whose other
//!   token is whitelisted)
//!
//! Prices come from the exchange's `get_return` at a fixed probe amount,
//! token in and wNEAR out, divided by that amount to give yoctoNEAR per
//! token unit. A failed quote is logged and reported as an
//! absent price; it never aborts the listing.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::future::{join_all, try_join_all};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::domain::wire::{GetPoolsArgs, GetReturnArgs, PoolInfo};
use crate::domain::{AccountId, FungibleTokenMetadata, PoolId, U128};
use crate::ports::view::{decode, ViewClient};

/// Accounts and quoting parameters the explorer reads against.
#[derive(Debug, Clone)]
pub struct ExplorerSettings {
  /// Index manager listing every index.
  pub manager: AccountId,
  /// Exchange used for quotes and pools.
  pub exchange: AccountId,
  /// Quote currency.
  pub wnear: AccountId,
  /// `amount_in` of every quote; prices are divided back by it.
  pub probe_amount: U128,
  /// Page size for `get_pools`.
  pub pool_page_size: u64,
}

/// Indicative price of one underlying token in yoctoNEAR per unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPrice {
  pub token: AccountId,
  pub pool_id: PoolId,
  /// `None` when the quote failed.
  pub price: Option<Decimal>,
}

/// One index as shown on the browse page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexListing {
  pub token: AccountId,
  pub metadata: FungibleTokenMetadata,
  pub prices: Vec<TokenPrice>,
  /// Sum of the known prices.
  pub total_price: Decimal,
}

/// One held index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortfolioEntry {
  pub token: AccountId,
  pub metadata: FungibleTokenMetadata,
  pub balance: U128,
  pub total_price: Decimal,
  /// `balance * total_price`.
  pub value: Decimal,
  pub underlying_tokens: Vec<AccountId>,
}

/// A `(token, pool)` choice for the create form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolChoice {
  pub pool_id: PoolId,
  pub token: AccountId,
  pub token_reserve: U128,
  pub wnear_reserve: U128,
  pub total_fee: u32,
}

/// Quote for `sample` units scaled down to one unit.
fn per_unit(out: U128, sample: U128) -> Option<Decimal> {
  let sample = Decimal::from_u128(sample.0).filter(|p| !p.is_zero())?;
  Decimal::from_u128(out.0)?.checked_div(sample)
}

/// Sum of the prices that are known.
pub fn total_price(prices: &[TokenPrice]) -> Decimal {
  prices.iter().filter_map(|p| p.price).sum()
}

/// Read side of the index product.
pub struct Explorer<V: ViewClient> {
  /// View port.
  view: Arc<V>,
  /// Accounts and quoting parameters.
  settings: ExplorerSettings,
}

impl<V: ViewClient> Explorer<V> {
  /// Create a new explorer.
  pub fn new(view: Arc<V>, settings: ExplorerSettings) -> Self {
    Self { view, settings }
  }

  pub const fn settings(&self) -> &ExplorerSettings {
    &self.settings
  }

  async fn call<T: serde::de::DeserializeOwned>(
    &self,
    account: &AccountId,
    method: &str,
    args: Value,
  ) -> Result<T> {
    let value = self.view.view_call(account, method, args).await?;
    decode(value, account, method)
  }

  /// Every index registered with the manager.
  ///
  /// # Errors
  /// Returns error if the manager cannot be read.
  pub async fn index_tokens(&self) -> Result<Vec<AccountId>> {
    self
      .call(&self.settings.manager, "get_index_tokens", json!({}))
      .await
      .context("Failed to list index tokens")
  }

  /// `ft_metadata` of every token, concurrently, in input order.
  ///
  /// # Errors
  /// Returns error if any token's metadata cannot be read.
  pub async fn metadata(&self, tokens: &[AccountId]) -> Result<Vec<FungibleTokenMetadata>> {
    try_join_all(tokens.iter().map(|t| self.call(t, "ft_metadata", json!({})))).await
  }

  /// # Errors
  /// Returns error if the index cannot be read.
  pub async fn underlying_tokens(&self, index: &AccountId) -> Result<Vec<AccountId>> {
    self.call(index, "get_underlying_tokens", json!({})).await
  }

  /// # Errors
  /// Returns error if the index cannot be read.
  pub async fn underlying_pool_ids(&self, index: &AccountId) -> Result<Vec<PoolId>> {
    self.call(index, "get_underlying_poolids", json!({})).await
  }

  /// # Errors
  /// Returns error if the token cannot be read.
  pub async fn balance_of(&self, token: &AccountId, account: &AccountId) -> Result<U128> {
    self
      .call(token, "ft_balance_of", json!({ "account_id": account }))
      .await
  }

  /// Indicative price of every underlying token of `index`.
  ///
  /// # Errors
  /// Returns error if the basket cannot be read. Individual quote
  /// failures are not errors.
  #[instrument(skip(self), fields(index = %index))]
  pub async fn token_prices(&self, index: &AccountId) -> Result<Vec<TokenPrice>> {
    let tokens = self.underlying_tokens(index).await?;
    let pool_ids = self.underlying_pool_ids(index).await?;
    anyhow::ensure!(
      tokens.len() == pool_ids.len(),
      "Index {index} reports {} tokens but {} pools",
      tokens.len(),
      pool_ids.len()
    );

    let quotes = tokens
      .iter()
      .zip(&pool_ids)
      .map(|(token, pool_id)| self.quote(token, *pool_id));
    Ok(join_all(quotes).await)
  }

  async fn quote(&self, token: &AccountId, pool_id: PoolId) -> TokenPrice {
    let args = GetReturnArgs {
      pool_id,
      token_in: token.clone(),
      amount_in: self.settings.probe_amount,
      token_out: self.settings.wnear.clone(),
    };
    let args = serde_json::to_value(&args).unwrap_or(Value::Null);
    let price = match self
      .call::<U128>(&self.settings.exchange, "get_return", args)
      .await
    {
      Ok(out) => per_unit(out, self.settings.probe_amount),
      Err(e) => {
        warn!(token = %token, pool_id, error = %e, "Price quote failed");
        None
      }
    };
    TokenPrice {
      token: token.clone(),
      pool_id,
      price,
    }
  }

  /// Browse page: every index with metadata and prices.
  ///
  /// # Errors
  /// Returns error if the index list or metadata cannot be read.
  #[instrument(skip(self))]
  pub async fn explore(&self) -> Result<Vec<IndexListing>> {
    let tokens = self.index_tokens().await?;
    let metadata = self.metadata(&tokens).await?;

    let mut listings = Vec::with_capacity(tokens.len());
    for (token, metadata) in tokens.into_iter().zip(metadata) {
      let prices = self.token_prices(&token).await?;
      listings.push(IndexListing {
        total_price: total_price(&prices),
        token,
        metadata,
        prices,
      });
    }
    info!(indices = listings.len(), "Index listing loaded");
    Ok(listings)
  }

  /// Portfolio page: every index `account` holds a non-zero balance of.
  ///
  /// # Errors
  /// Returns error if the index list, metadata or balances cannot be read.
  #[instrument(skip(self), fields(account = %account))]
  pub async fn portfolio(&self, account: &AccountId) -> Result<Vec<PortfolioEntry>> {
    let tokens = self.index_tokens().await?;
    let metadata = self.metadata(&tokens).await?;
    let balances = try_join_all(tokens.iter().map(|t| self.balance_of(t, account))).await?;

    let mut entries = Vec::new();
    for ((token, metadata), balance) in tokens.into_iter().zip(metadata).zip(balances) {
      if balance.0 == 0 {
        debug!(token = %token, "Zero balance, skipped");
        continue;
      }
      let underlying_tokens = self.underlying_tokens(&token).await?;
      let prices = self.token_prices(&token).await?;
      let total_price = total_price(&prices);
      let value = Decimal::from_u128(balance.0)
        .and_then(|b| b.checked_mul(total_price))
        .with_context(|| format!("Portfolio value of {token} overflows"))?;
      entries.push(PortfolioEntry {
        value,
        token,
        metadata,
        balance,
        total_price,
        underlying_tokens,
      });
    }
    info!(holdings = entries.len(), "Portfolio loaded");
    Ok(entries)
  }

  /// Every pool on the exchange, page by page.
  ///
  /// # Errors
  /// Returns error if the exchange cannot be read.
  pub async fn all_pools(&self) -> Result<Vec<PoolInfo>> {
    let exchange = &self.settings.exchange;
    let count: u64 = self.call(exchange, "get_number_of_pools", json!({})).await?;
    let page = self.settings.pool_page_size.max(1);

    let mut pools = Vec::with_capacity(usize::try_from(count).unwrap_or_default());
    let mut from_index = 0;
    while from_index < count {
      let args = serde_json::to_value(GetPoolsArgs {
        from_index,
        limit: page,
      })?;
      let batch: Vec<PoolInfo> = self.call(exchange, "get_pools", args).await?;
      if batch.is_empty() {
        break;
      }
      pools.extend(batch);
      from_index += page;
    }
    Ok(pools)
  }

  /// # Errors
  /// Returns error if the exchange cannot be read.
  pub async fn whitelisted_token_list(&self) -> Result<Vec<AccountId>> {
    self
      .call(&self.settings.exchange, "get_whitelisted_tokens", json!({}))
      .await
  }

  /// Simple pools pairing wNEAR with a whitelisted token, as
  /// `(token, pool)` choices.
  ///
  /// # Errors
  /// Returns error if the exchange cannot be read.
  #[instrument(skip(self))]
  pub async fn simple_pools_with_wnear(&self) -> Result<Vec<PoolChoice>> {
    let whitelist = self.whitelisted_token_list().await?;
    let pools = self.all_pools().await?;
    let wnear = &self.settings.wnear;

    let choices: Vec<PoolChoice> = pools
      .iter()
      .enumerate()
      .filter(|(_, p)| p.is_simple() && p.contains(wnear))
      .filter_map(|(id, p)| {
        let token = p.token_account_ids.iter().find(|t| *t != wnear)?;
        if !whitelist.contains(token) {
          return None;
        }
        Some(PoolChoice {
          pool_id: id as PoolId,
          token: token.clone(),
          token_reserve: p.reserve_of(token)?,
          wnear_reserve: p.reserve_of(wnear)?,
          total_fee: p.total_fee,
        })
      })
      .collect();

    info!(pools = pools.len(), choices = choices.len(), "Pool discovery done");
    Ok(choices)
  }
}
