//! Transaction Builder - Wallet Transactions for Index Actions
//!
//! Turns user intents (create, buy, swap, redeem) into wallet-selector
//! transactions and hands them to the wallet port. Submission is
//! fire-and-forget: no receipt tracking and no retry.
//!
//! Key design decisions:
//! - Every action carries the 300 TGas ceiling; the contract splits it.
//! - Buy sizing leaves a 5x buffer per token and another 5x on the total,
//!   so quote drift between pricing and execution does not fail the chain.

use std::sync::Arc;

use anyhow::{Context, Result};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, instrument};

use crate::domain::units::{ONE_NEAR, ONE_YOCTO, THREE_HUNDRED_TGAS};
use crate::domain::{
  AccountId, Balance, CreateIndexForm, Transaction, TransactionEnvelope, WalletAction, U128,
};
use crate::ports::wallet::WalletSubmitter;
use crate::usecases::explorer::TokenPrice;

/// Deposit attached to `deploy_new_index`.
pub const CREATE_INDEX_DEPOSIT: Balance = 26 * ONE_NEAR;

/// Buffer applied to per-token amounts and again to the total.
const BUY_BUFFER: u32 = 5;

/// Sizing of a `buy_index_token` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyQuote {
  /// Smallest index amount the cheapest token allows.
  pub min_purchase: u128,
  /// NEAR budget per underlying token, basket order.
  pub near_amounts: Vec<U128>,
  /// Deposit attached to the call.
  pub deposit: Balance,
}

fn ceil_u128(value: Decimal) -> Result<u128> {
  value
    .ceil()
    .to_u128()
    .with_context(|| format!("{value} does not fit a yocto amount"))
}

/// Size a purchase of `amount` index tokens at `prices`.
///
/// # Errors
/// Returns error for an empty basket, a missing or non-positive price, an
/// amount below the minimum purchase, or arithmetic overflow.
pub fn quote_buy(prices: &[TokenPrice], amount: u128) -> Result<BuyQuote> {
  anyhow::ensure!(!prices.is_empty(), "Index has no priced tokens");

  let mut known = Vec::with_capacity(prices.len());
  for p in prices {
    let price = p
      .price
      .with_context(|| format!("No price for {}", p.token))?;
    anyhow::ensure!(price > Decimal::ZERO, "Price of {} is not positive", p.token);
    known.push(price);
  }

  let cheapest = known.iter().copied().min().unwrap_or(Decimal::ONE);
  let min_purchase = ceil_u128(Decimal::ONE / cheapest)?;
  anyhow::ensure!(
    amount >= min_purchase,
    "Minimum purchase amount is {min_purchase}"
  );

  let amount = Decimal::from_u128(amount).context("Purchase amount overflows")?;
  let buffer = Decimal::from(BUY_BUFFER);
  let mut near_amounts = Vec::with_capacity(known.len());
  let mut sum: u128 = 0;
  for price in known {
    let raw = price
      .checked_mul(amount)
      .and_then(|v| v.checked_mul(buffer))
      .context("Token budget overflows")?;
    let near = ceil_u128(raw)?;
    sum = sum.checked_add(near).context("Token budget overflows")?;
    near_amounts.push(U128(near));
  }
  let deposit = sum
    .checked_mul(u128::from(BUY_BUFFER))
    .context("Deposit overflows")?;

  Ok(BuyQuote {
    min_purchase,
    near_amounts,
    deposit,
  })
}

/// Builds and submits wallet transactions.
pub struct TransactionBuilder<W: WalletSubmitter> {
  /// Index manager, receiver of `deploy_new_index`.
  manager: AccountId,
  /// Wallet port.
  wallet: Arc<W>,
  /// Deposit attached to `deploy_new_index`.
  create_deposit: Balance,
}

impl<W: WalletSubmitter> TransactionBuilder<W> {
  pub fn new(manager: AccountId, wallet: Arc<W>) -> Self {
    Self {
      manager,
      wallet,
      create_deposit: CREATE_INDEX_DEPOSIT,
    }
  }

  /// Override the deposit attached to `deploy_new_index`.
  #[must_use]
  pub fn with_create_deposit(mut self, deposit: Balance) -> Self {
    self.create_deposit = deposit;
    self
  }

  fn single(
    signer: &AccountId,
    receiver: &AccountId,
    method: &str,
    args: serde_json::Value,
    deposit: Balance,
  ) -> Transaction {
    Transaction {
      signer_id: signer.clone(),
      receiver_id: receiver.clone(),
      actions: vec![WalletAction::function_call(
        method,
        args,
        THREE_HUNDRED_TGAS,
        deposit,
      )],
    }
  }

  /// `deploy_new_index` on the manager, 26 NEAR attached unless overridden.
  ///
  /// # Errors
  /// Returns error if the form is incomplete or invalid.
  pub fn create_index(&self, signer: &AccountId, form: &CreateIndexForm) -> Result<Transaction> {
    let args = form.into_args().context("Create form is incomplete")?;
    Ok(Self::single(
      signer,
      &self.manager,
      "deploy_new_index",
      serde_json::to_value(&args)?,
      self.create_deposit,
    ))
  }

  /// `buy_index_token` sized from the current prices.
  ///
  /// # Errors
  /// See [`quote_buy`].
  pub fn buy(
    &self,
    signer: &AccountId,
    index: &AccountId,
    prices: &[TokenPrice],
    amount: u128,
  ) -> Result<Transaction> {
    let quote = quote_buy(prices, amount)?;
    Ok(Self::single(
      signer,
      index,
      "buy_index_token",
      json!({
        "near_amounts": quote.near_amounts,
        "token_amount": U128(amount),
      }),
      quote.deposit,
    ))
  }

  /// Plain `swap` with caller-chosen amounts and deposit.
  ///
  /// # Errors
  /// Returns error if no amount is given or the deposit is zero.
  pub fn swap(
    &self,
    signer: &AccountId,
    index: &AccountId,
    token_amounts: &[U128],
    near_amount: U128,
    deposit: Balance,
  ) -> Result<Transaction> {
    anyhow::ensure!(!token_amounts.is_empty(), "No token amounts given");
    anyhow::ensure!(deposit > 0, "Swap needs an attached deposit");
    Ok(Self::single(
      signer,
      index,
      "swap",
      json!({
        "token_amounts": token_amounts,
        "near_amount": near_amount,
      }),
      deposit,
    ))
  }

  /// `redeem_index_token` of the whole `balance`, 1 yocto attached.
  ///
  /// # Errors
  /// Returns error for a zero balance.
  pub fn redeem(&self, signer: &AccountId, index: &AccountId, balance: U128) -> Result<Transaction> {
    anyhow::ensure!(balance.0 > 0, "Nothing to redeem");
    Ok(Self::single(
      signer,
      index,
      "redeem_index_token",
      json!({ "token_amount": balance }),
      ONE_YOCTO,
    ))
  }

  /// Wrap `transactions` in an envelope and hand it to the wallet.
  ///
  /// # Errors
  /// Returns error if the batch is empty or the wallet rejects it.
  #[instrument(skip_all, fields(count = transactions.len()))]
  pub async fn send(&self, transactions: Vec<Transaction>) -> Result<TransactionEnvelope> {
    anyhow::ensure!(!transactions.is_empty(), "Nothing to send");
    let envelope = TransactionEnvelope::new(transactions);
    self
      .wallet
      .submit(&envelope)
      .await
      .with_context(|| format!("Wallet rejected envelope {}", envelope.id))?;

    let deposit: Balance = envelope.transactions.iter().map(Transaction::total_deposit).sum();
    info!(envelope = %envelope.id, deposit, "Envelope submitted");
    Ok(envelope)
  }
}
