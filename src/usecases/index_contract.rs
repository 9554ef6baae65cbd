//! Index Contract - Basket Swap, Withdraw and Mint Orchestration
//!
//! The contract deployed on every index account. It owns the basket
//! configuration and the index token ledger, and turns user requests
//! into call graphs:
//! - `initialize`: storage registrations everywhere, then refund
//! - `swap`: wrap → forward → parallel swaps → `withdraw_from_exchange`
//! - `buy_index_token`: same chain, ending in a mint for the buyer
//! - `redeem_index_token`: registrations, then one transfer per token
//!
//! Continuations read the swap results through an explicit slot list
//! that names the token of every position, checked against the basket.
//! A failed or undecodable slot aborts the continuation before any
//! withdrawal is emitted.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::domain::events::{FtMint, FtTransfer, Nep141Event};
use crate::domain::units::{
  FIVE_TGAS, FORTY_TGAS, ONE_YOCTO, SEVEN_TGAS, STORAGE_DEPOSIT, TWENTY_TGAS,
};
use crate::domain::wire::{
  AccountArgs, ExchangeSwapArgs, ExchangeWithdrawArgs, FtTransferArgs, FtTransferCallArgs,
  RegisterTokensArgs, StorageBalance, StorageDepositArgs, SwapAction,
};
use crate::domain::{
  AccountId, Balance, Basket, CallContext, CallGraph, CallOutcome, ContractError, ContractResult,
  FunctionCall, FungibleLedger, FungibleTokenMetadata, Gas, OutboundCall, Pending, PoolId,
  PromiseResult, U128,
};

/// Gas attached to each kind of outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasSchedule {
  /// NEP-145 `storage_deposit`.
  pub storage_deposit: Gas,
  /// Exchange `register_tokens`.
  pub register_tokens: Gas,
  /// wNEAR `near_deposit`.
  pub near_deposit: Gas,
  /// wNEAR `ft_transfer_call` into the exchange.
  pub ft_transfer_call: Gas,
  /// One exchange `swap`.
  pub swap: Gas,
  /// One exchange `withdraw`.
  pub withdraw: Gas,
  /// Underlying `ft_transfer` on redeem.
  pub ft_transfer: Gas,
  /// Fixed allotment of the continuation after the swap batch.
  pub callback: Gas,
  /// `ft_mint` after a buy.
  pub mint: Gas,
}

impl Default for GasSchedule {
  fn default() -> Self {
    Self {
      storage_deposit: FIVE_TGAS,
      register_tokens: FIVE_TGAS,
      near_deposit: SEVEN_TGAS,
      ft_transfer_call: FORTY_TGAS,
      swap: TWENTY_TGAS,
      withdraw: FORTY_TGAS,
      ft_transfer: FORTY_TGAS,
      callback: TWENTY_TGAS * 8,
      mint: FIVE_TGAS,
    }
  }
}

/// Collaborators and gas of a deployed index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractSettings {
  /// Exchange the swaps run against.
  pub exchange: AccountId,
  /// Wrapped NEAR token.
  pub wnear: AccountId,
  /// Per-call gas.
  pub gas: GasSchedule,
}

/// Arguments of `new` / `initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitArgs {
  #[serde(default, alias = "owner")]
  pub owner_id: Option<AccountId>,
  #[serde(default)]
  pub index_token_account: Option<AccountId>,
  pub tokens: Vec<AccountId>,
  pub pool_ids: Vec<PoolId>,
  #[serde(default)]
  pub metadata: Option<FungibleTokenMetadata>,
  /// Supply minted to the index account itself.
  #[serde(default)]
  pub total_supply: Option<U128>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapArgs {
  pub token_amounts: Vec<U128>,
  pub near_amount: U128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawFromExchangeArgs {
  pub near_amount: U128,
  /// Token each joined result belongs to, in result order.
  pub slots: Vec<AccountId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyArgs {
  pub near_amounts: Vec<U128>,
  pub token_amount: U128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyCallbackArgs {
  pub token_amount: U128,
  pub slots: Vec<AccountId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemArgs {
  pub token_amount: U128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintArgs {
  pub account_id: AccountId,
  pub amount: U128,
}

#[derive(Debug, Clone)]
struct IndexState {
  basket: Basket,
  metadata: FungibleTokenMetadata,
  ledger: FungibleLedger,
}

/// Index token contract.
#[derive(Debug, Clone)]
pub struct IndexContract {
  /// Collaborators and gas schedule.
  settings: ContractSettings,
  /// `None` until `initialize` succeeds.
  state: Option<IndexState>,
}

impl IndexContract {
  /// Create an uninitialized contract.
  pub const fn new(settings: ContractSettings) -> Self {
    Self {
      settings,
      state: None,
    }
  }

  pub const fn settings(&self) -> &ContractSettings {
    &self.settings
  }

  pub const fn is_initialized(&self) -> bool {
    self.state.is_some()
  }

  pub fn basket(&self) -> Option<&Basket> {
    self.state.as_ref().map(|s| &s.basket)
  }

  /// Deposit `initialize` keeps back: one storage registration per token,
  /// wNEAR, the exchange and the contract's own reserve, plus the
  /// `register_tokens` yocto.
  pub const fn initialize_reserve(basket_len: usize) -> Balance {
    (basket_len as Balance + 3) * STORAGE_DEPOSIT + ONE_YOCTO
  }

  /// Deposit kept back from a swap to cover the 1-yocto calls of the chain.
  pub const fn security_margin(basket_len: usize) -> Balance {
    (2 * basket_len as Balance + 1) * ONE_YOCTO
  }

  fn state(&self) -> ContractResult<&IndexState> {
    self.state.as_ref().ok_or(ContractError::NotInitialized)
  }

  fn state_mut(&mut self) -> ContractResult<&mut IndexState> {
    self.state.as_mut().ok_or(ContractError::NotInitialized)
  }

  // ─── Entry points ────────────────────────────────────────

  /// Route a function call by method name.
  ///
  /// # Errors
  /// Returns the contract error of the method, or `MethodNotFound`.
  pub fn call(&mut self, ctx: &CallContext, call: &FunctionCall) -> ContractResult<CallOutcome> {
    match call.method_name.as_str() {
      "new" | "initialize" => self.initialize(ctx, call.args_json()?).map(CallOutcome::Promise),
      "swap" => {
        let args: SwapArgs = call.args_json()?;
        self
          .swap(ctx, &args.token_amounts, args.near_amount)
          .map(CallOutcome::Promise)
      }
      "withdraw_from_exchange" => {
        let args: WithdrawFromExchangeArgs = call.args_json()?;
        self
          .withdraw_from_exchange(ctx, args.near_amount, &args.slots)
          .map(CallOutcome::Promise)
      }
      "buy_index_token" => {
        let args: BuyArgs = call.args_json()?;
        self
          .buy_index_token(ctx, &args.near_amounts, args.token_amount)
          .map(CallOutcome::Promise)
      }
      "buy_index_token_callback" => {
        let args: BuyCallbackArgs = call.args_json()?;
        self
          .buy_index_token_callback(ctx, args.token_amount, &args.slots)
          .map(CallOutcome::Promise)
      }
      "redeem_index_token" => {
        let args: RedeemArgs = call.args_json()?;
        self
          .redeem_index_token(ctx, args.token_amount)
          .map(CallOutcome::Promise)
      }
      "ft_mint" => {
        let args: MintArgs = call.args_json()?;
        self.ft_mint(ctx, &args.account_id, args.amount)?;
        Ok(CallOutcome::empty())
      }
      "ft_transfer" => {
        let args: FtTransferArgs = call.args_json()?;
        self.ft_transfer(ctx, &args)?;
        Ok(CallOutcome::empty())
      }
      "storage_deposit" => {
        let args: StorageDepositArgs = call.args_json()?;
        let balance = self.storage_deposit(ctx, args.account_id)?;
        Ok(CallOutcome::json(&balance))
      }
      view => {
        let args: Value = call.args_json()?;
        self.view(view, args).map(|v| CallOutcome::json(&v))
      }
    }
  }

  /// Answer a view method.
  ///
  /// # Errors
  /// `MethodNotFound` for unknown methods, `NotInitialized` before setup.
  pub fn view(&self, method: &str, args: Value) -> ContractResult<Value> {
    let state = self.state()?;
    let value = match method {
      "ft_balance_of" => {
        let args: AccountArgs = parse_args(method, args)?;
        json!(U128(state.ledger.balance_of(&args.account_id)))
      }
      "ft_total_supply" => json!(U128(state.ledger.total_supply())),
      "ft_metadata" => json!(state.metadata),
      "get_underlying_tokens" => json!(state.basket.tokens()),
      "get_underlying_poolids" => json!(state.basket.pool_ids()),
      "get_owner" => json!(state.basket.owner()),
      "storage_balance_of" => {
        let args: AccountArgs = parse_args(method, args)?;
        if state.ledger.is_registered(&args.account_id) {
          json!(StorageBalance {
            total: U128(STORAGE_DEPOSIT),
            available: U128(0),
          })
        } else {
          Value::Null
        }
      }
      other => return Err(ContractError::MethodNotFound(other.to_string())),
    };
    Ok(value)
  }

  // ─── Call chain builders ─────────────────────────────────

  /// Set up the index and register it with every collaborator.
  ///
  /// Emits a storage deposit on each token, on wNEAR and on the exchange,
  /// plus `register_tokens`, all joined, then refunds the remainder of the
  /// attached deposit to the signer.
  ///
  /// # Errors
  /// `AlreadyInitialized`, the basket errors, `InsufficientDeposit` and
  /// `GasBudgetExceeded`, all before any state is written.
  #[instrument(skip_all, fields(index = %ctx.current_account, tokens = args.tokens.len()))]
  pub fn initialize(&mut self, ctx: &CallContext, args: InitArgs) -> ContractResult<CallGraph> {
    if self.state.is_some() {
      return Err(ContractError::AlreadyInitialized);
    }

    let owner = args.owner_id.unwrap_or_else(|| ctx.current_account.clone());
    let index_token_account = args
      .index_token_account
      .unwrap_or_else(|| ctx.current_account.clone());
    let basket = Basket::new(owner, index_token_account, args.tokens, args.pool_ids)?;

    let metadata = match args.metadata {
      Some(metadata) => {
        metadata.assert_valid()?;
        metadata
      }
      None => FungibleTokenMetadata::index(ctx.current_account.as_str(), "INDEX"),
    };

    let reserve = Self::initialize_reserve(basket.len());
    if ctx.attached_deposit < reserve {
      return Err(ContractError::InsufficientDeposit {
        attached: ctx.attached_deposit,
        required: reserve,
      });
    }
    let refund = ctx.attached_deposit - reserve;

    let mut graph = CallGraph::new();
    let mut registrations = Pending::empty();
    for entry in basket.entries() {
      let call = OutboundCall::new(entry.token.clone()).function_call(self.storage_deposit_call(None)?);
      registrations = registrations.and(graph.spawn(call));
    }
    for account in [&self.settings.wnear, &self.settings.exchange] {
      let call = OutboundCall::new(account.clone()).function_call(self.storage_deposit_call(None)?);
      registrations = registrations.and(graph.spawn(call));
    }
    let register = FunctionCall::json(
      "register_tokens",
      &RegisterTokensArgs {
        token_ids: basket.tokens(),
      },
      ONE_YOCTO,
      self.settings.gas.register_tokens,
    )?;
    registrations =
      registrations.and(graph.spawn(OutboundCall::new(self.settings.exchange.clone()).function_call(register)));
    graph.then(&registrations, OutboundCall::new(ctx.signer.clone()).transfer(refund));
    graph.check_gas("initialize", ctx.gas_budget())?;

    let mut ledger = FungibleLedger::new();
    ledger.register(&ctx.current_account);
    ledger.register(basket.owner());
    if let Some(supply) = args.total_supply.filter(|s| s.0 > 0) {
      ledger.mint(&ctx.current_account, supply.0)?;
      emit(&Nep141Event::FtMint(vec![FtMint {
        owner_id: ctx.current_account.clone(),
        amount: supply,
        memo: Some("Initial token supply is minted".into()),
      }]));
    }

    info!(
      owner = %basket.owner(),
      symbol = %metadata.symbol,
      refund,
      calls = graph.len(),
      "Index initialized"
    );

    self.state = Some(IndexState {
      basket,
      metadata,
      ledger,
    });
    Ok(graph)
  }

  /// Spend the attached NEAR across the basket.
  ///
  /// `token_amounts[i]` is the wNEAR put into pool `i`; `near_amount` is
  /// the wNEAR withdrawn back from the exchange afterwards.
  ///
  /// # Errors
  /// `TokenAmountsLengthIsIncorrect`, `InsufficientDeposit`,
  /// `GasBudgetExceeded`; nothing is emitted on error.
  #[instrument(skip_all, fields(index = %ctx.current_account, near_amount = %near_amount))]
  pub fn swap(
    &self,
    ctx: &CallContext,
    token_amounts: &[U128],
    near_amount: U128,
  ) -> ContractResult<CallGraph> {
    let basket = &self.state()?.basket;
    basket.check_amounts_len(token_amounts.len())?;
    let spend = Self::spend_after_margin(ctx, basket.len())?;

    let withdrawals = basket.len() as u64 + u64::from(near_amount.0 > 0);
    self.check_callback_budget("withdraw_from_exchange", self.settings.gas.withdraw * withdrawals)?;

    let mut graph = CallGraph::new();
    let wrap = graph.spawn(self.wrap_and_forward(spend)?);
    let swaps = self.swap_batch(&mut graph, &wrap, basket, token_amounts)?;
    let callback = FunctionCall::json(
      "withdraw_from_exchange",
      &WithdrawFromExchangeArgs {
        near_amount,
        slots: basket.tokens(),
      },
      ONE_YOCTO * basket.len() as Balance,
      self.settings.gas.callback,
    )?;
    graph.then(&swaps, OutboundCall::new(ctx.current_account.clone()).function_call(callback));
    graph.check_gas("swap", ctx.gas_budget())?;

    info!(spend, calls = graph.len(), gas = %graph.total_gas(), "Swap chain built");
    Ok(graph)
  }

  /// Continuation of `swap`: withdraw every swap output, and `near_amount`
  /// of wNEAR, from the exchange back to this account.
  ///
  /// # Errors
  /// `PrivateMethod`, `SlotMismatch`, `SlotFailed`, `SlotDecode`.
  #[instrument(skip_all, fields(index = %ctx.current_account, near_amount = %near_amount, results = ctx.promise_results.len()))]
  pub fn withdraw_from_exchange(
    &self,
    ctx: &CallContext,
    near_amount: U128,
    slots: &[AccountId],
  ) -> ContractResult<CallGraph> {
    ctx.assert_private("withdraw_from_exchange")?;
    let state = self.state()?;
    let outputs = read_slots(&state.basket, slots, &ctx.promise_results)?;

    let mut exchange = OutboundCall::new(self.settings.exchange.clone());
    for (token, amount) in &outputs {
      exchange = exchange.function_call(self.withdraw_call(token, *amount)?);
    }
    if near_amount.0 > 0 {
      exchange = exchange.function_call(self.withdraw_call(&self.settings.wnear, near_amount.0)?);
    }

    let mut graph = CallGraph::new();
    graph.spawn(exchange);
    info!(withdrawals = outputs.len(), near_amount = %near_amount, "Withdrawing swap outputs");
    Ok(graph)
  }

  /// Buy `token_amount` index tokens for the caller.
  ///
  /// The buyer's registration on the index token runs alongside the wrap;
  /// the swaps wait for both.
  ///
  /// # Errors
  /// `NearAmountsLenMismatch`, `ZeroAmount`, `InsufficientDeposit`,
  /// `GasBudgetExceeded`.
  #[instrument(skip_all, fields(index = %ctx.current_account, buyer = %ctx.predecessor, token_amount = %token_amount))]
  pub fn buy_index_token(
    &self,
    ctx: &CallContext,
    near_amounts: &[U128],
    token_amount: U128,
  ) -> ContractResult<CallGraph> {
    let basket = &self.state()?.basket;
    if near_amounts.len() != basket.len() {
      return Err(ContractError::NearAmountsLenMismatch {
        expected: basket.len(),
        got: near_amounts.len(),
      });
    }
    if token_amount.0 == 0 {
      return Err(ContractError::ZeroAmount);
    }
    let spend = Self::spend_after_margin(ctx, basket.len())?;
    self.check_callback_budget(
      "buy_index_token_callback",
      self.settings.gas.withdraw * basket.len() as u64 + self.settings.gas.mint,
    )?;

    let mut graph = CallGraph::new();
    let registration = graph.spawn(
      OutboundCall::new(basket.index_token_account().clone())
        .function_call(self.storage_deposit_call(Some(&ctx.predecessor))?),
    );
    let wrap = graph.spawn(self.wrap_and_forward(spend)?);
    let swaps = self.swap_batch(&mut graph, &registration.and(wrap), basket, near_amounts)?;
    let callback = FunctionCall::json(
      "buy_index_token_callback",
      &BuyCallbackArgs {
        token_amount,
        slots: basket.tokens(),
      },
      ONE_YOCTO * basket.len() as Balance,
      self.settings.gas.callback,
    )?;
    graph.then(&swaps, OutboundCall::new(ctx.current_account.clone()).function_call(callback));
    graph.check_gas("buy_index_token", ctx.gas_budget())?;

    info!(spend, calls = graph.len(), "Buy chain built");
    Ok(graph)
  }

  /// Continuation of `buy_index_token`: every swap must have produced at
  /// least `token_amount`; withdraw that much of each token, then mint
  /// `token_amount` index tokens to the signer.
  ///
  /// # Errors
  /// `PrivateMethod`, the slot errors, `SwapOutputTooLow`.
  #[instrument(skip_all, fields(index = %ctx.current_account, token_amount = %token_amount))]
  pub fn buy_index_token_callback(
    &self,
    ctx: &CallContext,
    token_amount: U128,
    slots: &[AccountId],
  ) -> ContractResult<CallGraph> {
    ctx.assert_private("buy_index_token_callback")?;
    let state = self.state()?;
    let outputs = read_slots(&state.basket, slots, &ctx.promise_results)?;

    let mut exchange = OutboundCall::new(self.settings.exchange.clone());
    for (token, got) in &outputs {
      if *got < token_amount.0 {
        return Err(ContractError::SwapOutputTooLow {
          token: token.to_string(),
          got: *got,
          need: token_amount.0,
        });
      }
      exchange = exchange.function_call(self.withdraw_call(token, token_amount.0)?);
    }

    let mint = FunctionCall::json(
      "ft_mint",
      &MintArgs {
        account_id: ctx.signer.clone(),
        amount: token_amount,
      },
      0,
      self.settings.gas.mint,
    )?;

    let mut graph = CallGraph::new();
    let withdrawn = graph.spawn(exchange);
    graph.then(
      &withdrawn,
      OutboundCall::new(state.basket.index_token_account().clone()).function_call(mint),
    );
    Ok(graph)
  }

  /// Return `token_amount` of every underlying token for as many index
  /// tokens, which move from the caller to this account.
  ///
  /// # Errors
  /// Ledger errors (unregistered caller, insufficient balance, zero amount)
  /// and `GasBudgetExceeded`.
  #[instrument(skip_all, fields(index = %ctx.current_account, holder = %ctx.predecessor, token_amount = %token_amount))]
  pub fn redeem_index_token(
    &mut self,
    ctx: &CallContext,
    token_amount: U128,
  ) -> ContractResult<CallGraph> {
    let mut graph = CallGraph::new();
    {
      let basket = &self.state()?.basket;
      let mut registrations = Pending::empty();
      for entry in basket.entries() {
        let call = OutboundCall::new(entry.token.clone())
          .function_call(self.storage_deposit_call(Some(&ctx.predecessor))?);
        registrations = registrations.and(graph.spawn(call));
      }
      for entry in basket.entries() {
        let transfer = FunctionCall::json(
          "ft_transfer",
          &FtTransferArgs {
            receiver_id: ctx.predecessor.clone(),
            amount: token_amount,
            memo: None,
          },
          ONE_YOCTO,
          self.settings.gas.ft_transfer,
        )?;
        graph.then(&registrations, OutboundCall::new(entry.token.clone()).function_call(transfer));
      }
      graph.check_gas("redeem_index_token", ctx.gas_budget())?;
    }

    let state = self.state_mut()?;
    state
      .ledger
      .transfer(&ctx.predecessor, &ctx.current_account, token_amount.0)?;
    emit(&Nep141Event::FtTransfer(vec![FtTransfer {
      old_owner_id: ctx.predecessor.clone(),
      new_owner_id: ctx.current_account.clone(),
      amount: token_amount,
      memo: Some("redeem".into()),
    }]));

    info!(calls = graph.len(), "Redeem chain built");
    Ok(graph)
  }

  // ─── Token surface ───────────────────────────────────────

  /// Mint index tokens. Only the contract itself may call this.
  ///
  /// # Errors
  /// `PrivateMethod`, `ZeroAmount`, supply/balance overflow.
  #[instrument(skip_all, fields(index = %ctx.current_account, account = %account_id, amount = %amount))]
  pub fn ft_mint(
    &mut self,
    ctx: &CallContext,
    account_id: &AccountId,
    amount: U128,
  ) -> ContractResult<()> {
    ctx.assert_private("ft_mint")?;
    let state = self.state_mut()?;
    state.ledger.register(account_id);
    state.ledger.mint(account_id, amount.0)?;
    emit(&Nep141Event::FtMint(vec![FtMint {
      owner_id: account_id.clone(),
      amount,
      memo: None,
    }]));
    Ok(())
  }

  /// NEP-141 transfer of index tokens.
  ///
  /// # Errors
  /// `OneYoctoRequired` and the ledger errors.
  pub fn ft_transfer(&mut self, ctx: &CallContext, args: &FtTransferArgs) -> ContractResult<()> {
    ctx.assert_one_yocto()?;
    let state = self.state_mut()?;
    state
      .ledger
      .transfer(&ctx.predecessor, &args.receiver_id, args.amount.0)?;
    emit(&Nep141Event::FtTransfer(vec![FtTransfer {
      old_owner_id: ctx.predecessor.clone(),
      new_owner_id: args.receiver_id.clone(),
      amount: args.amount,
      memo: args.memo.clone(),
    }]));
    Ok(())
  }

  /// NEP-145 registration on the index token.
  ///
  /// # Errors
  /// `InsufficientDeposit` when a new registration is underpaid.
  pub fn storage_deposit(
    &mut self,
    ctx: &CallContext,
    account_id: Option<AccountId>,
  ) -> ContractResult<StorageBalance> {
    let account_id = account_id.unwrap_or_else(|| ctx.predecessor.clone());
    let state = self.state_mut()?;
    state.ledger.storage_deposit(&account_id, ctx.attached_deposit)?;
    Ok(StorageBalance {
      total: U128(STORAGE_DEPOSIT),
      available: U128(0),
    })
  }

  // ─── Helpers ─────────────────────────────────────────────

  fn spend_after_margin(ctx: &CallContext, basket_len: usize) -> ContractResult<Balance> {
    let margin = Self::security_margin(basket_len);
    if ctx.attached_deposit <= margin {
      return Err(ContractError::InsufficientDeposit {
        attached: ctx.attached_deposit,
        required: margin + 1,
      });
    }
    Ok(ctx.attached_deposit - margin)
  }

  fn check_callback_budget(&self, stage: &'static str, needed: Gas) -> ContractResult<()> {
    let budget = self.settings.gas.callback;
    if needed > budget {
      return Err(ContractError::GasBudgetExceeded {
        stage,
        needed,
        budget,
      });
    }
    Ok(())
  }

  fn storage_deposit_call(&self, account_id: Option<&AccountId>) -> ContractResult<FunctionCall> {
    FunctionCall::json(
      "storage_deposit",
      &StorageDepositArgs {
        account_id: account_id.cloned(),
      },
      STORAGE_DEPOSIT,
      self.settings.gas.storage_deposit,
    )
  }

  /// `near_deposit` then `ft_transfer_call` into the exchange, batched on
  /// one wNEAR receipt.
  fn wrap_and_forward(&self, spend: Balance) -> ContractResult<OutboundCall> {
    let deposit = FunctionCall::json("near_deposit", &json!({}), spend, self.settings.gas.near_deposit)?;
    let forward = FunctionCall::json(
      "ft_transfer_call",
      &FtTransferCallArgs {
        receiver_id: self.settings.exchange.clone(),
        amount: U128(spend),
        memo: None,
        msg: String::new(),
      },
      ONE_YOCTO,
      self.settings.gas.ft_transfer_call,
    )?;
    Ok(
      OutboundCall::new(self.settings.wnear.clone())
        .function_call(deposit)
        .function_call(forward),
    )
  }

  /// One swap per basket entry, each after `after`, joined.
  fn swap_batch(
    &self,
    graph: &mut CallGraph,
    after: &Pending,
    basket: &Basket,
    amounts: &[U128],
  ) -> ContractResult<Pending> {
    let mut joined = Pending::empty();
    for (entry, amount_in) in basket.entries().iter().zip(amounts) {
      let args = ExchangeSwapArgs {
        actions: vec![SwapAction {
          pool_id: entry.pool_id,
          token_in: self.settings.wnear.clone(),
          amount_in: *amount_in,
          token_out: entry.token.clone(),
          min_amount_out: U128(0),
        }],
      };
      let call = FunctionCall::json("swap", &args, ONE_YOCTO, self.settings.gas.swap)?;
      joined = joined.and(graph.then(
        after,
        OutboundCall::new(self.settings.exchange.clone()).function_call(call),
      ));
    }
    Ok(joined)
  }

  fn withdraw_call(&self, token: &AccountId, amount: Balance) -> ContractResult<FunctionCall> {
    FunctionCall::json(
      "withdraw",
      &ExchangeWithdrawArgs {
        token_id: token.clone(),
        amount: U128(amount),
      },
      ONE_YOCTO,
      self.settings.gas.withdraw,
    )
  }
}

/// Decode the joined swap results through the checked slot list.
///
/// Fails closed: any failed or undecodable slot aborts. Zero outputs are
/// logged and passed through.
fn read_slots(
  basket: &Basket,
  slots: &[AccountId],
  results: &[PromiseResult],
) -> ContractResult<Vec<(AccountId, Balance)>> {
  basket.check_slots(slots)?;
  if results.len() != slots.len() {
    return Err(ContractError::SlotMismatch(format!(
      "{} results for {} slots",
      results.len(),
      slots.len()
    )));
  }

  slots
    .iter()
    .zip(results)
    .enumerate()
    .map(|(slot, (token, result))| match result {
      PromiseResult::Failed => Err(ContractError::SlotFailed {
        slot,
        token: token.to_string(),
      }),
      PromiseResult::Successful(bytes) => {
        let amount: U128 = serde_json::from_slice(bytes).map_err(|e| ContractError::SlotDecode {
          slot,
          token: token.to_string(),
          reason: e.to_string(),
        })?;
        if amount.0 == 0 {
          warn!(slot, token = %token, "Swap returned a zero output");
        }
        Ok((token.clone(), amount.0))
      }
    })
    .collect()
}

fn parse_args<T: DeserializeOwned>(method: &str, args: Value) -> ContractResult<T> {
  serde_json::from_value(args).map_err(|e| ContractError::InvalidArgs {
    method: method.to_string(),
    reason: e.to_string(),
  })
}

fn emit(event: &Nep141Event) {
  info!(log = %event.to_log(), "Contract event");
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::units::ONE_NEAR;

  fn acc(s: &str) -> AccountId {
    s.parse().unwrap()
  }

  fn settings() -> ContractSettings {
    ContractSettings {
      exchange: acc("ref.testnet"),
      wnear: acc("wrap.testnet"),
      gas: GasSchedule::default(),
    }
  }

  fn init_args(tokens: &[&str], pool_ids: &[u64]) -> InitArgs {
    InitArgs {
      owner_id: Some(acc("owner.testnet")),
      index_token_account: None,
      tokens: tokens.iter().map(|t| acc(t)).collect(),
      pool_ids: pool_ids.to_vec(),
      metadata: Some(FungibleTokenMetadata::index("bull", "BULL")),
      total_supply: None,
    }
  }

  fn tx(deposit: Balance) -> CallContext {
    CallContext::transaction(acc("alice.testnet"), acc("bull.manager.testnet"), deposit, Gas::MAX)
  }

  fn self_call(results: Vec<PromiseResult>) -> CallContext {
    CallContext {
      current_account: acc("bull.manager.testnet"),
      predecessor: acc("bull.manager.testnet"),
      signer: acc("alice.testnet"),
      attached_deposit: 2,
      prepaid_gas: TWENTY_TGAS * 8,
      promise_results: results,
    }
  }

  fn initialized() -> IndexContract {
    let mut contract = IndexContract::new(settings());
    contract
      .initialize(&tx(ONE_NEAR), init_args(&["a.testnet", "b.testnet"], &[1, 2]))
      .unwrap();
    contract
  }

  fn amounts(values: &[u128]) -> Vec<U128> {
    values.iter().copied().map(U128).collect()
  }

  #[test]
  fn test_initialize_graph_and_refund() {
    let mut contract = IndexContract::new(settings());
    let graph = contract
      .initialize(&tx(ONE_NEAR), init_args(&["a.testnet", "b.testnet"], &[1, 2]))
      .unwrap();

    // 2 tokens + wNEAR + exchange + register_tokens, then the refund
    assert_eq!(graph.len(), 6);
    let refund = graph.node(5).unwrap();
    assert_eq!(refund.receiver, acc("alice.testnet"));
    assert_eq!(refund.deps, vec![0, 1, 2, 3, 4]);
    assert_eq!(refund.deposit(), ONE_NEAR - IndexContract::initialize_reserve(2));
    assert!(contract.is_initialized());
  }

  #[test]
  fn test_initialize_rejects_before_mutation() {
    let mut contract = IndexContract::new(settings());
    assert_eq!(
      contract.initialize(&tx(ONE_NEAR), init_args(&["a.testnet", "b.testnet"], &[1])),
      Err(ContractError::PoolIdsTokensLenMismatch { tokens: 2, pool_ids: 1 })
    );
    assert_eq!(
      contract.initialize(&tx(ONE_NEAR), init_args(&[], &[])),
      Err(ContractError::NoTokensProvided)
    );
    let reserve = IndexContract::initialize_reserve(2);
    assert!(matches!(
      contract.initialize(&tx(reserve - 1), init_args(&["a.testnet", "b.testnet"], &[1, 2])),
      Err(ContractError::InsufficientDeposit { .. })
    ));
    assert!(!contract.is_initialized());
  }

  #[test]
  fn test_initialize_once() {
    let mut contract = initialized();
    assert_eq!(
      contract.initialize(&tx(ONE_NEAR), init_args(&["a.testnet"], &[1])),
      Err(ContractError::AlreadyInitialized)
    );
  }

  #[test]
  fn test_swap_scenario_graph() {
    let contract = initialized();
    let graph = contract.swap(&tx(20), &amounts(&[5, 7]), U128(3)).unwrap();

    let lines = graph.describe();
    assert_eq!(lines[0], "#0 wrap.testnet [near_deposit → ft_transfer_call]");
    assert_eq!(lines[1], "#1 ref.testnet [swap] after #0");
    assert_eq!(lines[2], "#2 ref.testnet [swap] after #0");
    assert_eq!(lines[3], "#3 bull.manager.testnet [withdraw_from_exchange] after #1,#2");

    // spend = attached - (2n + 1)
    assert_eq!(graph.node(0).unwrap().actions[0].deposit(), 15);
    let first: ExchangeSwapArgs = match &graph.node(1).unwrap().actions[0] {
      crate::domain::Action::FunctionCall(fc) => fc.args_json().unwrap(),
      other => panic!("unexpected action {other:?}"),
    };
    assert_eq!(first.actions[0].pool_id, 1);
    assert_eq!(first.actions[0].token_out, acc("a.testnet"));
    assert_eq!(first.actions[0].amount_in, U128(5));
    assert!(graph.total_gas() <= Gas::MAX);
  }

  #[test]
  fn test_swap_rejects_wrong_length_and_margin() {
    let contract = initialized();
    assert_eq!(
      contract.swap(&tx(20), &amounts(&[5]), U128(0)),
      Err(ContractError::TokenAmountsLengthIsIncorrect { expected: 2, got: 1 })
    );
    assert_eq!(
      contract.swap(&tx(5), &amounts(&[5, 7]), U128(0)),
      Err(ContractError::InsufficientDeposit { attached: 5, required: 6 })
    );
  }

  #[test]
  fn test_swap_gas_budget_for_large_basket() {
    let tokens = ["a.testnet", "b.testnet", "c.testnet", "d.testnet", "e.testnet"];
    let mut contract = IndexContract::new(settings());
    contract
      .initialize(&tx(ONE_NEAR), init_args(&tokens, &[1, 2, 3, 4, 5]))
      .unwrap();
    assert!(matches!(
      contract.swap(&tx(100), &amounts(&[1, 1, 1, 1, 1]), U128(0)),
      Err(ContractError::GasBudgetExceeded { .. })
    ));
  }

  #[test]
  fn test_withdraw_reads_checked_slots() {
    let contract = initialized();
    let ctx = self_call(vec![PromiseResult::json(&U128(40)), PromiseResult::json(&U128(70))]);
    let graph = contract
      .withdraw_from_exchange(&ctx, U128(3), &[acc("a.testnet"), acc("b.testnet")])
      .unwrap();
    assert_eq!(graph.len(), 1);
    let node = graph.node(0).unwrap();
    assert_eq!(node.receiver, acc("ref.testnet"));
    assert_eq!(node.actions.len(), 3);
  }

  #[test]
  fn test_withdraw_fails_closed() {
    let contract = initialized();
    let slots = [acc("a.testnet"), acc("b.testnet")];

    let failed = self_call(vec![PromiseResult::json(&U128(40)), PromiseResult::Failed]);
    assert_eq!(
      contract.withdraw_from_exchange(&failed, U128(0), &slots),
      Err(ContractError::SlotFailed { slot: 1, token: "b.testnet".into() })
    );

    let garbage = self_call(vec![
      PromiseResult::Successful(b"not json".to_vec()),
      PromiseResult::json(&U128(1)),
    ]);
    assert!(matches!(
      contract.withdraw_from_exchange(&garbage, U128(0), &slots),
      Err(ContractError::SlotDecode { slot: 0, .. })
    ));

    let swapped = self_call(vec![PromiseResult::json(&U128(1)), PromiseResult::json(&U128(1))]);
    assert!(matches!(
      contract.withdraw_from_exchange(&swapped, U128(0), &[acc("b.testnet"), acc("a.testnet")]),
      Err(ContractError::SlotMismatch(_))
    ));

    let short = self_call(vec![PromiseResult::json(&U128(1))]);
    assert!(matches!(
      contract.withdraw_from_exchange(&short, U128(0), &slots),
      Err(ContractError::SlotMismatch(_))
    ));
  }

  #[test]
  fn test_withdraw_passes_zero_output_through() {
    let contract = initialized();
    let ctx = self_call(vec![PromiseResult::json(&U128(0)), PromiseResult::json(&U128(9))]);
    let graph = contract
      .withdraw_from_exchange(&ctx, U128(0), &[acc("a.testnet"), acc("b.testnet")])
      .unwrap();
    assert_eq!(graph.node(0).unwrap().actions.len(), 2);
  }

  #[test]
  fn test_withdraw_is_private() {
    let contract = initialized();
    let mut ctx = tx(2);
    ctx.promise_results = vec![PromiseResult::json(&U128(1)), PromiseResult::json(&U128(1))];
    assert_eq!(
      contract.withdraw_from_exchange(&ctx, U128(0), &[acc("a.testnet"), acc("b.testnet")]),
      Err(ContractError::PrivateMethod("withdraw_from_exchange"))
    );
  }

  #[test]
  fn test_buy_chain_waits_for_registration_and_wrap() {
    let contract = initialized();
    let graph = contract.buy_index_token(&tx(100), &amounts(&[10, 10]), U128(2)).unwrap();
    let lines = graph.describe();
    assert_eq!(lines[0], "#0 bull.manager.testnet [storage_deposit]");
    assert_eq!(lines[1], "#1 wrap.testnet [near_deposit → ft_transfer_call]");
    assert_eq!(lines[2], "#2 ref.testnet [swap] after #0,#1");
    assert_eq!(lines[4], "#4 bull.manager.testnet [buy_index_token_callback] after #2,#3");

    assert_eq!(
      contract.buy_index_token(&tx(100), &amounts(&[10]), U128(2)),
      Err(ContractError::NearAmountsLenMismatch { expected: 2, got: 1 })
    );
  }

  #[test]
  fn test_buy_callback_requires_enough_output() {
    let contract = initialized();
    let slots = [acc("a.testnet"), acc("b.testnet")];
    let ctx = self_call(vec![PromiseResult::json(&U128(5)), PromiseResult::json(&U128(1))]);
    assert_eq!(
      contract.buy_index_token_callback(&ctx, U128(2), &slots),
      Err(ContractError::SwapOutputTooLow { token: "b.testnet".into(), got: 1, need: 2 })
    );

    let ctx = self_call(vec![PromiseResult::json(&U128(5)), PromiseResult::json(&U128(3))]);
    let graph = contract.buy_index_token_callback(&ctx, U128(2), &slots).unwrap();
    assert_eq!(graph.describe()[1], "#1 bull.manager.testnet [ft_mint] after #0");
  }

  #[test]
  fn test_mint_and_redeem() {
    let mut contract = initialized();
    let alice = acc("alice.testnet");
    contract.ft_mint(&self_call(vec![]), &alice, U128(4)).unwrap();
    assert_eq!(
      contract.view("ft_balance_of", json!({"account_id": "alice.testnet"})).unwrap(),
      json!("4")
    );

    let redeem = tx(1);
    let graph = contract.redeem_index_token(&redeem, U128(3)).unwrap();
    // two registrations, then two transfers
    assert_eq!(graph.len(), 4);
    assert_eq!(graph.node(2).unwrap().deps, vec![0, 1]);
    assert_eq!(
      contract.view("ft_balance_of", json!({"account_id": "alice.testnet"})).unwrap(),
      json!("1")
    );

    assert!(matches!(
      contract.redeem_index_token(&redeem, U128(2)),
      Err(ContractError::InsufficientBalance { balance: 1, amount: 2 })
    ));
  }

  #[test]
  fn test_mint_is_private() {
    let mut contract = initialized();
    assert_eq!(
      contract.ft_mint(&tx(0), &acc("alice.testnet"), U128(1)),
      Err(ContractError::PrivateMethod("ft_mint"))
    );
  }

  #[test]
  fn test_views() {
    let contract = initialized();
    assert_eq!(
      contract.view("get_underlying_tokens", Value::Null).unwrap(),
      json!(["a.testnet", "b.testnet"])
    );
    assert_eq!(contract.view("get_underlying_poolids", Value::Null).unwrap(), json!([1, 2]));
    assert_eq!(contract.view("ft_metadata", Value::Null).unwrap()["symbol"], "BULL");
    assert!(matches!(
      contract.view("nope", Value::Null),
      Err(ContractError::MethodNotFound(_))
    ));
  }

  #[test]
  fn test_call_routes_by_method() {
    let mut contract = initialized();
    let call = FunctionCall::json(
      "swap",
      &SwapArgs {
        token_amounts: amounts(&[5, 7]),
        near_amount: U128(3),
      },
      20,
      Gas::MAX,
    )
    .unwrap();
    let outcome = contract.call(&tx(20), &call).unwrap();
    assert_eq!(outcome.graph().map(CallGraph::len), Some(4));
  }
}
