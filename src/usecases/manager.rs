//! Index Manager - Index Deployment Registry
//!
//! Deploys new index contracts as sub-accounts of the manager and keeps
//! the list the data layer enumerates. A deployment is a single receipt
//! on the new account: create it, fund it, deploy the index code and
//! call `new` with whatever deposit is left.

use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::domain::call_graph::ContractCode;
use crate::domain::units::{SEVENTY_FIVE_TGAS, TWENTY_ONE_NEAR};
use crate::domain::{
  AccountId, CallContext, CallGraph, CallOutcome, ContractError, ContractResult, DeployIndexArgs,
  FunctionCall, OutboundCall, U128,
};

/// Registry contract for index tokens.
#[derive(Debug, Clone)]
pub struct IndexManager {
  /// Code deployed on every new index account.
  code: ContractCode,
  /// Deployed index accounts, in deployment order.
  index_tokens: Vec<AccountId>,
}

impl IndexManager {
  pub const fn new(code: ContractCode) -> Self {
    Self {
      code,
      index_tokens: Vec::new(),
    }
  }

  pub fn index_tokens(&self) -> &[AccountId] {
    &self.index_tokens
  }

  /// Route a function call by method name.
  ///
  /// # Errors
  /// Returns the contract error of the method, or `MethodNotFound`.
  pub fn call(&mut self, ctx: &CallContext, call: &FunctionCall) -> ContractResult<CallOutcome> {
    match call.method_name.as_str() {
      "deploy_new_index" => {
        let args: DeployIndexArgs = call.args_json()?;
        let (account, graph) = self.deploy_new_index(ctx, args)?;
        Ok(CallOutcome::Detached {
          value: serde_json::to_vec(&account).unwrap_or_default(),
          graph,
        })
      }
      "clean_state" => {
        self.clean_state(ctx)?;
        Ok(CallOutcome::empty())
      }
      view => self.view(view, &Value::Null).map(|v| CallOutcome::json(&v)),
    }
  }

  /// # Errors
  /// `MethodNotFound` for anything but `get_index_tokens`.
  pub fn view(&self, method: &str, _args: &Value) -> ContractResult<Value> {
    match method {
      "get_index_tokens" => Ok(json!(self.index_tokens)),
      other => Err(ContractError::MethodNotFound(other.to_string())),
    }
  }

  /// Create `<metadata.name>.<manager>` and initialize an index on it.
  ///
  /// The new account receives 21 NEAR for its own storage; the rest of the
  /// attached deposit goes to `new`, which refunds what it does not need.
  ///
  /// # Errors
  /// `InvalidMetadata`, `InvalidAccountId` for a name that is not a valid
  /// account prefix, `IndexAlreadyExists`, `InsufficientDeposit`.
  #[instrument(skip_all, fields(manager = %ctx.current_account, name = %args.metadata.name))]
  pub fn deploy_new_index(
    &mut self,
    ctx: &CallContext,
    args: DeployIndexArgs,
  ) -> ContractResult<(AccountId, CallGraph)> {
    args.metadata.assert_valid()?;
    let account = ctx.current_account.sub_account(&args.metadata.name)?;
    if self.index_tokens.contains(&account) {
      return Err(ContractError::IndexAlreadyExists(account.to_string()));
    }
    if ctx.attached_deposit <= TWENTY_ONE_NEAR {
      return Err(ContractError::InsufficientDeposit {
        attached: ctx.attached_deposit,
        required: TWENTY_ONE_NEAR + 1,
      });
    }

    let init = FunctionCall::json(
      "new",
      &json!({
        "total_supply": U128(1),
        "metadata": args.metadata,
        "tokens": args.tokens,
        "pool_ids": args.pool_ids,
      }),
      ctx.attached_deposit - TWENTY_ONE_NEAR,
      SEVENTY_FIVE_TGAS,
    )?;

    let mut graph = CallGraph::new();
    graph.spawn(
      OutboundCall::new(account.clone())
        .create_account()
        .transfer(TWENTY_ONE_NEAR)
        .deploy_contract(self.code.clone())
        .function_call(init),
    );

    self.index_tokens.push(account.clone());
    info!(account = %account, total = self.index_tokens.len(), "Index deployment scheduled");
    Ok((account, graph))
  }

  /// Forget every registered index. Self-call only.
  ///
  /// # Errors
  /// `PrivateMethod`.
  pub fn clean_state(&mut self, ctx: &CallContext) -> ContractResult<()> {
    ctx.assert_private("clean_state")?;
    self.index_tokens.clear();
    Ok(())
  }
}
