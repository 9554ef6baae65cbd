//! NEP-141 token contract for the sandbox.
//!
//! Plain fungible tokens and the wNEAR wrapper share one implementation;
//! the wrapper additionally accepts `near_deposit`. `ft_transfer_call`
//! returns the standard `ft_on_transfer` → `ft_resolve_transfer` chain.

use serde::Deserialize;
use serde_json::{json, Value};

use super::Reply;
use crate::domain::units::{FIVE_TGAS, STORAGE_DEPOSIT, TWENTY_TGAS};
use crate::domain::wire::{
    AccountArgs, FtOnTransferArgs, FtTransferArgs, FtTransferCallArgs, StorageBalance,
    StorageDepositArgs,
};
use crate::domain::{
    AccountId, Balance, CallContext, CallGraph, CallOutcome, FunctionCall, FungibleLedger,
    FungibleTokenMetadata, OutboundCall, PromiseResult, U128,
};

#[derive(Debug, Deserialize)]
struct ResolveArgs {
    sender_id: AccountId,
    receiver_id: AccountId,
    amount: U128,
}

/// A fungible token, optionally wrapping NEAR.
#[derive(Debug, Clone)]
pub struct FtToken {
    metadata: FungibleTokenMetadata,
    ledger: FungibleLedger,
    wraps_near: bool,
}

impl FtToken {
    pub fn new(metadata: FungibleTokenMetadata) -> Self {
        Self {
            metadata,
            ledger: FungibleLedger::new(),
            wraps_near: false,
        }
    }

    /// wNEAR: 1 yoctoNEAR attached to `near_deposit` mints 1 wNEAR unit.
    pub fn wrapped_near() -> Self {
        Self {
            metadata: FungibleTokenMetadata::index("Wrapped NEAR fungible token", "wNEAR"),
            ledger: FungibleLedger::new(),
            wraps_near: true,
        }
    }

    pub fn ledger(&self) -> &FungibleLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut FungibleLedger {
        &mut self.ledger
    }

    pub fn call(&mut self, ctx: &CallContext, call: &FunctionCall) -> anyhow::Result<Reply> {
        match call.method_name.as_str() {
            "storage_deposit" => {
                let args: StorageDepositArgs = call.args_json()?;
                let account = args.account_id.unwrap_or_else(|| ctx.predecessor.clone());
                let fresh = self.ledger.storage_deposit(&account, ctx.attached_deposit)?;
                // Already registered: the whole deposit goes back.
                let refund = if fresh {
                    ctx.attached_deposit - STORAGE_DEPOSIT
                } else {
                    ctx.attached_deposit
                };
                Ok(Reply::refund(
                    CallOutcome::json(&StorageBalance {
                        total: U128(STORAGE_DEPOSIT),
                        available: U128(0),
                    }),
                    refund,
                ))
            }
            "near_deposit" if self.wraps_near => {
                anyhow::ensure!(ctx.attached_deposit > 0, "Requires positive attached deposit");
                self.ledger.mint(&ctx.predecessor, ctx.attached_deposit)?;
                Ok(Reply::value(CallOutcome::empty()))
            }
            "ft_transfer" => {
                ctx.assert_one_yocto()?;
                let args: FtTransferArgs = call.args_json()?;
                self.ledger
                    .transfer(&ctx.predecessor, &args.receiver_id, args.amount.0)?;
                Ok(Reply::value(CallOutcome::empty()))
            }
            "ft_transfer_call" => {
                ctx.assert_one_yocto()?;
                let args: FtTransferCallArgs = call.args_json()?;
                self.ledger
                    .transfer(&ctx.predecessor, &args.receiver_id, args.amount.0)?;
                let graph = transfer_call_chain(ctx, &args)?;
                Ok(Reply::value(CallOutcome::Promise(graph)))
            }
            "ft_resolve_transfer" => {
                ctx.assert_private("ft_resolve_transfer")?;
                let args: ResolveArgs = call.args_json()?;
                let used = self.resolve(&args, ctx.promise_results.first());
                Ok(Reply::value(CallOutcome::json(&U128(used))))
            }
            view => {
                let args: Value = call.args_json()?;
                self.view(view, args).map(|v| Reply::value(CallOutcome::json(&v)))
            }
        }
    }

    /// Refund the unused part of a transfer call; returns the used amount.
    fn resolve(&mut self, args: &ResolveArgs, result: Option<&PromiseResult>) -> Balance {
        let amount = args.amount.0;
        let unused = match result {
            Some(PromiseResult::Successful(bytes)) => serde_json::from_slice::<U128>(bytes)
                .map_or(amount, |u| u.0.min(amount)),
            _ => amount,
        };
        let refund = unused.min(self.ledger.balance_of(&args.receiver_id));
        if refund > 0
            && self
                .ledger
                .transfer(&args.receiver_id, &args.sender_id, refund)
                .is_ok()
        {
            return amount - refund;
        }
        amount
    }

    pub fn view(&self, method: &str, args: Value) -> anyhow::Result<Value> {
        let value = match method {
            "ft_balance_of" => {
                let args: AccountArgs = serde_json::from_value(args)?;
                json!(U128(self.ledger.balance_of(&args.account_id)))
            }
            "ft_total_supply" => json!(U128(self.ledger.total_supply())),
            "ft_metadata" => json!(self.metadata),
            "storage_balance_of" => {
                let args: AccountArgs = serde_json::from_value(args)?;
                if self.ledger.is_registered(&args.account_id) {
                    json!(StorageBalance {
                        total: U128(STORAGE_DEPOSIT),
                        available: U128(0),
                    })
                } else {
                    Value::Null
                }
            }
            other => anyhow::bail!("Method {other} not found"),
        };
        Ok(value)
    }
}

fn transfer_call_chain(ctx: &CallContext, args: &FtTransferCallArgs) -> anyhow::Result<CallGraph> {
    let on_transfer = FunctionCall::json(
        "ft_on_transfer",
        &FtOnTransferArgs {
            sender_id: ctx.predecessor.clone(),
            amount: args.amount,
            msg: args.msg.clone(),
        },
        0,
        TWENTY_TGAS,
    )?;
    let resolve = FunctionCall::json(
        "ft_resolve_transfer",
        &json!({
            "sender_id": ctx.predecessor,
            "receiver_id": args.receiver_id,
            "amount": args.amount,
        }),
        0,
        FIVE_TGAS,
    )?;

    let mut graph = CallGraph::new();
    let delivered = graph.spawn(OutboundCall::new(args.receiver_id.clone()).function_call(on_transfer));
    graph.then(
        &delivered,
        OutboundCall::new(ctx.current_account.clone()).function_call(resolve),
    );
    Ok(graph)
}
