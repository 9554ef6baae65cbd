//! Execution context of a single contract call.
//!
//! What the platform tells a contract about the call it is executing:
//! who is running it, who asked, what was attached and, for
//! continuations, the results of the receipts it waited on.

use serde::Serialize;

use super::account::AccountId;
use super::call_graph::{CallGraph, PromiseResult};
use super::error::{ContractError, ContractResult};
use super::units::{Balance, Gas, ONE_YOCTO};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// Account whose code is running.
    pub current_account: AccountId,
    /// Immediate caller. Equals `current_account` for self-calls.
    pub predecessor: AccountId,
    /// Account that signed the originating transaction.
    pub signer: AccountId,
    pub attached_deposit: Balance,
    pub prepaid_gas: Gas,
    /// Results of the receipts this call depends on, in declaration order.
    pub promise_results: Vec<PromiseResult>,
}

impl CallContext {
    /// Context of a call signed and sent directly by `signer`.
    pub fn transaction(
        signer: AccountId,
        receiver: AccountId,
        attached_deposit: Balance,
        prepaid_gas: Gas,
    ) -> Self {
        Self {
            current_account: receiver,
            predecessor: signer.clone(),
            signer,
            attached_deposit,
            prepaid_gas,
            promise_results: Vec::new(),
        }
    }

    pub fn is_self_call(&self) -> bool {
        self.predecessor == self.current_account
    }

    /// Reject callers other than the contract itself.
    pub fn assert_private(&self, method: &'static str) -> ContractResult<()> {
        if self.is_self_call() {
            Ok(())
        } else {
            Err(ContractError::PrivateMethod(method))
        }
    }

    pub fn assert_one_yocto(&self) -> ContractResult<()> {
        if self.attached_deposit == ONE_YOCTO {
            Ok(())
        } else {
            Err(ContractError::OneYoctoRequired)
        }
    }

    /// Gas the emitted graph may attach: what was prepaid, capped at the
    /// platform ceiling.
    pub fn gas_budget(&self) -> Gas {
        self.prepaid_gas.min(Gas::MAX)
    }
}

/// What a contract call hands back to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// Plain return value (JSON bytes, possibly empty).
    Value(Vec<u8>),
    /// Returned promise: the call's result is the result of the graph's tail.
    Promise(CallGraph),
    /// A value is returned while the graph keeps running on its own.
    Detached { value: Vec<u8>, graph: CallGraph },
}

impl CallOutcome {
    pub const fn empty() -> Self {
        Self::Value(Vec::new())
    }

    pub fn json<T: Serialize>(value: &T) -> Self {
        Self::Value(serde_json::to_vec(value).unwrap_or_default())
    }

    pub fn graph(&self) -> Option<&CallGraph> {
        match self {
            Self::Value(_) => None,
            Self::Promise(graph) | Self::Detached { graph, .. } => Some(graph),
        }
    }
}
