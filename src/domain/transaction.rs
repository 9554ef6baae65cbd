//! Wallet-signable transaction envelopes.
//!
//! Shaped like the wallet-selector `signAndSendTransactions` payload
//! (`signerId`, `receiverId`, `actions[].params.methodName`, ...), so an
//! envelope can be handed to any browser wallet unchanged. Gas and deposit
//! travel as decimal strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::AccountId;
use super::call_graph::{Action, FunctionCall};
use super::error::{ContractError, ContractResult};
use super::units::{Balance, Gas, U128};

/// Parameters of a function call action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallParams {
    pub method_name: String,
    pub args: serde_json::Value,
    pub gas: U128,
    pub deposit: U128,
}

/// Wallet action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum WalletAction {
    FunctionCall(FunctionCallParams),
}

impl WalletAction {
    pub fn function_call(
        method_name: &str,
        args: serde_json::Value,
        gas: Gas,
        deposit: Balance,
    ) -> Self {
        Self::FunctionCall(FunctionCallParams {
            method_name: method_name.to_string(),
            args,
            gas: U128(u128::from(gas.0)),
            deposit: U128(deposit),
        })
    }

    pub fn deposit(&self) -> Balance {
        match self {
            Self::FunctionCall(p) => p.deposit.0,
        }
    }

    pub fn method_name(&self) -> &str {
        match self {
            Self::FunctionCall(p) => &p.method_name,
        }
    }

    /// The chain action this wallet action signs.
    pub fn to_action(&self) -> ContractResult<Action> {
        match self {
            Self::FunctionCall(p) => {
                let gas = u64::try_from(p.gas.0).map_err(|_| ContractError::InvalidArgs {
                    method: p.method_name.clone(),
                    reason: format!("gas {} does not fit u64", p.gas.0),
                })?;
                Ok(Action::FunctionCall(FunctionCall::json(
                    &p.method_name,
                    &p.args,
                    p.deposit.0,
                    Gas(gas),
                )?))
            }
        }
    }
}

/// One transaction for the wallet to sign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub signer_id: AccountId,
    pub receiver_id: AccountId,
    pub actions: Vec<WalletAction>,
}

impl Transaction {
    pub fn total_deposit(&self) -> Balance {
        self.actions.iter().map(WalletAction::deposit).sum()
    }

    pub fn to_actions(&self) -> ContractResult<Vec<Action>> {
        self.actions.iter().map(WalletAction::to_action).collect()
    }
}

/// A batch of transactions handed to the wallet in one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub transactions: Vec<Transaction>,
}

impl TransactionEnvelope {
    pub fn new(transactions: Vec<Transaction>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            transactions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::units::THREE_HUNDRED_TGAS;

    #[test]
    fn test_wallet_selector_shape() {
        let tx = Transaction {
            signer_id: "alice.testnet".parse().unwrap(),
            receiver_id: "bull.manager.testnet".parse().unwrap(),
            actions: vec![WalletAction::function_call(
                "redeem_index_token",
                serde_json::json!({"token_amount": "3"}),
                THREE_HUNDRED_TGAS,
                1,
            )],
        };
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["signerId"], "alice.testnet");
        assert_eq!(json["actions"][0]["type"], "FunctionCall");
        assert_eq!(json["actions"][0]["params"]["methodName"], "redeem_index_token");
        assert_eq!(json["actions"][0]["params"]["gas"], "300000000000000");
        assert_eq!(json["actions"][0]["params"]["deposit"], "1");

        let actions = tx.to_actions().unwrap();
        match &actions[0] {
            Action::FunctionCall(call) => {
                assert_eq!(call.method_name, "redeem_index_token");
                assert_eq!(call.gas, THREE_HUNDRED_TGAS);
                assert_eq!(call.deposit, 1);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }
}
