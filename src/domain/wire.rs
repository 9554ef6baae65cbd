//! Argument and return shapes of the collaborator contracts.
//!
//! NEP-141 (fungible token core), NEP-145 (storage management) and the
//! Ref-style exchange methods the index contract and the data layer call.
//! Field names follow the on-chain JSON exactly.

use serde::{Deserialize, Serialize};

use super::account::AccountId;
use super::basket::PoolId;
use super::units::U128;

/// Pool kind string of a two-token constant-product pool.
pub const SIMPLE_POOL: &str = "SIMPLE_POOL";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDepositArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageBalance {
    pub total: U128,
    pub available: U128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountArgs {
    pub account_id: AccountId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtTransferArgs {
    pub receiver_id: AccountId,
    pub amount: U128,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtTransferCallArgs {
    pub receiver_id: AccountId,
    pub amount: U128,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(default)]
    pub msg: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtOnTransferArgs {
    pub sender_id: AccountId,
    pub amount: U128,
    #[serde(default)]
    pub msg: String,
}

/// One hop of an exchange `swap`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapAction {
    pub pool_id: PoolId,
    pub token_in: AccountId,
    pub amount_in: U128,
    pub token_out: AccountId,
    pub min_amount_out: U128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeSwapArgs {
    pub actions: Vec<SwapAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeWithdrawArgs {
    pub token_id: AccountId,
    pub amount: U128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterTokensArgs {
    pub token_ids: Vec<AccountId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetReturnArgs {
    pub pool_id: PoolId,
    pub token_in: AccountId,
    pub amount_in: U128,
    pub token_out: AccountId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetPoolsArgs {
    pub from_index: u64,
    pub limit: u64,
}

/// Pool as listed by `get_pools`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfo {
    pub pool_kind: String,
    pub token_account_ids: Vec<AccountId>,
    pub amounts: Vec<U128>,
    /// Fee in basis points.
    pub total_fee: u32,
    pub shares_total_supply: U128,
}

impl PoolInfo {
    pub fn is_simple(&self) -> bool {
        self.pool_kind == SIMPLE_POOL
    }

    pub fn contains(&self, token: &AccountId) -> bool {
        self.token_account_ids.contains(token)
    }

    /// Reserve held for `token`, if the pool trades it.
    pub fn reserve_of(&self, token: &AccountId) -> Option<U128> {
        self.token_account_ids
            .iter()
            .position(|t| t == token)
            .and_then(|i| self.amounts.get(i).copied())
    }
}
