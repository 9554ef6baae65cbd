//! Index basket configuration.
//!
//! A basket is the immutable, ordered list of `(token, pool)` pairs an
//! index is built from. Holding pairs instead of two parallel vectors makes
//! the token/pool alignment structural: there is no way to build a `Basket`
//! whose projections disagree in length or order.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::account::AccountId;
use super::error::{ContractError, ContractResult};

/// Exchange pool identifier.
pub type PoolId = u64;

/// One underlying token and the wNEAR pool it is bought through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketEntry {
    pub token: AccountId,
    pub pool_id: PoolId,
}

/// Index configuration fixed at initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Basket {
    owner: AccountId,
    index_token_account: AccountId,
    entries: Vec<BasketEntry>,
}

impl Basket {
    /// Zip `tokens` and `pool_ids` into a basket.
    ///
    /// # Errors
    /// `NoTokensProvided` on an empty list, `PoolIdsTokensLenMismatch` when
    /// the two lists differ in length, `DuplicateToken` when a token repeats.
    pub fn new(
        owner: AccountId,
        index_token_account: AccountId,
        tokens: Vec<AccountId>,
        pool_ids: Vec<PoolId>,
    ) -> ContractResult<Self> {
        if tokens.is_empty() {
            return Err(ContractError::NoTokensProvided);
        }
        if tokens.len() != pool_ids.len() {
            return Err(ContractError::PoolIdsTokensLenMismatch {
                tokens: tokens.len(),
                pool_ids: pool_ids.len(),
            });
        }
        let mut seen = HashSet::with_capacity(tokens.len());
        for token in &tokens {
            if !seen.insert(token) {
                return Err(ContractError::DuplicateToken(token.to_string()));
            }
        }

        let entries = tokens
            .into_iter()
            .zip(pool_ids)
            .map(|(token, pool_id)| BasketEntry { token, pool_id })
            .collect();

        Ok(Self {
            owner,
            index_token_account,
            entries,
        })
    }

    pub fn owner(&self) -> &AccountId {
        &self.owner
    }

    pub fn index_token_account(&self) -> &AccountId {
        &self.index_token_account
    }

    pub fn entries(&self) -> &[BasketEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tokens(&self) -> Vec<AccountId> {
        self.entries.iter().map(|e| e.token.clone()).collect()
    }

    pub fn pool_ids(&self) -> Vec<PoolId> {
        self.entries.iter().map(|e| e.pool_id).collect()
    }

    /// Reject per-token argument lists that do not cover the basket exactly.
    pub fn check_amounts_len(&self, got: usize) -> ContractResult<()> {
        if got == self.len() {
            Ok(())
        } else {
            Err(ContractError::TokenAmountsLengthIsIncorrect {
                expected: self.len(),
                got,
            })
        }
    }

    /// Verify that a continuation's slot list names exactly this basket's
    /// tokens, in basket order.
    pub fn check_slots(&self, slots: &[AccountId]) -> ContractResult<()> {
        if slots.len() != self.len() {
            return Err(ContractError::SlotMismatch(format!(
                "{} slots for a basket of {}",
                slots.len(),
                self.len()
            )));
        }
        for (i, (slot, entry)) in slots.iter().zip(&self.entries).enumerate() {
            if slot != &entry.token {
                return Err(ContractError::SlotMismatch(format!(
                    "slot {i} is {slot}, basket position {i} is {}",
                    entry.token
                )));
            }
        }
        Ok(())
    }
}
