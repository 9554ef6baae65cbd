//! Create-index form state.
//!
//! The client keeps the new-index arguments as a small store the form
//! widgets mutate. Token and pool slots are added and removed together so
//! the two lists can never drift apart; an unset pool is `None` until the
//! user picks one.

use serde::{Deserialize, Serialize};

use super::account::AccountId;
use super::basket::PoolId;
use super::error::{ContractError, ContractResult};
use super::metadata::FungibleTokenMetadata;

/// Arguments of the manager's `deploy_new_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployIndexArgs {
    pub metadata: FungibleTokenMetadata,
    pub tokens: Vec<AccountId>,
    pub pool_ids: Vec<PoolId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    token: String,
    pool_id: Option<PoolId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIndexForm {
    name: String,
    symbol: String,
    icon: String,
    slots: Vec<Slot>,
}

impl Default for CreateIndexForm {
    fn default() -> Self {
        Self::new()
    }
}

impl CreateIndexForm {
    pub const fn new() -> Self {
        Self {
            name: String::new(),
            symbol: String::new(),
            icon: String::new(),
            slots: Vec::new(),
        }
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn set_symbol(&mut self, symbol: &str) {
        self.symbol = symbol.to_string();
    }

    pub fn set_icon(&mut self, icon: &str) {
        self.icon = icon.to_string();
    }

    /// Append an empty token/pool slot.
    pub fn add_token(&mut self) {
        self.slots.push(Slot {
            token: String::new(),
            pool_id: None,
        });
    }

    /// Remove the first slot holding `token`, together with its pool id.
    /// Returns `false` when no slot matches.
    pub fn remove_token(&mut self, token: &str) -> bool {
        match self.slots.iter().position(|s| s.token == token) {
            Some(idx) => {
                self.slots.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Set the token of slot `idx`. Out-of-range indices are ignored.
    pub fn update_token(&mut self, token: &str, idx: usize) {
        if let Some(slot) = self.slots.get_mut(idx) {
            slot.token = token.to_string();
        }
    }

    /// Set the pool of slot `idx`. Out-of-range indices are ignored.
    pub fn update_pool_id(&mut self, pool_id: PoolId, idx: usize) {
        if let Some(slot) = self.slots.get_mut(idx) {
            slot.pool_id = Some(pool_id);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn tokens(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.token.as_str()).collect()
    }

    pub fn pool_ids(&self) -> Vec<Option<PoolId>> {
        self.slots.iter().map(|s| s.pool_id).collect()
    }

    /// Validate the form and produce `deploy_new_index` arguments.
    pub fn into_args(&self) -> ContractResult<DeployIndexArgs> {
        if self.slots.is_empty() {
            return Err(ContractError::NoTokensProvided);
        }
        let mut tokens = Vec::with_capacity(self.slots.len());
        let mut pool_ids = Vec::with_capacity(self.slots.len());
        for (i, slot) in self.slots.iter().enumerate() {
            let token: AccountId = slot.token.parse()?;
            let pool_id = slot.pool_id.ok_or_else(|| ContractError::InvalidArgs {
                method: "deploy_new_index".into(),
                reason: format!("slot {i} ({token}) has no pool selected"),
            })?;
            tokens.push(token);
            pool_ids.push(pool_id);
        }

        let mut metadata = FungibleTokenMetadata::index(self.name.trim(), self.symbol.trim());
        if !self.icon.is_empty() {
            metadata.icon = Some(self.icon.clone());
        }
        metadata.assert_valid()?;

        Ok(DeployIndexArgs {
            metadata,
            tokens,
            pool_ids,
        })
    }
}
