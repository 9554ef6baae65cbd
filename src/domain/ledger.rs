//! NEP-141 balance ledger.
//!
//! The bookkeeping half of a fungible token: registration, balances and
//! total supply. The index token uses it for its own supply; the sandbox
//! uses one per simulated token.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::account::AccountId;
use super::error::{ContractError, ContractResult};
use super::units::{Balance, STORAGE_DEPOSIT};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FungibleLedger {
    accounts: HashMap<AccountId, Balance>,
    total_supply: Balance,
}

impl FungibleLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `account_id` with a zero balance. Returns `false` if it
    /// was already registered.
    pub fn register(&mut self, account_id: &AccountId) -> bool {
        if self.accounts.contains_key(account_id) {
            return false;
        }
        self.accounts.insert(account_id.clone(), 0);
        true
    }

    /// NEP-145 registration paid by `attached`. Returns `false` when the
    /// account was already registered; anything above the storage cost
    /// stays with the contract.
    pub fn storage_deposit(
        &mut self,
        account_id: &AccountId,
        attached: Balance,
    ) -> ContractResult<bool> {
        if self.is_registered(account_id) {
            return Ok(false);
        }
        if attached < STORAGE_DEPOSIT {
            return Err(ContractError::InsufficientDeposit {
                attached,
                required: STORAGE_DEPOSIT,
            });
        }
        Ok(self.register(account_id))
    }

    pub fn is_registered(&self, account_id: &AccountId) -> bool {
        self.accounts.contains_key(account_id)
    }

    /// Balance of `account_id`; unregistered accounts read as zero.
    pub fn balance_of(&self, account_id: &AccountId) -> Balance {
        self.accounts.get(account_id).copied().unwrap_or(0)
    }

    pub const fn total_supply(&self) -> Balance {
        self.total_supply
    }

    pub fn registered_accounts(&self) -> usize {
        self.accounts.len()
    }

    /// Credit a registered account and grow the supply.
    pub fn mint(&mut self, account_id: &AccountId, amount: Balance) -> ContractResult<()> {
        if amount == 0 {
            return Err(ContractError::ZeroAmount);
        }
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(ContractError::SupplyOverflow)?;
        self.deposit(account_id, amount)?;
        self.total_supply = supply;
        Ok(())
    }

    /// Move `amount` between two registered accounts.
    pub fn transfer(
        &mut self,
        sender_id: &AccountId,
        receiver_id: &AccountId,
        amount: Balance,
    ) -> ContractResult<()> {
        if sender_id == receiver_id {
            return Err(ContractError::SelfTransfer);
        }
        if amount == 0 {
            return Err(ContractError::ZeroAmount);
        }
        if !self.is_registered(receiver_id) {
            return Err(ContractError::AccountNotRegistered(receiver_id.to_string()));
        }
        self.withdraw(sender_id, amount)?;
        self.deposit(receiver_id, amount)
    }

    fn deposit(&mut self, account_id: &AccountId, amount: Balance) -> ContractResult<()> {
        let balance = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| ContractError::AccountNotRegistered(account_id.to_string()))?;
        *balance = balance.checked_add(amount).ok_or(ContractError::BalanceOverflow)?;
        Ok(())
    }

    fn withdraw(&mut self, account_id: &AccountId, amount: Balance) -> ContractResult<()> {
        let balance = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| ContractError::AccountNotRegistered(account_id.to_string()))?;
        if *balance < amount {
            return Err(ContractError::InsufficientBalance {
                balance: *balance,
                amount,
            });
        }
        *balance -= amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acc(s: &str) -> AccountId {
        s.parse().unwrap()
    }

    #[test]
    fn test_mint_and_transfer() {
        let mut ledger = FungibleLedger::new();
        let alice = acc("alice.testnet");
        let bob = acc("bob.testnet");
        assert!(ledger.register(&alice));
        assert!(!ledger.register(&alice));
        ledger.register(&bob);

        ledger.mint(&alice, 100).unwrap();
        ledger.transfer(&alice, &bob, 40).unwrap();

        assert_eq!(ledger.balance_of(&alice), 60);
        assert_eq!(ledger.balance_of(&bob), 40);
        assert_eq!(ledger.total_supply(), 100);
    }

    #[test]
    fn test_transfer_rules() {
        let mut ledger = FungibleLedger::new();
        let alice = acc("alice.testnet");
        let bob = acc("bob.testnet");
        ledger.register(&alice);
        ledger.mint(&alice, 10).unwrap();

        assert_eq!(
            ledger.transfer(&alice, &bob, 5),
            Err(ContractError::AccountNotRegistered("bob.testnet".into()))
        );
        ledger.register(&bob);
        assert_eq!(ledger.transfer(&alice, &alice, 5), Err(ContractError::SelfTransfer));
        assert_eq!(ledger.transfer(&alice, &bob, 0), Err(ContractError::ZeroAmount));
        assert_eq!(
            ledger.transfer(&alice, &bob, 11),
            Err(ContractError::InsufficientBalance { balance: 10, amount: 11 })
        );
    }

    #[test]
    fn test_mint_requires_registration() {
        let mut ledger = FungibleLedger::new();
        assert!(ledger.mint(&acc("ghost.testnet"), 1).is_err());
        assert_eq!(ledger.total_supply(), 0);
    }

    #[test]
    fn test_storage_deposit_requires_cost() {
        let mut ledger = FungibleLedger::new();
        let alice = acc("alice.testnet");
        assert!(ledger.storage_deposit(&alice, 1).is_err());
        assert_eq!(ledger.storage_deposit(&alice, STORAGE_DEPOSIT), Ok(true));
        assert_eq!(ledger.storage_deposit(&alice, 0), Ok(false));
    }
}
