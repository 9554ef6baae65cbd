//! Accounts, native balances and deployed contracts of the sandbox.
//!
//! Every action is applied to a copy of the world and committed only if it
//! succeeds, so a failed call leaves no trace: its attached deposit is
//! never debited and partial state writes disappear.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;
use tracing::debug;

use super::exchange::Exchange;
use super::token::FtToken;
use super::Reply;
use crate::domain::call_graph::ContractCode;
use crate::domain::{AccountId, Action, Balance, CallContext, CallOutcome, FunctionCall};
use crate::usecases::index_contract::{ContractSettings, IndexContract};
use crate::usecases::manager::IndexManager;

/// Code tag the manager deploys; the sandbox instantiates an index for it.
pub const INDEX_CODE: &[u8] = b"near-index-token";

pub fn index_code() -> ContractCode {
    ContractCode(Arc::new(INDEX_CODE.to_vec()))
}

/// A deployed contract.
#[derive(Debug, Clone)]
pub enum Contract {
    Token(FtToken),
    Exchange(Exchange),
    Index(IndexContract),
    Manager(IndexManager),
}

impl Contract {
    fn call(&mut self, ctx: &CallContext, call: &FunctionCall) -> anyhow::Result<Reply> {
        match self {
            Self::Token(token) => token.call(ctx, call),
            Self::Exchange(exchange) => exchange.call(ctx, call),
            Self::Index(index) => Ok(Reply::value(index.call(ctx, call)?)),
            Self::Manager(manager) => Ok(Reply::value(manager.call(ctx, call)?)),
        }
    }

    fn view(&self, method: &str, args: Value) -> anyhow::Result<Value> {
        match self {
            Self::Token(token) => token.view(method, args),
            Self::Exchange(exchange) => exchange.view(method, args),
            Self::Index(index) => Ok(index.view(method, args)?),
            Self::Manager(manager) => Ok(manager.view(method, &args)?),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Account {
    /// Native balance in yoctoNEAR.
    pub balance: Balance,
    pub contract: Option<Contract>,
}

#[derive(Debug, Clone)]
pub struct World {
    accounts: BTreeMap<AccountId, Account>,
    /// Settings every deployed index starts with.
    index_settings: ContractSettings,
}

impl World {
    pub fn new(index_settings: ContractSettings) -> Self {
        Self {
            accounts: BTreeMap::new(),
            index_settings,
        }
    }

    pub fn index_settings(&self) -> &ContractSettings {
        &self.index_settings
    }

    pub fn account(&self, id: &AccountId) -> Option<&Account> {
        self.accounts.get(id)
    }

    pub fn account_mut(&mut self, id: &AccountId) -> anyhow::Result<&mut Account> {
        self.accounts
            .get_mut(id)
            .with_context(|| format!("Account {id} does not exist"))
    }

    pub fn insert(&mut self, id: AccountId, account: Account) {
        self.accounts.insert(id, account);
    }

    pub fn balance(&self, id: &AccountId) -> Balance {
        self.accounts.get(id).map_or(0, |a| a.balance)
    }

    pub fn token_mut(&mut self, id: &AccountId) -> anyhow::Result<&mut FtToken> {
        match self.account_mut(id)?.contract.as_mut() {
            Some(Contract::Token(token)) => Ok(token),
            _ => anyhow::bail!("{id} is not a token"),
        }
    }

    pub fn exchange_mut(&mut self, id: &AccountId) -> anyhow::Result<&mut Exchange> {
        match self.account_mut(id)?.contract.as_mut() {
            Some(Contract::Exchange(exchange)) => Ok(exchange),
            _ => anyhow::bail!("{id} is not an exchange"),
        }
    }

    /// Apply one action atomically.
    pub fn apply(&mut self, ctx: &CallContext, action: &Action) -> anyhow::Result<CallOutcome> {
        let mut next = self.clone();
        let outcome = next.apply_in_place(ctx, action)?;
        *self = next;
        Ok(outcome)
    }

    fn apply_in_place(&mut self, ctx: &CallContext, action: &Action) -> anyhow::Result<CallOutcome> {
        let receiver = &ctx.current_account;
        match action {
            Action::CreateAccount => {
                anyhow::ensure!(
                    !self.accounts.contains_key(receiver),
                    "Account {receiver} already exists"
                );
                anyhow::ensure!(
                    receiver.is_sub_account_of(&ctx.predecessor),
                    "{} cannot create {receiver}",
                    ctx.predecessor
                );
                self.insert(receiver.clone(), Account::default());
                debug!(account = %receiver, "Account created");
                Ok(CallOutcome::empty())
            }
            Action::Transfer { deposit } => {
                self.move_near(&ctx.predecessor, receiver, *deposit)?;
                Ok(CallOutcome::empty())
            }
            Action::DeployContract { code } => {
                anyhow::ensure!(
                    ctx.predecessor == *receiver || receiver.is_sub_account_of(&ctx.predecessor),
                    "{} cannot deploy to {receiver}",
                    ctx.predecessor
                );
                anyhow::ensure!(code.0.as_slice() == INDEX_CODE, "Unknown contract code");
                let index = IndexContract::new(self.index_settings.clone());
                self.account_mut(receiver)?.contract = Some(Contract::Index(index));
                debug!(account = %receiver, "Index code deployed");
                Ok(CallOutcome::empty())
            }
            Action::FunctionCall(call) => {
                self.move_near(&ctx.predecessor, receiver, call.deposit)?;
                let reply = self
                    .account_mut(receiver)?
                    .contract
                    .as_mut()
                    .with_context(|| format!("{receiver} has no contract"))?
                    .call(ctx, call)?;
                if reply.refund > 0 {
                    self.move_near(receiver, &ctx.predecessor, reply.refund)?;
                }
                Ok(reply.outcome)
            }
        }
    }

    fn move_near(&mut self, from: &AccountId, to: &AccountId, amount: Balance) -> anyhow::Result<()> {
        if amount == 0 {
            return Ok(());
        }
        anyhow::ensure!(self.accounts.contains_key(to), "Account {to} does not exist");
        let sender = self.account_mut(from)?;
        anyhow::ensure!(
            sender.balance >= amount,
            "NotEnoughBalance: {from} has {}, needs {amount}",
            sender.balance
        );
        sender.balance -= amount;
        self.account_mut(to)?.balance += amount;
        Ok(())
    }

    pub fn view(&self, account: &AccountId, method: &str, args: Value) -> anyhow::Result<Value> {
        self.accounts
            .get(account)
            .and_then(|a| a.contract.as_ref())
            .with_context(|| format!("{account} has no contract"))?
            .view(method, args)
    }
}
