//! In-process NEAR Sandbox
//!
//! A small deterministic chain: native balances, account creation, a
//! wNEAR wrapper, NEP-141 tokens, a Ref-style exchange, the index manager
//! and every index it deploys. It implements both the `CallDispatcher`
//! port (for the scheduler) and the `ViewClient` port (for the explorer),
//! so the whole product runs offline.
//!
//! Sub-modules:
//! - `world`: accounts, contracts and atomic action application
//! - `token`: NEP-141 tokens and wNEAR
//! - `exchange`: pools, deposits, swaps and withdrawals
//! - `wallet`: wallet port that executes envelopes on the sandbox

pub mod exchange;
pub mod token;
pub mod wallet;
pub mod world;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::info;

use crate::domain::units::ONE_NEAR;
use crate::domain::{
    AccountId, Action, Balance, CallContext, CallOutcome, FungibleTokenMetadata, PoolId, U128,
};
use crate::ports::executor::CallDispatcher;
use crate::ports::view::ViewClient;
use crate::usecases::index_contract::ContractSettings;
use crate::usecases::manager::IndexManager;

pub use exchange::{Exchange, Pool};
pub use token::FtToken;
pub use wallet::SandboxWallet;
pub use world::{index_code, Account, Contract, World};

/// What a sandbox contract hands back: the outcome plus native NEAR to
/// return to the caller.
#[derive(Debug)]
pub struct Reply {
    pub outcome: CallOutcome,
    pub refund: Balance,
}

impl Reply {
    pub const fn value(outcome: CallOutcome) -> Self {
        Self { outcome, refund: 0 }
    }

    pub const fn refund(outcome: CallOutcome, refund: Balance) -> Self {
        Self { outcome, refund }
    }
}

/// Shared sandbox chain.
pub struct Sandbox {
    world: Mutex<World>,
}

impl Sandbox {
    pub fn builder(settings: ContractSettings) -> SandboxBuilder {
        SandboxBuilder::new(settings)
    }

    /// Native balance of `account`.
    pub async fn balance(&self, account: &AccountId) -> Balance {
        self.world.lock().await.balance(account)
    }

    /// Balance of `account` on any NEP-141 contract, index tokens included.
    ///
    /// # Errors
    /// Returns error if `token` does not answer `ft_balance_of`.
    pub async fn ft_balance(&self, token: &AccountId, account: &AccountId) -> anyhow::Result<Balance> {
        let value = self
            .world
            .lock()
            .await
            .view(token, "ft_balance_of", json!({ "account_id": account }))?;
        let balance: U128 = serde_json::from_value(value)
            .with_context(|| format!("{token} returned a malformed balance"))?;
        Ok(balance.0)
    }

    /// Internal exchange balance of `token` held for `account`.
    pub async fn exchange_deposit(
        &self,
        exchange: &AccountId,
        account: &AccountId,
        token: &AccountId,
    ) -> Balance {
        let mut world = self.world.lock().await;
        world
            .exchange_mut(exchange)
            .map_or(0, |e| e.deposit_of(account, token))
    }
}

#[async_trait]
impl CallDispatcher for Sandbox {
    async fn dispatch(&self, ctx: CallContext, action: Action) -> anyhow::Result<CallOutcome> {
        self.world.lock().await.apply(&ctx, &action)
    }
}

#[async_trait]
impl ViewClient for Sandbox {
    async fn view_call(
        &self,
        account: &AccountId,
        method: &str,
        args: Value,
    ) -> anyhow::Result<Value> {
        self.world.lock().await.view(account, method, args)
    }
}

/// Builder for a sandbox chain.
///
/// `new` already creates the wNEAR wrapper and the exchange named in the
/// settings, each funded with 10 NEAR for its own outbound deposits.
pub struct SandboxBuilder {
    world: World,
}

impl SandboxBuilder {
    pub fn new(settings: ContractSettings) -> Self {
        let mut world = World::new(settings.clone());
        let mut wnear = FtToken::wrapped_near();
        wnear.ledger_mut().register(&settings.exchange);
        world.insert(
            settings.wnear.clone(),
            Account {
                balance: 10 * ONE_NEAR,
                contract: Some(Contract::Token(wnear)),
            },
        );
        world.insert(
            settings.exchange.clone(),
            Account {
                balance: 10 * ONE_NEAR,
                contract: Some(Contract::Exchange(Exchange::new())),
            },
        );
        Self { world }
    }

    /// Plain account with a native balance.
    #[must_use]
    pub fn account(mut self, id: &AccountId, balance: Balance) -> Self {
        self.world.insert(
            id.clone(),
            Account {
                balance,
                contract: None,
            },
        );
        self
    }

    /// NEP-141 token; the exchange is registered on it.
    #[must_use]
    pub fn token(mut self, id: &AccountId, metadata: FungibleTokenMetadata) -> Self {
        let mut token = FtToken::new(metadata);
        token
            .ledger_mut()
            .register(&self.world.index_settings().exchange);
        self.world.insert(
            id.clone(),
            Account {
                balance: ONE_NEAR,
                contract: Some(Contract::Token(token)),
            },
        );
        self
    }

    /// Index manager deploying the index code.
    #[must_use]
    pub fn manager(mut self, id: &AccountId, balance: Balance) -> Self {
        self.world.insert(
            id.clone(),
            Account {
                balance,
                contract: Some(Contract::Manager(IndexManager::new(index_code()))),
            },
        );
        self
    }

    /// Register `account` on `token` and mint `amount` to it.
    ///
    /// # Errors
    /// Returns error if `token` is not a token.
    pub fn fund(mut self, token: &AccountId, account: &AccountId, amount: Balance) -> anyhow::Result<Self> {
        let ledger = self.world.token_mut(token)?.ledger_mut();
        ledger.register(account);
        if amount > 0 {
            ledger.mint(account, amount)?;
        }
        Ok(self)
    }

    /// Simple wNEAR/`token` pool seeded with the given reserves. The
    /// exchange holds the reserves on both token ledgers; `token` is
    /// whitelisted.
    ///
    /// # Errors
    /// Returns error if `token` is not a token.
    pub fn pool(
        mut self,
        token: &AccountId,
        wnear_reserve: Balance,
        token_reserve: Balance,
        total_fee: u32,
    ) -> anyhow::Result<(Self, PoolId)> {
        let settings = self.world.index_settings().clone();
        self = self
            .fund(&settings.wnear, &settings.exchange, wnear_reserve)?
            .fund(token, &settings.exchange, token_reserve)?;

        let exchange = self.world.exchange_mut(&settings.exchange)?;
        exchange.whitelist(token.clone());
        let id = exchange.add_pool(Pool {
            tokens: [settings.wnear.clone(), token.clone()],
            reserves: [wnear_reserve, token_reserve],
            total_fee,
            shares_total_supply: wnear_reserve.max(1),
        });
        Ok((self, id))
    }

    pub fn build(self) -> Sandbox {
        Sandbox {
            world: Mutex::new(self.world),
        }
    }
}

/// Offline demo chain: three stable-ish tokens with wNEAR pools, a funded
/// user and a manager ready to deploy indices.
///
/// # Errors
/// Returns error if a demo account cannot be set up.
pub fn demo(settings: ContractSettings, manager: &AccountId, user: &AccountId) -> anyhow::Result<Sandbox> {
    let mut builder = SandboxBuilder::new(settings)
        .manager(manager, 10 * ONE_NEAR)
        .account(user, 1_000 * ONE_NEAR);

    // 6-decimal tokens priced around 0.2 NEAR per unit.
    for (name, symbol, near_reserve) in [
        ("usdt", "USDT", 200),
        ("usdc", "USDC", 210),
        ("dai", "DAI", 190),
    ] {
        let id: AccountId = format!("{name}.fakes.testnet").parse()?;
        let mut metadata = FungibleTokenMetadata::index(symbol, symbol);
        metadata.decimals = 6;
        builder = builder.token(&id, metadata);
        let (next, pool_id) = builder.pool(&id, near_reserve * ONE_NEAR, 1_000_000_000, 30)?;
        builder = next;
        info!(token = %id, pool_id, "Demo pool created");
    }

    info!(manager = %manager, user = %user, "Demo sandbox ready");
    Ok(builder.build())
}
