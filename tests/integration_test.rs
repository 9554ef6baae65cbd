//! Integration Tests - End-to-end Index Component Testing
//!
//! Tests the interaction between usecases, ports, and mock adapters.
//! Uses mockall for trait mocking and tokio::test for async tests. The
//! swap chain scenarios run on the in-process sandbox.

use std::sync::Arc;

use mockall::mock;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use near_index_token::adapters::persistence::JsonlOutbox;
use near_index_token::adapters::sandbox::{self, Sandbox, SandboxBuilder, SandboxWallet};
use near_index_token::domain::units::{ONE_NEAR, STORAGE_DEPOSIT};
use near_index_token::domain::{
    AccountId, Action, CallContext, CallGraph, CallOutcome, CreateIndexForm, DeployIndexArgs,
    FunctionCall, FungibleTokenMetadata, Gas, OutboundCall, PromiseResult, TransactionEnvelope,
    U128,
};
use near_index_token::usecases::explorer::{Explorer, ExplorerSettings};
use near_index_token::usecases::index_contract::{ContractSettings, GasSchedule};
use near_index_token::usecases::scheduler::CallScheduler;
use near_index_token::usecases::explorer::total_price;
use near_index_token::usecases::tx_builder::{quote_buy, TransactionBuilder};

// ---- Mock Definitions ----

mock! {
    pub View {}

    #[async_trait::async_trait]
    impl near_index_token::ports::view::ViewClient for View {
        async fn view_call(
            &self,
            account: &AccountId,
            method: &str,
            args: Value,
        ) -> anyhow::Result<Value>;
    }
}

mock! {
    pub Dispatcher {}

    #[async_trait::async_trait]
    impl near_index_token::ports::executor::CallDispatcher for Dispatcher {
        async fn dispatch(&self, ctx: CallContext, action: Action) -> anyhow::Result<CallOutcome>;
    }
}

mock! {
    pub Wallet {}

    #[async_trait::async_trait]
    impl near_index_token::ports::wallet::WalletSubmitter for Wallet {
        async fn submit(&self, envelope: &TransactionEnvelope) -> anyhow::Result<()>;
    }
}

// ---- Helpers ----

fn acc(s: &str) -> AccountId {
    s.parse().unwrap()
}

fn settings() -> ContractSettings {
    ContractSettings {
        exchange: acc("ref.testnet"),
        wnear: acc("wrap.testnet"),
        gas: GasSchedule::default(),
    }
}

fn explorer_settings() -> ExplorerSettings {
    ExplorerSettings {
        manager: acc("manager.testnet"),
        exchange: acc("ref.testnet"),
        wnear: acc("wrap.testnet"),
        probe_amount: U128(1_000_000),
        pool_page_size: 2,
    }
}

fn call(method: &str, args: Value, deposit: u128) -> Action {
    Action::FunctionCall(FunctionCall::json(method, &args, deposit, Gas::MAX).unwrap())
}

/// Sandbox with tokens A and B in pools 1 and 2 (pool 0 is a decoy),
/// 1_000_000 units of each side, 0.3% fee.
fn chain() -> Sandbox {
    let builder = SandboxBuilder::new(settings())
        .manager(&acc("manager.testnet"), 10 * ONE_NEAR)
        .account(&acc("alice.testnet"), 100 * ONE_NEAR);
    let mut builder = ["c.testnet", "a.testnet", "b.testnet"]
        .iter()
        .fold(builder, |b, t| b.token(&acc(t), FungibleTokenMetadata::index(*t, "T")));
    for token in ["c.testnet", "a.testnet", "b.testnet"] {
        let (next, _) = builder.pool(&acc(token), 1_000_000, 1_000_000, 30).unwrap();
        builder = next;
    }
    builder.build()
}

/// Deploy `idx.manager.testnet` holding [(A,1),(B,2)] through the manager.
async fn deploy_index(scheduler: &CallScheduler<Sandbox>) -> AccountId {
    let args = DeployIndexArgs {
        metadata: FungibleTokenMetadata::index("idx", "IDX"),
        tokens: vec![acc("a.testnet"), acc("b.testnet")],
        pool_ids: vec![1, 2],
    };
    let report = scheduler
        .submit(
            &acc("alice.testnet"),
            &acc("manager.testnet"),
            vec![call("deploy_new_index", serde_json::to_value(&args).unwrap(), 26 * ONE_NEAR)],
        )
        .await
        .unwrap();
    assert!(report.failures().is_empty(), "{:?}", report.failures());
    acc("idx.manager.testnet")
}

fn metadata_json(symbol: &str) -> Value {
    serde_json::to_value(FungibleTokenMetadata::index(symbol, symbol)).unwrap()
}

// ---- Sandbox Scenarios ----

#[tokio::test]
async fn test_manager_deploys_initialized_index() {
    let chain = Arc::new(chain());
    let scheduler = CallScheduler::new(Arc::clone(&chain));
    let index = deploy_index(&scheduler).await;

    let explorer = Explorer::new(Arc::clone(&chain), explorer_settings());
    assert_eq!(explorer.index_tokens().await.unwrap(), vec![index.clone()]);
    assert_eq!(
        explorer.underlying_tokens(&index).await.unwrap(),
        vec![acc("a.testnet"), acc("b.testnet")]
    );
    assert_eq!(explorer.underlying_pool_ids(&index).await.unwrap(), vec![1, 2]);

    // 21 NEAR funding plus the initialize reserve, minus the storage
    // deposits paid for A, B, wNEAR and the exchange and the yocto of
    // register_tokens. One storage deposit stays behind.
    let reserve = 5 * STORAGE_DEPOSIT + 1;
    assert_eq!(
        chain.balance(&index).await,
        21 * ONE_NEAR + reserve - 4 * STORAGE_DEPOSIT - 1
    );
}

#[tokio::test]
async fn test_swap_chain_runs_in_dependency_order() {
    let chain = Arc::new(chain());
    let scheduler = CallScheduler::new(Arc::clone(&chain));
    let index = deploy_index(&scheduler).await;

    let report = scheduler
        .submit(
            &acc("alice.testnet"),
            &index,
            vec![call(
                "swap",
                json!({"token_amounts": ["5", "7"], "near_amount": "3"}),
                20,
            )],
        )
        .await
        .unwrap();
    assert!(report.is_success());
    assert!(report.failures().is_empty(), "{:?}", report.failures());

    let wrap = report
        .calls
        .iter()
        .find(|c| c.actions == ["near_deposit", "ft_transfer_call"])
        .expect("wrap receipt");
    assert_eq!(wrap.receiver, acc("wrap.testnet"));
    // 15 wrapped plus the yocto of the transfer call.
    assert_eq!(wrap.deposit, 16);

    let swaps: Vec<_> = report
        .find_all("swap")
        .into_iter()
        .filter(|c| c.receiver == acc("ref.testnet"))
        .collect();
    assert_eq!(swaps.len(), 2);
    let callback = report.find("withdraw_from_exchange").expect("callback receipt");
    assert_eq!(callback.predecessor, index);

    for swap in &swaps {
        assert_eq!(swap.predecessor, index);
        assert!(swap.started > wrap.finished);
        assert!(callback.started > swap.finished);
    }

    // Outputs: 5 and 7 wNEAR through 1M/1M pools at 0.3% fee.
    assert_eq!(chain.ft_balance(&acc("a.testnet"), &index).await.unwrap(), 4);
    assert_eq!(chain.ft_balance(&acc("b.testnet"), &index).await.unwrap(), 6);
    assert_eq!(chain.ft_balance(&acc("wrap.testnet"), &index).await.unwrap(), 3);
    for token in ["a.testnet", "b.testnet", "wrap.testnet"] {
        assert_eq!(
            chain
                .exchange_deposit(&acc("ref.testnet"), &index, &acc(token))
                .await,
            0
        );
    }
}

#[tokio::test]
async fn test_swap_with_wrong_amounts_builds_nothing() {
    let chain = Arc::new(chain());
    let scheduler = CallScheduler::new(Arc::clone(&chain));
    let index = deploy_index(&scheduler).await;
    let before = chain.balance(&acc("alice.testnet")).await;

    let report = scheduler
        .submit(
            &acc("alice.testnet"),
            &index,
            vec![call("swap", json!({"token_amounts": ["5"], "near_amount": "0"}), 20)],
        )
        .await
        .unwrap();
    assert!(!report.is_success());
    assert_eq!(report.calls.len(), 1);
    assert!(report.calls[0]
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("TOKEN_AMOUNTS_LENGTH_IS_INCORRECT"));
    assert_eq!(chain.balance(&acc("alice.testnet")).await, before);
}

#[tokio::test]
async fn test_withdraw_callback_is_private() {
    let chain = Arc::new(chain());
    let scheduler = CallScheduler::new(Arc::clone(&chain));
    let index = deploy_index(&scheduler).await;

    let report = scheduler
        .submit(
            &acc("alice.testnet"),
            &index,
            vec![call(
                "withdraw_from_exchange",
                json!({"near_amount": "0", "slots": ["a.testnet", "b.testnet"]}),
                0,
            )],
        )
        .await
        .unwrap();
    assert!(!report.is_success());
}

#[tokio::test]
async fn test_create_form_through_sandbox_wallet() {
    let chain = Arc::new(chain());
    let explorer = Explorer::new(Arc::clone(&chain), explorer_settings());

    // Every pool pairs wNEAR with a whitelisted token.
    let pools = explorer.simple_pools_with_wnear().await.unwrap();
    assert_eq!(pools.len(), 3);
    assert_eq!(pools[1].token, acc("a.testnet"));
    assert_eq!(pools[1].pool_id, 1);

    let mut form = CreateIndexForm::new();
    form.set_name("pair");
    form.set_symbol("PAIR");
    for (idx, pool) in pools.iter().skip(1).enumerate() {
        form.add_token();
        form.update_token(pool.token.as_str(), idx);
        form.update_pool_id(pool.pool_id, idx);
    }

    let wallet = Arc::new(SandboxWallet::new(Arc::clone(&chain)));
    let builder = TransactionBuilder::new(acc("manager.testnet"), Arc::clone(&wallet));
    let tx = builder.create_index(&acc("alice.testnet"), &form).unwrap();
    builder.send(vec![tx]).await.unwrap();

    let reports = wallet.take_reports().await;
    assert_eq!(reports.len(), 1);
    assert!(reports[0].failures().is_empty(), "{:?}", reports[0].failures());
    assert_eq!(
        explorer.underlying_pool_ids(&acc("pair.manager.testnet")).await.unwrap(),
        vec![1, 2]
    );
}

#[tokio::test]
async fn test_buy_sized_from_quotes_mints_and_stays_cheap() {
    let user = acc("alice.testnet");
    let chain = Arc::new(sandbox::demo(settings(), &acc("manager.testnet"), &user).unwrap());
    let explorer = Explorer::new(Arc::clone(&chain), explorer_settings());
    let wallet = Arc::new(SandboxWallet::new(Arc::clone(&chain)));
    let builder = TransactionBuilder::new(acc("manager.testnet"), Arc::clone(&wallet));

    let mut form = CreateIndexForm::new();
    form.set_name("stable");
    form.set_symbol("STBL");
    for (idx, pool) in explorer.simple_pools_with_wnear().await.unwrap().iter().enumerate() {
        form.add_token();
        form.update_token(pool.token.as_str(), idx);
        form.update_pool_id(pool.pool_id, idx);
    }
    let create = builder.create_index(&user, &form).unwrap();
    builder.send(vec![create]).await.unwrap();
    let index = acc("stable.manager.testnet");

    // Demo pools hold about 0.2 NEAR per 1_000 units; quoted at the
    // 1_000_000 unit sample, prices still come out per unit.
    let prices = explorer.token_prices(&index).await.unwrap();
    assert_eq!(prices.len(), 3);
    for price in &prices {
        let price = price.price.expect("demo pools quote");
        assert!(price > Decimal::from(10u64.pow(17)));
        assert!(price < Decimal::from(10u64.pow(18)));
    }

    let amount = 10;
    let quote = quote_buy(&prices, amount).unwrap();
    let before = chain.balance(&user).await;
    let buy = builder.buy(&user, &index, &prices, amount).unwrap();
    builder.send(vec![buy]).await.unwrap();

    let reports = wallet.take_reports().await;
    let report = reports.last().expect("buy report");
    assert!(report.failures().is_empty(), "{:?}", report.failures());
    assert!(report.find("ft_mint").is_some());
    assert_eq!(chain.ft_balance(&index, &user).await.unwrap(), amount);
    assert_eq!(explorer.balance_of(&index, &user).await.unwrap(), U128(amount));

    // The 5x per-token and 5x total buffers bound the spend at 25x the
    // quoted value, give or take rounding.
    let spent = before - chain.balance(&user).await;
    assert_eq!(spent, quote.deposit);
    let value = total_price(&prices) * Decimal::from_u128(amount).unwrap();
    assert!(Decimal::from_u128(spent).unwrap() <= value * Decimal::from(26));
    assert!(spent < ONE_NEAR / 1_000);
}

#[tokio::test]
async fn test_ft_balance_rejects_non_token_accounts() {
    let chain = chain();
    assert!(chain
        .ft_balance(&acc("alice.testnet"), &acc("alice.testnet"))
        .await
        .is_err());
    assert_eq!(
        chain.ft_balance(&acc("a.testnet"), &acc("ref.testnet")).await.unwrap(),
        1_000_000
    );
}

// ---- Mocked Read Path ----

#[tokio::test]
async fn test_portfolio_excludes_zero_balances() {
    let mut view = MockView::new();
    view.expect_view_call().returning(|account, method, _args| {
        let value = match (account.as_str(), method) {
            ("manager.testnet", "get_index_tokens") => json!(["empty.testnet", "held.testnet"]),
            (token, "ft_metadata") => metadata_json(&token[..4].to_uppercase()),
            ("empty.testnet", "ft_balance_of") => json!("0"),
            ("held.testnet", "ft_balance_of") => json!("10"),
            ("held.testnet", "get_underlying_tokens") => json!(["a.testnet"]),
            ("held.testnet", "get_underlying_poolids") => json!([0]),
            // 2 yocto per unit at the 1_000_000 unit sample.
            ("ref.testnet", "get_return") => json!("2000000"),
            other => anyhow::bail!("unexpected view {other:?}"),
        };
        Ok(value)
    });

    let explorer = Explorer::new(Arc::new(view), explorer_settings());
    let portfolio = explorer.portfolio(&acc("alice.testnet")).await.unwrap();
    assert_eq!(portfolio.len(), 1);
    assert_eq!(portfolio[0].token, acc("held.testnet"));
    assert_eq!(portfolio[0].balance, U128(10));
    assert_eq!(portfolio[0].underlying_tokens, vec![acc("a.testnet")]);
    assert_eq!(portfolio[0].value, Decimal::from(20));
}

#[tokio::test]
async fn test_failed_quote_reports_absent_price() {
    let mut view = MockView::new();
    view.expect_view_call().returning(|account, method, args| {
        let value = match (account.as_str(), method) {
            ("idx.testnet", "get_underlying_tokens") => json!(["a.testnet", "b.testnet"]),
            ("idx.testnet", "get_underlying_poolids") => json!([4, 5]),
            ("ref.testnet", "get_return") if args["pool_id"] == 4 => json!("7000000"),
            ("ref.testnet", "get_return") => anyhow::bail!("E13: pool has no liquidity"),
            other => anyhow::bail!("unexpected view {other:?}"),
        };
        Ok(value)
    });

    let explorer = Explorer::new(Arc::new(view), explorer_settings());
    let prices = explorer.token_prices(&acc("idx.testnet")).await.unwrap();
    assert_eq!(prices.len(), 2);
    assert_eq!(prices[0].price, Some(Decimal::from(7)));
    assert_eq!(prices[1].pool_id, 5);
    assert_eq!(prices[1].price, None);
}

#[tokio::test]
async fn test_pool_discovery_pages_and_filters() {
    let pool = |kind: &str, a: &str, b: &str| {
        json!({
            "pool_kind": kind,
            "token_account_ids": [a, b],
            "amounts": ["100", "200"],
            "total_fee": 30,
            "shares_total_supply": "1",
        })
    };
    let pools = vec![
        pool("SIMPLE_POOL", "wrap.testnet", "a.testnet"),
        pool("SIMPLE_POOL", "x.testnet", "a.testnet"),
        pool("STABLE_SWAP", "wrap.testnet", "b.testnet"),
        pool("SIMPLE_POOL", "b.testnet", "wrap.testnet"),
        pool("SIMPLE_POOL", "wrap.testnet", "c.testnet"),
    ];

    let mut view = MockView::new();
    view.expect_view_call().returning(move |_account, method, args| {
        let value = match method {
            "get_whitelisted_tokens" => json!(["a.testnet", "b.testnet"]),
            "get_number_of_pools" => json!(pools.len()),
            "get_pools" => {
                let from = args["from_index"].as_u64().unwrap() as usize;
                let limit = args["limit"].as_u64().unwrap() as usize;
                json!(pools.iter().skip(from).take(limit).collect::<Vec<_>>())
            }
            other => anyhow::bail!("unexpected view {other}"),
        };
        Ok(value)
    });

    let explorer = Explorer::new(Arc::new(view), explorer_settings());
    let choices = explorer.simple_pools_with_wnear().await.unwrap();
    let picked: Vec<_> = choices.iter().map(|c| (c.pool_id, c.token.as_str())).collect();
    assert_eq!(picked, vec![(0, "a.testnet"), (3, "b.testnet")]);
    assert_eq!(choices[1].wnear_reserve, U128(200));
}

// ---- Mocked Scheduler ----

#[tokio::test]
async fn test_then_node_sees_failed_dependency() {
    let mut dispatcher = MockDispatcher::new();
    dispatcher.expect_dispatch().returning(|ctx, _action| {
        match ctx.current_account.as_str() {
            "fails.testnet" => anyhow::bail!("boom"),
            "ok.testnet" => Ok(CallOutcome::json(&U128(1))),
            "after.testnet" => {
                assert_eq!(
                    ctx.promise_results,
                    vec![PromiseResult::json(&U128(1)), PromiseResult::Failed]
                );
                Ok(CallOutcome::empty())
            }
            other => panic!("unexpected receiver {other}"),
        }
    });

    let noop = || FunctionCall::json("noop", &json!({}), 0, Gas::from_tgas(5)).unwrap();
    let mut graph = CallGraph::new();
    let ok = graph.spawn(OutboundCall::new(acc("ok.testnet")).function_call(noop()));
    let fails = graph.spawn(OutboundCall::new(acc("fails.testnet")).function_call(noop()));
    graph.then(&ok.and(fails), OutboundCall::new(acc("after.testnet")).function_call(noop()));

    let scheduler = CallScheduler::new(Arc::new(dispatcher));
    let report = scheduler
        .execute(&acc("alice.testnet"), &acc("alice.testnet"), &graph)
        .await
        .unwrap();

    assert_eq!(report.calls.len(), 3);
    assert_eq!(report.failures().len(), 1);
    assert_eq!(report.failures()[0].receiver, acc("fails.testnet"));
    // The continuation ran and is the tail.
    assert!(report.is_success());
}

#[tokio::test]
async fn test_batched_actions_stop_at_first_failure() {
    let mut dispatcher = MockDispatcher::new();
    dispatcher
        .expect_dispatch()
        .times(2)
        .returning(|_ctx, action| match action.label() {
            "first" => Ok(CallOutcome::empty()),
            "second" => anyhow::bail!("second failed"),
            other => panic!("{other} must not run"),
        });

    let f = |m: &str| FunctionCall::json(m, &json!({}), 0, Gas::from_tgas(5)).unwrap();
    let scheduler = CallScheduler::new(Arc::new(dispatcher));
    let report = scheduler
        .submit(
            &acc("alice.testnet"),
            &acc("bob.testnet"),
            vec![
                Action::FunctionCall(f("first")),
                Action::FunctionCall(f("second")),
                Action::FunctionCall(f("third")),
            ],
        )
        .await
        .unwrap();
    assert!(!report.is_success());
    assert!(report.calls[0].error.as_deref().unwrap_or_default().starts_with("second"));
}

// ---- Wallet / Outbox ----

#[tokio::test]
async fn test_send_hands_envelope_to_wallet() {
    let mut wallet = MockWallet::new();
    wallet
        .expect_submit()
        .times(1)
        .withf(|env: &TransactionEnvelope| {
            env.transactions.len() == 1 && env.transactions[0].actions[0].method_name() == "redeem_index_token"
        })
        .returning(|_| Ok(()));

    let builder = TransactionBuilder::new(acc("manager.testnet"), Arc::new(wallet));
    let tx = builder
        .redeem(&acc("alice.testnet"), &acc("idx.manager.testnet"), U128(3))
        .unwrap();
    let envelope = builder.send(vec![tx]).await.unwrap();
    assert_eq!(envelope.transactions[0].total_deposit(), 1);
}

#[tokio::test]
async fn test_wallet_rejection_surfaces() {
    let mut wallet = MockWallet::new();
    wallet
        .expect_submit()
        .returning(|_| anyhow::bail!("user closed the wallet"));

    let builder = TransactionBuilder::new(acc("manager.testnet"), Arc::new(wallet));
    let tx = builder
        .redeem(&acc("alice.testnet"), &acc("idx.manager.testnet"), U128(3))
        .unwrap();
    assert!(builder.send(vec![tx]).await.is_err());
    assert!(builder.send(Vec::new()).await.is_err());
}

#[tokio::test]
async fn test_outbox_keeps_sent_envelopes() {
    let dir = std::env::temp_dir().join(format!("index-outbox-{}", uuid::Uuid::new_v4()));
    let outbox = Arc::new(JsonlOutbox::new(dir.to_str().unwrap()).await.unwrap());
    let builder = TransactionBuilder::new(acc("manager.testnet"), Arc::clone(&outbox));

    let mut form = CreateIndexForm::new();
    form.set_name("bull");
    form.set_symbol("BULL");
    form.add_token();
    form.update_token("a.testnet", 0);
    form.update_pool_id(7, 0);
    let create = builder.create_index(&acc("alice.testnet"), &form).unwrap();
    let sent = builder.send(vec![create]).await.unwrap();

    let stored = outbox.load_all().await.unwrap();
    assert_eq!(stored, vec![sent]);
    assert_eq!(stored[0].transactions[0].total_deposit(), 26 * ONE_NEAR);

    let _ = tokio::fs::remove_dir_all(&dir).await;
}
