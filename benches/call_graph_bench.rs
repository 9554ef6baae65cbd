//! Call Graph Benchmarks — Contract Hot Paths
//!
//! Benchmarks what runs on every index transaction: building the swap
//! chain, ordering it into waves, executing it over a no-op dispatcher
//! and quoting a pool.
//!
//! Run with: cargo bench --bench call_graph_bench

use std::sync::Arc;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use near_index_token::adapters::sandbox::Pool;
use near_index_token::domain::units::ONE_NEAR;
use near_index_token::domain::{AccountId, Action, CallContext, CallGraph, CallOutcome, Gas, U128};
use near_index_token::ports::executor::CallDispatcher;
use near_index_token::usecases::index_contract::{
    ContractSettings, GasSchedule, IndexContract, InitArgs,
};
use near_index_token::usecases::scheduler::CallScheduler;

fn acc(s: &str) -> AccountId {
    s.parse().unwrap()
}

struct Accept;

#[async_trait]
impl CallDispatcher for Accept {
    async fn dispatch(&self, _ctx: CallContext, _action: Action) -> anyhow::Result<CallOutcome> {
        Ok(CallOutcome::empty())
    }
}

/// Initialized three-token index plus the context of a swap into it.
fn setup() -> (IndexContract, CallContext) {
    let mut index = IndexContract::new(ContractSettings {
        exchange: acc("ref.testnet"),
        wnear: acc("wrap.testnet"),
        gas: GasSchedule::default(),
    });
    let tokens: Vec<AccountId> = (0..3).map(|i| acc(&format!("t{i}.testnet"))).collect();
    let init = CallContext::transaction(
        acc("manager.testnet"),
        acc("idx.manager.testnet"),
        ONE_NEAR,
        Gas::MAX,
    );
    index
        .initialize(
            &init,
            InitArgs {
                owner_id: None,
                index_token_account: None,
                tokens,
                pool_ids: vec![0, 1, 2],
                metadata: None,
                total_supply: None,
            },
        )
        .unwrap();
    let ctx = CallContext::transaction(
        acc("alice.testnet"),
        acc("idx.manager.testnet"),
        3 * ONE_NEAR,
        Gas::MAX,
    );
    (index, ctx)
}

fn swap_graph(index: &IndexContract, ctx: &CallContext) -> CallGraph {
    let amounts = vec![U128(ONE_NEAR / 2); 3];
    index.swap(ctx, &amounts, U128(ONE_NEAR / 10)).unwrap()
}

/// Benchmark building the wrap → swaps → withdraw chain.
fn bench_swap_graph_build(c: &mut Criterion) {
    let (index, ctx) = setup();

    c.bench_function("swap_graph_build_3_tokens", |b| {
        b.iter(|| {
            let _graph = index.swap(
                black_box(&ctx),
                black_box(&[U128(ONE_NEAR / 2); 3]),
                black_box(U128(0)),
            );
        });
    });
}

/// Benchmark wave ordering and rendering of a built chain.
fn bench_graph_levels(c: &mut Criterion) {
    let (index, ctx) = setup();
    let graph = swap_graph(&index, &ctx);

    c.bench_function("swap_graph_levels", |b| {
        b.iter(|| {
            let _levels = black_box(&graph).levels();
        });
    });

    c.bench_function("swap_graph_describe", |b| {
        b.iter(|| {
            let _lines = black_box(&graph).describe();
        });
    });
}

/// Benchmark scheduling a chain over a dispatcher that accepts everything.
fn bench_scheduler_execute(c: &mut Criterion) {
    let (index, ctx) = setup();
    let graph = swap_graph(&index, &ctx);
    let scheduler = CallScheduler::new(Arc::new(Accept));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let signer = acc("alice.testnet");

    c.bench_function("scheduler_execute_swap_chain", |b| {
        b.to_async(&runtime)
            .iter(|| scheduler.execute(&signer, &signer, black_box(&graph)));
    });
}

/// Benchmark a constant-product quote.
fn bench_pool_quote(c: &mut Criterion) {
    let wnear = acc("wrap.testnet");
    let token = acc("usdt.testnet");
    let pool = Pool {
        tokens: [wnear.clone(), token.clone()],
        reserves: [200 * ONE_NEAR, 1_000_000_000],
        total_fee: 30,
        shares_total_supply: 200 * ONE_NEAR,
    };

    c.bench_function("pool_get_return", |b| {
        b.iter(|| {
            let _out = pool.get_return(&wnear, black_box(ONE_NEAR), &token);
        });
    });
}

criterion_group!(
    benches,
    bench_swap_graph_build,
    bench_graph_levels,
    bench_scheduler_execute,
    bench_pool_quote,
);
criterion_main!(benches);
