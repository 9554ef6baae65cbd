//! near-index-token - Entry Point
//!
//! Command line over the index product: read indices, prices, portfolios
//! and pools, build wallet transactions into the outbox, run the full
//! swap chain on the in-process sandbox, or serve the read API.
//!
//! Wiring sequence:
//! 1. Parse the command line
//! 2. Load config.toml + validate
//! 3. Init tracing (JSON structured logging)
//! 4. Create the metrics registry
//! 5. Pick the view backend (NEAR RPC or demo sandbox)
//! 6. Run the command

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use near_index_token::adapters::http::{ApiState, HealthState, HttpServer};
use near_index_token::adapters::metrics::MetricsRegistry;
use near_index_token::adapters::persistence::JsonlOutbox;
use near_index_token::adapters::rpc::NearRpcClient;
use near_index_token::adapters::sandbox::{self, Sandbox, SandboxWallet};
use near_index_token::config::{self, AppConfig, NetworkMode};
use near_index_token::domain::units::{format_near, parse_near, ONE_YOCTO};
use near_index_token::domain::{AccountId, CreateIndexForm, PoolId, Transaction, U128};
use near_index_token::ports::view::ViewClient;
use near_index_token::ports::wallet::WalletSubmitter;
use near_index_token::usecases::explorer::Explorer;
use near_index_token::usecases::tx_builder::TransactionBuilder;

/// Account that owns the demo funds on the sandbox.
const DEMO_USER: &str = "alice.testnet";

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = "config.toml")]
    config: String,

    /// Signer of built transactions [default: wallet.signer from config]
    #[arg(long, global = true)]
    signer: Option<AccountId>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every index with metadata and prices
    Explore,
    /// Prices of one index's underlying tokens
    Prices {
        /// Index token account
        index: AccountId,
    },
    /// Non-zero index holdings of an account
    Portfolio {
        /// Account to inspect
        account: AccountId,
    },
    /// Simple wNEAR pools available for new indices
    Pools,
    /// Build transactions and append them to the outbox
    #[command(subcommand)]
    Tx(TxCmd),
    /// Deploy a demo index and run a swap chain on the sandbox
    Simulate,
    /// Serve probes, metrics and the read API
    Serve,
}

#[derive(Subcommand)]
enum TxCmd {
    /// Deploy a new index through the manager
    Create {
        /// Index name, also the sub-account prefix
        name: String,
        symbol: String,
        /// Underlying token (repeat for each)
        #[arg(long = "token", required = true)]
        tokens: Vec<String>,
        /// Pool id of each token, same order
        #[arg(long = "pool", required = true)]
        pool_ids: Vec<PoolId>,
    },
    /// Buy index tokens sized from current prices
    Buy {
        index: AccountId,
        /// Index tokens to buy
        amount: u128,
    },
    /// Swap attached NEAR across the basket
    Swap {
        index: AccountId,
        /// wNEAR per pool in NEAR, basket order
        #[arg(long, value_delimiter = ',', required = true)]
        amounts: Vec<String>,
        /// wNEAR to withdraw back, in NEAR
        #[arg(long, default_value = "0")]
        near_amount: String,
    },
    /// Redeem index tokens for the underlying tokens
    Redeem {
        index: AccountId,
        /// Amount to redeem [default: whole balance]
        amount: Option<u128>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Parse command line ───────────────────────────────
    let cli = Cli::parse();

    // ── 2. Load configuration ───────────────────────────────
    let config = config::loader::load_config(&cli.config).context("Failed to load configuration")?;

    // ── 3. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.app.log_level)),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    info!(
        name = %config.app.name,
        version = env!("CARGO_PKG_VERSION"),
        mode = ?config.network.mode,
        "Starting near-index-token"
    );

    // ── 4. Metrics registry ─────────────────────────────────
    let metrics = Arc::new(MetricsRegistry::new().context("Failed to create metrics")?);

    // ── 5/6. Pick the backend and run ───────────────────────
    if let Command::Simulate = cli.command {
        return simulate(&config, metrics).await;
    }

    match config.network.mode {
        NetworkMode::Rpc => {
            let client = NearRpcClient::new(config.rpc())
                .context("Failed to create RPC client")?
                .with_metrics(Arc::clone(&metrics));
            info!(url = client.url(), "Using NEAR RPC");
            run(cli, &config, Arc::new(client), metrics).await
        }
        NetworkMode::Sandbox => {
            let (chain, _) = demo_chain(&config, Arc::clone(&metrics)).await?;
            run(cli, &config, chain, metrics).await
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn near(amount: &str) -> Result<u128> {
    parse_near(amount).with_context(|| format!("Invalid NEAR amount: {amount}"))
}

/// Run a read, transaction or serve command against `view`.
async fn run<V: ViewClient>(
    cli: Cli,
    config: &AppConfig,
    view: Arc<V>,
    metrics: Arc<MetricsRegistry>,
) -> Result<()> {
    let explorer = Explorer::new(view, config.explorer_settings());

    match cli.command {
        Command::Explore => print_json(&explorer.explore().await?),
        Command::Prices { index } => print_json(&explorer.token_prices(&index).await?),
        Command::Portfolio { account } => print_json(&explorer.portfolio(&account).await?),
        Command::Pools => print_json(&explorer.simple_pools_with_wnear().await?),
        Command::Tx(cmd) => {
            let signer = cli
                .signer
                .or_else(|| config.wallet.signer.clone())
                .context("No signer: pass --signer or set wallet.signer")?;
            let outbox = JsonlOutbox::new(&config.outbox.data_dir)
                .await?
                .with_metrics(metrics);
            let builder = TransactionBuilder::new(config.contracts.manager.clone(), Arc::new(outbox))
                .with_create_deposit(config.deposits.create_index()?);
            let tx = build_tx(cmd, &signer, &builder, &explorer).await?;
            let envelope = builder.send(vec![tx]).await?;
            print_json(&envelope)
        }
        Command::Serve => serve(config, explorer, metrics).await,
        Command::Simulate => simulate(config, metrics).await,
    }
}

async fn build_tx<V: ViewClient, W: WalletSubmitter>(
    cmd: TxCmd,
    signer: &AccountId,
    builder: &TransactionBuilder<W>,
    explorer: &Explorer<V>,
) -> Result<Transaction> {
    match cmd {
        TxCmd::Create {
            name,
            symbol,
            tokens,
            pool_ids,
        } => {
            anyhow::ensure!(
                tokens.len() == pool_ids.len(),
                "{} tokens but {} pool ids",
                tokens.len(),
                pool_ids.len()
            );
            let mut form = CreateIndexForm::new();
            form.set_name(&name);
            form.set_symbol(&symbol);
            for (idx, (token, pool_id)) in tokens.iter().zip(pool_ids).enumerate() {
                form.add_token();
                form.update_token(token, idx);
                form.update_pool_id(pool_id, idx);
            }
            builder.create_index(signer, &form)
        }
        TxCmd::Buy { index, amount } => {
            let prices = explorer.token_prices(&index).await?;
            builder.buy(signer, &index, &prices, amount)
        }
        TxCmd::Swap {
            index,
            amounts,
            near_amount,
        } => {
            let amounts = amounts.iter().map(|a| near(a).map(U128)).collect::<Result<Vec<_>>>()?;
            let near_amount = near(&near_amount)?;
            // The contract keeps one yocto per swap and per withdrawal, plus one.
            let margin = (2 * amounts.len() as u128 + 1) * ONE_YOCTO;
            let spend: u128 = amounts.iter().map(|a| a.0).sum::<u128>() + near_amount;
            builder.swap(signer, &index, &amounts, U128(near_amount), spend + margin)
        }
        TxCmd::Redeem { index, amount } => {
            let amount = match amount {
                Some(amount) => U128(amount),
                None => explorer.balance_of(&index, signer).await?,
            };
            builder.redeem(signer, &index, amount)
        }
    }
}

/// Serve the read API until SIGINT.
async fn serve<V: ViewClient>(
    config: &AppConfig,
    explorer: Explorer<V>,
    metrics: Arc<MetricsRegistry>,
) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let state = Arc::new(ApiState {
        explorer,
        metrics,
        health: HealthState::new(),
    });
    let server = HttpServer::new(state, config.server.bind_address.clone());
    let handle = tokio::spawn(async move {
        if let Err(e) = server.run(shutdown_rx).await {
            error!(error = %e, "HTTP server failed");
        }
    });

    signal::ctrl_c().await.context("Failed to listen for SIGINT")?;
    info!("SIGINT received, initiating graceful shutdown");
    let _ = shutdown_tx.send(());

    if tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .is_err()
    {
        warn!("HTTP server did not stop in time");
    }
    info!("Shutdown complete");
    Ok(())
}

/// Demo sandbox with one index deployed through the manager.
///
/// The index basket is every simple wNEAR pool the exchange offers.
async fn demo_chain(
    config: &AppConfig,
    metrics: Arc<MetricsRegistry>,
) -> Result<(Arc<Sandbox>, AccountId)> {
    let user: AccountId = DEMO_USER.parse()?;
    let chain = Arc::new(sandbox::demo(
        config.contract_settings(),
        &config.contracts.manager,
        &user,
    )?);

    let explorer = Explorer::new(Arc::clone(&chain), config.explorer_settings());
    let pools = explorer.simple_pools_with_wnear().await?;

    let mut form = CreateIndexForm::new();
    form.set_name("demo");
    form.set_symbol("DEMO");
    for (idx, pool) in pools.iter().enumerate() {
        form.add_token();
        form.update_token(pool.token.as_str(), idx);
        form.update_pool_id(pool.pool_id, idx);
    }

    let wallet = Arc::new(SandboxWallet::new(Arc::clone(&chain)).with_metrics(metrics));
    let builder = TransactionBuilder::new(config.contracts.manager.clone(), Arc::clone(&wallet))
        .with_create_deposit(config.deposits.create_index()?);
    let create = builder.create_index(&user, &form)?;
    builder.send(vec![create]).await?;

    let reports = wallet.take_reports().await;
    anyhow::ensure!(
        reports.iter().all(|r| r.failures().is_empty()),
        "Demo index deployment failed"
    );
    let index = config.contracts.manager.sub_account("demo")?;
    info!(index = %index, tokens = pools.len(), "Demo index deployed");
    Ok((chain, index))
}

/// Deploy the demo index, run one swap chain and print what executed.
async fn simulate(config: &AppConfig, metrics: Arc<MetricsRegistry>) -> Result<()> {
    let user: AccountId = DEMO_USER.parse()?;
    let (chain, index) = demo_chain(config, Arc::clone(&metrics)).await?;
    let explorer = Explorer::new(Arc::clone(&chain), config.explorer_settings());
    let basket = explorer.underlying_tokens(&index).await?;

    let wallet = Arc::new(SandboxWallet::new(Arc::clone(&chain)).with_metrics(Arc::clone(&metrics)));
    let builder = TransactionBuilder::new(config.contracts.manager.clone(), Arc::clone(&wallet));

    let per_pool = near("1")?;
    let near_amount = near("0.5")?;
    let amounts = vec![U128(per_pool); basket.len()];
    let margin = (2 * basket.len() as u128 + 1) * ONE_YOCTO;
    let deposit = per_pool * basket.len() as u128 + near_amount + margin;
    let swap = builder.swap(&user, &index, &amounts, U128(near_amount), deposit)?;
    builder.send(vec![swap]).await?;

    for report in wallet.take_reports().await {
        for call in report.completion_order() {
            println!(
                "[{:>3}..{:>3}] {:<40} {:<32} {}{}",
                call.started,
                call.finished,
                call.receiver.as_str(),
                call.actions.join(","),
                if call.success { "ok" } else { "FAILED" },
                call.error.as_deref().map(|e| format!(": {e}")).unwrap_or_default(),
            );
        }
        println!("success: {}", report.is_success());
    }

    println!("index {index} holds:");
    for token in &basket {
        let balance = chain.ft_balance(token, &index).await?;
        println!("  {token}: {balance}");
    }
    let wnear = chain.ft_balance(&config.contracts.wnear, &index).await?;
    println!("  {}: {} NEAR", config.contracts.wnear, format_near(wnear, 4));
    Ok(())
}
