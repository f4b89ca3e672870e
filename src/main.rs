//! balance_snapshot - command line entry point
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────────┐   ┌──────────┐   ┌──────────┐
//! │  Config  │──▶│ Accounts │──▶│    Engine    │──▶│Assembler │──▶│  Output  │
//! │  (YAML)  │   │  (CSV)   │   │ (fan-out per │   │ (columns)│   │  (CSV)   │
//! └──────────┘   └──────────┘   │   account)   │   └──────────┘   └──────────┘
//!      │                        └──────────────┘
//!      └── date ──▶ BlockResolver ──▶ block
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use balance_snapshot::csv_io::{load_accounts, write_snapshot};
use balance_snapshot::logging::init_logging;
use balance_snapshot::snapshot::{
    AppConfig, BalanceSnapshotEngine, BlockReference, BlockResolver, EthLedgerClient,
    LogProgress, SnapshotAssembler, TokenRegistry,
};

#[derive(Parser, Debug)]
#[command(name = "balance_snapshot", version, about = "Historical native + ERC-20 balance snapshot")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, default_value = "config/snapshot.yaml")]
    config: String,

    /// Snapshot block height (overrides config)
    #[arg(long, conflicts_with = "at")]
    block: Option<u64>,

    /// RFC 3339 timestamp to resolve into a block (overrides config)
    #[arg(long)]
    at: Option<String>,

    /// Accounts CSV (overrides config)
    #[arg(short, long)]
    input: Option<String>,

    /// Output CSV (overrides config)
    #[arg(short, long)]
    output: Option<String>,

    /// Abort the run after this many seconds
    #[arg(long)]
    deadline_secs: Option<u64>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", cli.config, e);
            std::process::exit(2);
        }
    };
    let _log_guard = init_logging(&config.log);

    info!(
        "Starting balance_snapshot {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    if let Err(e) = run(cli, config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    // Credential lives in .env next to the config, as ALCHEMY_API_KEY by default
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let snapshot_cfg = &config.snapshot;
    let registry = TokenRegistry::from_entries(&config.tokens)?;
    // Fail fast on unknown symbols before touching the network
    registry.resolve(snapshot_cfg.tracked.as_slice())?;
    let assembler = match &snapshot_cfg.columns {
        Some(order) => SnapshotAssembler::with_order(
            &snapshot_cfg.native_symbol,
            snapshot_cfg.tracked.as_slice(),
            order.as_slice(),
        )?,
        None => SnapshotAssembler::new(&snapshot_cfg.native_symbol, snapshot_cfg.tracked.as_slice()),
    };

    let input = cli.input.as_deref().unwrap_or(&snapshot_cfg.input);
    let output = cli.output.as_deref().unwrap_or(&snapshot_cfg.output);
    let accounts = load_accounts(input)?;

    let client = EthLedgerClient::from_config(&config.rpc)?;
    let policy = snapshot_cfg.retry.policy();
    let cancel = CancellationToken::new();
    spawn_cancellation(cancel.clone(), cli.deadline_secs);

    let block = match (cli.block, cli.at.as_deref()) {
        (Some(height), _) => BlockReference(height),
        (None, Some(at)) => resolve_block(&client, &policy, &cancel, at).await?,
        (None, None) => match (snapshot_cfg.block, snapshot_cfg.at.as_deref()) {
            (Some(height), _) => BlockReference(height),
            (None, Some(at)) => resolve_block(&client, &policy, &cancel, at).await?,
            (None, None) => anyhow::bail!("Either snapshot.block or snapshot.at must be set"),
        },
    };

    let engine = BalanceSnapshotEngine::new(&client, &registry)
        .with_policy(policy)
        .with_cancellation(cancel)
        .with_native_symbol(&snapshot_cfg.native_symbol)
        .with_native_decimals(snapshot_cfg.native_decimals);
    let mut progress = LogProgress::new(accounts.len(), snapshot_cfg.progress_every);

    let snapshot = engine
        .run(&accounts, snapshot_cfg.tracked.as_slice(), block, &mut progress)
        .await
        .context("Balance snapshot failed")?;

    let table = assembler.assemble(&snapshot)?;
    write_snapshot(output, &table)?;

    info!(
        "Wrote balances for {} addresses at block {} to {}",
        snapshot.len(),
        snapshot.block,
        output
    );
    Ok(())
}

async fn resolve_block(
    client: &EthLedgerClient,
    policy: &balance_snapshot::RetryPolicy,
    cancel: &CancellationToken,
    at: &str,
) -> Result<BlockReference> {
    let block = BlockResolver::new(client, policy.clone(), cancel.clone())
        .resolve_str(at)
        .await
        .with_context(|| format!("Failed to resolve block for {}", at))?;
    Ok(block)
}

/// Cancel on Ctrl-C or when the optional deadline passes.
fn spawn_cancellation(cancel: CancellationToken, deadline_secs: Option<u64>) {
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling snapshot run");
            on_signal.cancel();
        }
    });

    if let Some(secs) = deadline_secs {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!("Deadline of {}s reached, cancelling snapshot run", secs);
            cancel.cancel();
        });
    }
}
