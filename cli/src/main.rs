//! govindex: governance indexer for Etherlink / Tezos governance contracts.
//!
//! # Commands
//! ```text
//! govindex backfill [--from-start] [--contract <KT1...>]
//! govindex live
//! govindex run
//! govindex status
//! ```
//!
//! Every global flag can also be set through the environment variable named
//! in `--help`.

mod config;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::sync::watch;
use tracing::{error, info, warn};

use govindex_core::error::IndexerError;
use govindex_core::store::GovernanceStore;
use govindex_indexer::{BatchIndexer, ContractTarget, IndexerContext};
use govindex_live::LiveListener;
use govindex_tzkt::{TzktClient, TzktConfig, DEFAULT_CHAIN_ID};

use crate::config::FileConfig;
use crate::logging::{init_tracing, LogConfig};

#[derive(Parser)]
#[command(
    name = "govindex",
    about = "Index governance contract events from TzKT into a relational store",
    version
)]
struct Cli {
    /// TzKT REST API base URL
    #[arg(long, global = true, env = "TZKT_API_URL", default_value = "https://api.tzkt.io")]
    tzkt_api_url: String,

    /// TzKT events hub (SignalR) URL
    #[arg(long, global = true, env = "TZKT_WS_URL")]
    tzkt_ws_url: Option<String>,

    /// Tezos node RPC base URL, used for on-chain view calls
    #[arg(long, global = true, env = "TEZOS_RPC_URL", default_value = "https://mainnet.tezos.ecadinfra.com")]
    tezos_rpc_url: String,

    /// Chain id passed to on-chain view calls
    #[arg(long, global = true, env = "TEZOS_CHAIN_ID", default_value = DEFAULT_CHAIN_ID)]
    chain_id: String,

    /// Contract exposing the `list_voters` delegation view
    #[arg(long, global = true, env = "DELEGATION_CONTRACT", default_value = "")]
    delegation_contract: String,

    /// `postgres://...`, `sqlite:<path>`, `sqlite::memory:` or `memory`
    #[arg(long, global = true, env = "DATABASE_URL", default_value = "sqlite:govindex.db")]
    database_url: String,

    /// Path to the contracts file (TOML)
    #[arg(long, global = true, env = "GOVINDEX_CONTRACTS", default_value = "contracts.toml")]
    contracts: PathBuf,

    /// Default log level; `RUST_LOG` takes precedence
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index historical periods and operations
    Backfill {
        /// Ignore stored checkpoints and start from each contract's first level
        #[arg(long)]
        from_start: bool,
        /// Only index this contract address
        #[arg(long)]
        contract: Option<String>,
    },
    /// Follow the chain head and index new operations as they land
    Live,
    /// Backfill every contract, then go live
    Run,
    /// Print the stored checkpoint of each tracked contract
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut file = FileConfig::load(&cli.contracts)?;

    let mut log = LogConfig {
        json: cli.log_json || file.log.json,
        ..file.log.clone()
    };
    if let Some(level) = &cli.log_level {
        log.level = level.clone();
    }
    init_tracing(&log);

    if let Some(url) = &cli.tzkt_ws_url {
        file.live.ws_url = url.clone();
    }

    let store = govindex_storage::open_store(&cli.database_url)
        .await
        .with_context(|| format!("opening store {}", cli.database_url))?;

    match &cli.command {
        Commands::Status => status(store.as_ref(), &file.targets(None)?).await,
        Commands::Backfill { from_start, contract } => {
            let ctx = context(&cli, &file, store)?;
            let targets = file.targets(contract.as_deref())?;
            backfill(&ctx, &targets, *from_start, &shutdown_signal()).await
        }
        Commands::Live => {
            let ctx = context(&cli, &file, store)?;
            live(ctx, &file, shutdown_signal()).await
        }
        Commands::Run => {
            let ctx = context(&cli, &file, store)?;
            let shutdown = shutdown_signal();
            backfill(&ctx, &file.targets(None)?, false, &shutdown).await?;
            if *shutdown.borrow() {
                return Ok(());
            }
            live(ctx, &file, shutdown).await
        }
    }
}

fn context(cli: &Cli, file: &FileConfig, store: Arc<dyn GovernanceStore>) -> Result<IndexerContext> {
    if cli.delegation_contract.is_empty() {
        warn!("no delegation contract configured, delegated voting power will not be resolved");
    }
    let client = TzktClient::new(TzktConfig {
        api_url: cli.tzkt_api_url.clone(),
        rpc_url: cli.tezos_rpc_url.clone(),
        chain_id: cli.chain_id.clone(),
        delegation_contract: cli.delegation_contract.clone(),
        request_timeout: Duration::from_secs(30),
        ..TzktConfig::default()
    })
    .context("building TzKT client")?;
    Ok(IndexerContext::new(Arc::new(client), store, file.indexer.clone()))
}

/// Flips to `true` on Ctrl-C.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                let _ = tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

async fn backfill(
    ctx: &IndexerContext,
    targets: &[ContractTarget],
    from_start: bool,
    shutdown: &watch::Receiver<bool>,
) -> Result<()> {
    let indexer = BatchIndexer::new(ctx.clone()).with_shutdown(shutdown.clone());
    let results = indexer.index_all(targets, from_start).await;

    let mut failed = 0;
    let mut interrupted = 0;
    for (address, result) in results {
        match result {
            Ok(report) => println!("{}", serde_json::to_string(&report)?),
            Err(IndexerError::Interrupted) => interrupted += 1,
            Err(e) => {
                failed += 1;
                error!(contract = %address, error = %e, "backfill failed");
            }
        }
    }
    if interrupted > 0 {
        warn!(interrupted, "backfill interrupted, the next run resumes from the stored checkpoint");
    }
    if failed > 0 {
        bail!("{failed} of {} contract(s) failed to backfill", targets.len());
    }
    Ok(())
}

async fn live(ctx: IndexerContext, file: &FileConfig, shutdown: watch::Receiver<bool>) -> Result<()> {
    let targets: Vec<ContractTarget> = file.contracts.iter().filter(|t| t.active).cloned().collect();
    if targets.is_empty() {
        bail!("no active contracts to follow");
    }
    let listener = LiveListener::new(ctx, &targets, file.live.clone())
        .await
        .context("loading tracked contracts")?;
    listener.run(shutdown).await?;
    Ok(())
}

async fn status(store: &dyn GovernanceStore, targets: &[ContractTarget]) -> Result<()> {
    for target in targets {
        let address = target.address.as_str();
        let contract = store.contract(address).await?;
        let last = store.last_processed_period(address).await?;
        let proposals = store.proposals(address).await?.len();
        let promotions = store.promotions(address).await?.len();
        let line = json!({
            "contract": address,
            "track": target.track.as_str(),
            "active": target.active,
            "known": contract.is_some(),
            "last_period": last.as_ref().map(|p| p.contract_voting_index),
            "last_level_start": last.as_ref().map(|p| p.level_start),
            "last_level_end": last.as_ref().map(|p| p.level_end),
            "proposals": proposals,
            "promotions": promotions,
        });
        println!("{line}");
    }
    Ok(())
}
