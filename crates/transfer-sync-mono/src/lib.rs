//! # transfer-sync-mono
//!
//! Command-line front end for the transfer log sync engine. Wires three pieces
//! together for one run:
//!
//! - **Indexing service**: [`HypersyncHttpAdapter`] against the service's JSON API.
//! - **Decoder**: the default [`DynAbiDecoder`] with the bundled ERC-20 ABI or one
//!   loaded from `--abi-path`.
//! - **Storage**: [`RocksDBLogStore`] fed one completed round at a time through a
//!   [`StorageSink`], so an interrupted run leaves only whole rounds behind.
//!
//! ## Modes
//!
//! - default: incremental, re-scanning `--lookback-window` blocks behind the tip
//! - `--sync-all`: full walk from block 0 to the height at start
//! - `--start-block N`: walk from `N` to the tip
//! - `--resume`: walk from the highest block already in the store
//!
//! `--print-checkpoint` prints the store's highest block number and exits.

pub mod adapters;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;

pub use crate::adapters::HypersyncHttpAdapter;
use transfer_sync::{
    AbiText, DynAbiDecoder, StorageAdapter, StorageSink, SyncConfig, SyncHandle, SyncMode,
    SyncResult, TransferSync, DEFAULT_LOOKBACK_WINDOW,
};
use transfer_sync_rocks::RocksDBLogStore;

/// Command-line arguments for `transfer-sync`.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[arg(long, env = "HYPERSYNC_URL", default_value = "https://base.hypersync.xyz")]
    pub url: String,
    #[arg(long, env = "HYPERSYNC_BEARER_TOKEN")]
    pub bearer_token: Option<String>,
    #[arg(long)]
    pub db_path: PathBuf,
    #[arg(long)]
    pub abi_path: Option<PathBuf>,
    #[arg(long)]
    pub sync_all: bool,
    #[arg(long, default_value_t = DEFAULT_LOOKBACK_WINDOW)]
    pub lookback_window: u64,
    #[arg(long, conflicts_with = "sync_all")]
    pub start_block: Option<u64>,
    #[arg(long, conflicts_with_all = ["sync_all", "start_block"])]
    pub resume: bool,
    #[arg(long)]
    pub block_chunk: Option<u64>,
    #[arg(long, default_value_t = 0)]
    pub max_round_retries: u32,
    #[arg(long)]
    pub round_timeout_secs: Option<u64>,
    #[arg(long, default_value_t = 30)]
    pub request_timeout_secs: u64,
    #[arg(long)]
    pub print_checkpoint: bool,
}

/// Pick the sync mode. `--resume` reads the store's checkpoint and starts from it
/// verbatim; an empty store falls back to the mode the other flags select.
pub async fn resolve_mode<S: StorageAdapter>(args: &Args, store: &S) -> SyncResult<SyncMode> {
    if args.resume {
        match store.checkpoint().await? {
            Some(checkpoint) => {
                info!("Resuming from stored checkpoint {}", checkpoint.block_number);
                return Ok(SyncMode::Resume {
                    from_block: checkpoint.block_number,
                });
            }
            None => warn!("--resume given but the store is empty, falling back"),
        }
    }
    Ok(SyncMode::from_options(
        args.sync_all,
        args.lookback_window,
        args.start_block,
    ))
}

pub fn sync_config(args: &Args, mode: SyncMode) -> SyncConfig {
    SyncConfig {
        mode,
        block_chunk: args.block_chunk,
        max_round_retries: args.max_round_retries,
        round_timeout: args.round_timeout_secs.map(Duration::from_secs),
        ..Default::default()
    }
}

/// First Ctrl-C stops the run at the next round boundary, a second one exits.
fn setup_signal_handler(handle: SyncHandle) -> JoinHandle<()> {
    let shutdown_requested = Arc::new(AtomicBool::new(false));
    tokio::spawn(async move {
        loop {
            match signal::ctrl_c().await {
                Ok(()) => {
                    if shutdown_requested.swap(true, Ordering::SeqCst) {
                        warn!("Force exit requested, rounds committed so far are kept");
                        std::process::exit(1);
                    }
                    info!("Shutdown signal received, stopping after the current round");
                    info!("Press Ctrl-C again to force exit");
                    handle.stop();
                }
                Err(err) => {
                    error!("Error setting up signal handler: {}", err);
                    break;
                }
            }
        }
    })
}

/// Main run function
pub async fn run(args: Args) -> Result<()> {
    let mut store = RocksDBLogStore::open(&args.db_path)?;

    if args.print_checkpoint {
        match store.checkpoint().await? {
            Some(checkpoint) => println!("{}", checkpoint.block_number),
            None => println!("none"),
        }
        return Ok(());
    }

    let abi = match &args.abi_path {
        Some(path) => AbiText::load(path)?,
        None => AbiText::erc20(),
    };
    let mode = resolve_mode(&args, &store).await?;
    let service = HypersyncHttpAdapter::new(
        &args.url,
        args.bearer_token.clone(),
        Duration::from_secs(args.request_timeout_secs),
    )?;
    info!("Syncing from {} into {}", service.url(), args.db_path.display());
    info!("System has {} CPU cores available", num_cpus::get());

    let sync = TransferSync::new(service, DynAbiDecoder::new(), abi, sync_config(&args, mode))?;
    let signal_task = setup_signal_handler(sync.handle());

    let mut sink = StorageSink::new(&mut store);
    if let Err(e) = sink.ensure_available().await {
        signal_task.abort();
        return Err(e.into());
    }
    let result = sync.run_with(&mut sink).await;
    signal_task.abort();

    match result {
        Ok(summary) => {
            info!(
                "Run complete ({:?}): {} rounds from block {} to {}, {} logs, {} transactions, {} blocks",
                summary.stop_reason,
                summary.rounds,
                summary.start_block,
                summary.next_block,
                summary.logs,
                summary.transactions,
                summary.blocks
            );
            match summary.checkpoint {
                Some(checkpoint) => info!(
                    "Checkpoint {}, next incremental run starts at {}",
                    checkpoint.block_number,
                    checkpoint.resume_from(args.lookback_window)
                ),
                None => info!("No logs in range, checkpoint unchanged"),
            }
        }
        Err(e) => {
            if let Some(cursor) = e.last_confirmed_cursor() {
                error!("Run aborted, resume with --start-block {}", cursor);
            }
            return Err(e.into());
        }
    }

    let stats = store.get_stats().await?;
    info!(
        "Store holds {} logs ({} decoded), {} transactions, {} blocks, max block {:?}",
        stats.logs, stats.decoded_logs, stats.transactions, stats.blocks, stats.max_block_number
    );
    store.log_db_stats();
    Ok(())
}
