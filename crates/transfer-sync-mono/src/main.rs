use anyhow::Result;
use clap::Parser;
use log::info;
use transfer_sync_mono::{run, Args};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger with timestamp
    env_logger::builder().format_timestamp_secs().init();

    let args = Args::parse();
    info!("Starting transfer-sync-mono");
    run(args).await
}
