use std::sync::Arc;

use clap::Parser;
use relay_common::signal::shutdown_signal;
use relay_common::{FileDirectory, HttpTransport};
use relay_gateway::lifecycle::{Role, RunningWorker};
use relay_gateway::logging::init_tracing;
use relay_gateway::Config;

#[derive(Debug, Parser)]
#[command(name = "relay-worker", about = "Run one relay worker role")]
struct Args {
    /// Role to run.
    #[arg(long, value_enum)]
    wtype: Role,

    /// Configuration file (defaults to ./config.toml when present).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(args.config.as_deref())?;

    // Initialize tracing
    init_tracing(&config.logging.level);

    tracing::info!(role = %args.wtype, "Starting relay worker");

    let directory = Arc::new(FileDirectory::new(&config.discovery.path));
    let transport = Arc::new(HttpTransport::new());

    let worker = RunningWorker::open(&config, args.wtype, directory, transport).await?;

    shutdown_signal().await;

    worker.close().await?;
    Ok(())
}
