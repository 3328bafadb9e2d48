//! Inference worker binary.

use std::sync::Arc;

use clap::Parser;
use relay_common::signal::shutdown_signal;
use relay_common::{FileDirectory, ServiceDirectory};
use relay_inference::config::Config;
use relay_inference::{OpenAiBackend, RunningInferenceWorker};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "relay-inference", version, about = "Relay inference worker")]
struct Args {
    /// Configuration file (defaults to ./config.toml when present)
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref())
        .map_err(|e| format!("Failed to load configuration: {}", e))?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting relay-inference {}", env!("CARGO_PKG_VERSION"));

    let directory: Arc<dyn ServiceDirectory> =
        Arc::new(FileDirectory::new(&config.discovery.path));
    let backend = Arc::new(OpenAiBackend::new(&config.openai));

    let worker = RunningInferenceWorker::open(&config.server, backend, directory).await?;

    shutdown_signal().await;
    worker.close().await?;

    Ok(())
}
