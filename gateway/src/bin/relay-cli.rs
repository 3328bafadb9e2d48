//! Command-line client for the gateway worker.

use std::process::ExitCode;
use std::time::Duration;

use bytes::Bytes;
use clap::{Parser, Subcommand};
use relay_common::protocol::ModelsResponse;
use relay_common::rpc::decode;
use relay_common::{
    methods, workers, Completion, DirectoryError, FileDirectory, HealthReport, HttpTransport,
    InferOptions, InferRequest, PeerAddress, RpcError, RpcTransport, ServiceDirectory,
};
use serde_json::Value;

const INFER_TIMEOUT: Duration = Duration::from_secs(35);
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);
const PING_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Parser)]
#[command(name = "relay-cli", version, about = "AI inference platform CLI")]
struct Cli {
    /// Discovery file shared with the workers.
    #[arg(long, global = true, default_value = "config/discovery.json")]
    discovery: String,

    /// Print the raw JSON response.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Make an inference request
    Infer {
        /// The prompt to send to the model
        prompt: String,

        /// Model to use (the gateway's default when omitted)
        #[arg(short, long)]
        model: Option<String>,

        /// Temperature (0-2)
        #[arg(short, long)]
        temperature: Option<f32>,

        #[arg(long)]
        max_tokens: Option<u32>,

        #[arg(long)]
        top_p: Option<f32>,

        #[arg(long, env = "AI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
    /// List available models
    Models,
    /// Check platform health
    Health,
    /// Ping the gateway
    Ping,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("AI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Failed to discover {worker}: {source}")]
    Discovery {
        worker: &'static str,
        source: DirectoryError,
    },

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("{0}")]
    Rejected(String),
}

struct Client {
    directory: FileDirectory,
    transport: HttpTransport,
}

impl Client {
    async fn gateway(&self) -> Result<PeerAddress, CliError> {
        self.directory
            .resolve(workers::GATEWAY)
            .await
            .map_err(|source| CliError::Discovery {
                worker: workers::GATEWAY,
                source,
            })
    }

    async fn request(
        &self,
        method: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Bytes, CliError> {
        let peer = self.gateway().await?;
        Ok(self
            .transport
            .request(&peer, method, Bytes::from(payload), timeout)
            .await?)
    }

    /// Like `request`, but decodes JSON and turns `{error}` into a failure.
    async fn query(
        &self,
        method: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Value, CliError> {
        let reply = self.request(method, payload, timeout).await?;
        let value: Value = decode(&reply)?;
        if let Some(error) = value.get("error").and_then(Value::as_str) {
            return Err(CliError::Rejected(error.to_string()));
        }
        Ok(value)
    }
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{}", value),
    }
}

fn parse<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, CliError> {
    serde_json::from_value(value).map_err(|e| CliError::Rpc(RpcError::Malformed(e.to_string())))
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let client = Client {
        directory: FileDirectory::new(&cli.discovery),
        transport: HttpTransport::new(),
    };

    match cli.command {
        Command::Infer {
            prompt,
            model,
            temperature,
            max_tokens,
            top_p,
            api_key,
        } => {
            let api_key = api_key.ok_or(CliError::MissingApiKey)?;
            let request = InferRequest {
                api_key: Some(api_key),
                prompt: Some(prompt),
                model,
                options: InferOptions {
                    temperature,
                    max_tokens,
                    top_p,
                },
            };
            let payload = serde_json::to_vec(&request)
                .map_err(|e| CliError::Rpc(RpcError::Malformed(e.to_string())))?;

            let value = client.query(methods::INFER, payload, INFER_TIMEOUT).await?;
            if cli.json {
                print_json(&value);
            } else {
                let completion: Completion = parse(value)?;
                println!("{}", completion.completion);
                if let Some(usage) = completion.usage {
                    println!();
                    println!("Usage: {} tokens", usage.total_tokens);
                }
            }
        }
        Command::Models => {
            let value = client.query(methods::MODELS, Vec::new(), QUERY_TIMEOUT).await?;
            if cli.json {
                print_json(&value);
            } else {
                let models: ModelsResponse = parse(value)?;
                println!("Available models:");
                for model in &models.available {
                    if *model == models.default {
                        println!("  -> {} (default)", model);
                    } else {
                        println!("     {}", model);
                    }
                }
            }
        }
        Command::Health => {
            let value = client.query(methods::HEALTH, Vec::new(), QUERY_TIMEOUT).await?;
            if cli.json {
                print_json(&value);
            } else {
                let health: HealthReport = parse(value)?;
                println!("Status: {}", health.status);
                println!("Auth services: {}", health.auth_peers);
                println!("Inference services: {}", health.inference_peers);
            }
        }
        Command::Ping => {
            let reply = client
                .request(methods::PING, b"cli-test".to_vec(), PING_TIMEOUT)
                .await?;
            println!("Ping successful: {}", String::from_utf8_lossy(&reply));
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    relay_gateway::logging::init_tracing("warn");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
