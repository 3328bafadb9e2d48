//! Configuration for the inference worker.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

/// Main configuration structure for the inference worker.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// RPC listener.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// 0 lets the OS pick a port; the chosen one is what gets registered.
    #[serde(default)]
    pub port: u16,
    /// Host peers should dial; registered in the directory.
    #[serde(default = "default_advertise_host")]
    pub advertise_host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
            advertise_host: default_advertise_host(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_discovery_path")]
    pub path: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            path: default_discovery_path(),
        }
    }
}

/// OpenAI-compatible provider settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_url")]
    pub base_url: String,
    /// Falls back to `OPENAI_API_KEY` when unset.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_url(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            default_max_tokens: default_max_tokens(),
            default_temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_advertise_host() -> String {
    "127.0.0.1".to_string()
}
fn default_discovery_path() -> String {
    "config/discovery.json".to_string()
}
fn default_openai_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_tokens() -> u32 {
    150
}
fn default_temperature() -> f32 {
    0.7
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (INFERENCE__SECTION__KEY format)
    /// 2. The given file, or config.toml (if present)
    /// 3. Built-in defaults
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name(path.unwrap_or("config")).required(path.is_some()))
            .add_source(
                Environment::with_prefix("INFERENCE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = config.try_deserialize()?;
        if config.openai.api_key.is_none() {
            config.openai.api_key = std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.is_empty());
        }
        Ok(config)
    }
}
