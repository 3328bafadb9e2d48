//! Configuration for the gateway, auth and web workers.

use std::time::Duration;

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener settings, shared by every role.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// 0 lets the OS pick; the bound port is what gets registered.
    #[serde(default)]
    pub port: u16,
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

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
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

/// Deadlines for calls to peer workers.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_auth_ms")]
    pub auth_ms: u64,
    #[serde(default = "default_inference_ms")]
    pub inference_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            auth_ms: default_auth_ms(),
            inference_ms: default_inference_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn auth(&self) -> Duration {
        Duration::from_millis(self.auth_ms)
    }

    pub fn inference(&self) -> Duration {
        Duration::from_millis(self.inference_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Applied to accounts without their own quota.
    #[serde(default = "default_max_requests_per_minute")]
    pub default_max_requests_per_minute: u32,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// How often idle rate-limit windows are evicted.
    #[serde(default = "default_idle_sweep_secs")]
    pub idle_sweep_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            default_max_requests_per_minute: default_max_requests_per_minute(),
            history_capacity: default_history_capacity(),
            idle_sweep_secs: default_idle_sweep_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_model")]
    pub default: String,
    #[serde(default = "default_available_models")]
    pub available: Vec<String>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default: default_model(),
            available: default_available_models(),
        }
    }
}

/// Credential storage. Without a URL accounts live in memory.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
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
fn default_auth_ms() -> u64 {
    5_000
}
fn default_inference_ms() -> u64 {
    30_000
}
fn default_max_requests_per_minute() -> u32 {
    10
}
fn default_history_capacity() -> usize {
    100
}
fn default_idle_sweep_secs() -> u64 {
    300
}
fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_available_models() -> Vec<String> {
    vec![
        "gpt-3.5-turbo".to_string(),
        "gpt-4".to_string(),
        "gpt-4o-mini".to_string(),
    ]
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (RELAY__SECTION__KEY format)
    /// 2. The given file, or config.toml (if present)
    /// 3. Built-in defaults
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name(path.unwrap_or("config")).required(path.is_some()))
            .add_source(
                Environment::with_prefix("RELAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
