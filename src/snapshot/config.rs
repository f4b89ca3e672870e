use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use super::amount::NATIVE_DECIMALS;
use super::error::SnapshotError;
use super::retry::RetryPolicy;

/// Top-level configuration file
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub log: LogConfig,
    pub rpc: RpcConfig,
    pub snapshot: SnapshotConfig,
    pub tokens: BTreeMap<String, TokenEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "balance_snapshot.log".to_string(),
            use_json: false,
            rotation: "never".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RpcConfig {
    /// Endpoint URL; `{api_key}` is replaced with the credential.
    pub url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_key_env() -> String {
    "ALCHEMY_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl RpcConfig {
    /// Substitute the credential into the URL template.
    pub fn endpoint(&self, api_key: Option<&str>) -> Result<String, SnapshotError> {
        if !self.url.contains("{api_key}") {
            return Ok(self.url.clone());
        }
        match api_key {
            Some(key) if !key.trim().is_empty() => Ok(self.url.replace("{api_key}", key.trim())),
            _ => Err(SnapshotError::Configuration(format!(
                "RPC url needs a credential but {} is not set",
                self.api_key_env
            ))),
        }
    }

    /// Read the credential from the environment (after `.env` is loaded).
    pub fn endpoint_from_env(&self) -> Result<String, SnapshotError> {
        let key = std::env::var(&self.api_key_env).ok();
        self.endpoint(key.as_deref())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SnapshotConfig {
    pub input: String,
    pub output: String,
    /// RFC 3339 timestamp to resolve into a block
    #[serde(default)]
    pub at: Option<String>,
    /// Explicit block height; wins over `at`
    #[serde(default)]
    pub block: Option<u64>,
    pub tracked: Vec<String>,
    /// Output column order; defaults to native first, then `tracked`
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default = "default_native_symbol")]
    pub native_symbol: String,
    #[serde(default = "default_native_decimals")]
    pub native_decimals: u32,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
}

fn default_native_symbol() -> String {
    "ETH".to_string()
}

fn default_native_decimals() -> u32 {
    NATIVE_DECIMALS
}

fn default_progress_every() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: u32,
    /// `null` keeps retrying forever
    pub max_attempts: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            multiplier: policy.multiplier,
            max_attempts: policy.max_attempts,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.multiplier,
            self.max_attempts,
        )
    }
}

/// One row of the token table
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenEntry {
    pub address: String,
    pub decimals: u32,
}

impl AppConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: &str) -> Result<Self, SnapshotError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, SnapshotError> {
        serde_yaml::from_str(content).map_err(|e| SnapshotError::Configuration(e.to_string()))
    }
}
