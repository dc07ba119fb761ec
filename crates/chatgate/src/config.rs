use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub sender: SenderConfig,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Ok(serde_saphyr::from_str(&contents)?)
    }
}

/// Resolve a path from the config file. Relative paths are taken relative to
/// the directory holding the config file.
pub fn resolve_path(config_path: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }

    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    config_dir.join(path)
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout() -> u64 {
    60
}

// ============================================================================
// ConnectionConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ConnectionConfig {
    /// Fixed delay between reconnect attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    /// How long to wait for the bridge to acknowledge a send.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_seconds: u64,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

impl ConnectionConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_seconds)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_retry_delay_ms(),
            max_retries: default_max_retries(),
            credentials_path: default_credentials_path(),
            send_timeout_seconds: default_send_timeout(),
            bridge: BridgeConfig::default(),
        }
    }
}

fn default_retry_delay_ms() -> u64 {
    5000
}

fn default_max_retries() -> u32 {
    5
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from(".chatgate/credentials.json")
}

fn default_send_timeout() -> u64 {
    30
}

/// External bridge process wrapping the messaging library.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_bridge_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command: default_bridge_command(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }
}

fn default_bridge_command() -> String {
    "chatgate-bridge".to_string()
}

// ============================================================================
// DedupConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DedupConfig {
    /// Identical messages to the same recipient are blocked for this long.
    #[serde(default = "default_window")]
    pub window_seconds: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl DedupConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    /// Values below one second are raised to one second.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(MIN_SWEEP_INTERVAL_SECONDS))
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

fn default_window() -> u64 {
    30
}

const MIN_SWEEP_INTERVAL_SECONDS: u64 = 1;

fn default_sweep_interval() -> u64 {
    60
}

// ============================================================================
// SenderConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SenderConfig {
    /// Attempts made while waiting for the session to become ready.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_sender_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Appended to bare recipient numbers.
    #[serde(default = "default_domain")]
    pub default_domain: String,
}

impl SenderConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            retry_delay_ms: default_sender_retry_delay_ms(),
            default_domain: default_domain(),
        }
    }
}

fn default_attempts() -> u32 {
    3
}

fn default_sender_retry_delay_ms() -> u64 {
    2000
}

fn default_domain() -> String {
    "s.whatsapp.net".to_string()
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),
}

// ============================================================================
// Tests
// ============================================================================
