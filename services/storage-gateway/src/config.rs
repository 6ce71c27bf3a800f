//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Credential material never lives in the TOML; the `[accounts]` section
//! only points at the directory of per-account key files.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    pub accounts: AccountsConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub media: MediaConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

/// Remote object-storage provider endpoint
#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    /// "remote" (reqwest against `base_url`) or "memory" (local mode).
    #[serde(default = "default_provider_mode")]
    pub mode: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            mode: default_provider_mode(),
            base_url: default_base_url(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

/// Account pool settings
#[derive(Debug, Deserialize)]
pub struct AccountsConfig {
    /// Directory of per-account JSON credential files.
    pub credential_dir: PathBuf,
    #[serde(default = "default_rpm")]
    pub requests_per_minute: u32,
    #[serde(default = "default_block_threshold")]
    pub block_threshold: u32,
    #[serde(default = "default_block_cooldown")]
    pub block_cooldown_secs: u64,
    #[serde(default = "default_rate_window")]
    pub rate_window_secs: u64,
    #[serde(default = "default_true")]
    pub enforce_rate_window: bool,
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_secs: u64,
}

/// Ingestion pipeline settings
#[derive(Debug, Deserialize)]
pub struct UploadConfig {
    /// Payloads above this go through a chunked session.
    #[serde(default = "default_chunk_threshold")]
    pub chunk_threshold: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Minimum interval between progress reports.
    #[serde(default = "default_progress_interval")]
    pub progress_interval_ms: u64,
    #[serde(default = "default_thumbnail_offset")]
    pub thumbnail_offset_secs: f64,
    /// Extra transfer attempts on fresh accounts after a failure; 0 means
    /// single-shot.
    #[serde(default)]
    pub transfer_retry_attempts: u32,
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_threshold: default_chunk_threshold(),
            chunk_size: default_chunk_size(),
            progress_interval_ms: default_progress_interval(),
            thumbnail_offset_secs: default_thumbnail_offset(),
            transfer_retry_attempts: 0,
            temp_dir: default_temp_dir(),
        }
    }
}

/// Streaming pipeline settings
#[derive(Debug, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Byte window per HLS placeholder segment.
    #[serde(default = "default_segment_size")]
    pub segment_size: u64,
    /// Serve reads through any account instead of the owning one.
    #[serde(default)]
    pub cross_account_read: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            segment_size: default_segment_size(),
            cross_account_read: false,
        }
    }
}

/// Media tool paths
#[derive(Debug, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: PathBuf,
    #[serde(default = "default_ffprobe")]
    pub ffprobe_path: PathBuf,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg(),
            ffprobe_path: default_ffprobe(),
        }
    }
}

fn default_max_connections() -> usize {
    1000
}

fn default_drain_timeout() -> u64 {
    10
}

fn default_provider_mode() -> String {
    "remote".to_string()
}

fn default_base_url() -> String {
    "https://storage.internal".to_string()
}

fn default_provider_timeout() -> u64 {
    120
}

fn default_rpm() -> u32 {
    100
}

fn default_block_threshold() -> u32 {
    5
}

fn default_block_cooldown() -> u64 {
    3600
}

fn default_rate_window() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_maintenance_interval() -> u64 {
    60
}

fn default_chunk_threshold() -> u64 {
    5 * 1024 * 1024
}

fn default_chunk_size() -> usize {
    256 * 1024
}

fn default_progress_interval() -> u64 {
    500
}

fn default_thumbnail_offset() -> f64 {
    5.0
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("storage-gateway")
}

fn default_buffer_size() -> usize {
    64 * 1024
}

fn default_segment_size() -> u64 {
    1024 * 1024
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;

        match config.provider.mode.as_str() {
            "remote" => {
                if !config.provider.base_url.starts_with("http://")
                    && !config.provider.base_url.starts_with("https://")
                {
                    return Err(common::Error::Config(format!(
                        "provider.base_url must start with http:// or https://, got: {}",
                        config.provider.base_url
                    )));
                }
            }
            "memory" => {}
            other => {
                return Err(common::Error::Config(format!(
                    "provider.mode must be \"remote\" or \"memory\", got: {other}"
                )));
            }
        }

        if config.provider.timeout_secs == 0 {
            return Err(common::Error::Config(
                "provider.timeout_secs must be greater than 0".into(),
            ));
        }
        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "server.max_connections must be greater than 0".into(),
            ));
        }
        if config.accounts.block_threshold == 0 {
            return Err(common::Error::Config(
                "accounts.block_threshold must be greater than 0".into(),
            ));
        }
        if config.upload.chunk_size == 0 {
            return Err(common::Error::Config(
                "upload.chunk_size must be greater than 0".into(),
            ));
        }
        if config.stream.buffer_size == 0 {
            return Err(common::Error::Config(
                "stream.buffer_size must be greater than 0".into(),
            ));
        }
        if config.stream.segment_size == 0 {
            return Err(common::Error::Config(
                "stream.segment_size must be greater than 0".into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("storage-gateway.toml")
    }

    /// Pool tuning derived from the `[accounts]` section.
    pub fn pool_config(&self) -> account_pool::PoolConfig {
        account_pool::PoolConfig {
            block_threshold: self.accounts.block_threshold,
            block_cooldown: Duration::from_secs(self.accounts.block_cooldown_secs),
            rate_window: Duration::from_secs(self.accounts.rate_window_secs),
            enforce_rate_window: self.accounts.enforce_rate_window,
        }
    }

    /// Account defaults derived from the `[accounts]` section.
    pub fn account_defaults(&self) -> account_pool::AccountDefaults {
        account_pool::AccountDefaults {
            requests_per_minute: self.accounts.requests_per_minute,
            ..account_pool::AccountDefaults::default()
        }
    }
}
