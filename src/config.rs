//! Configuration for creatorclaim-publisher

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::{PipelineConfig, VerificationPolicy};
use crate::session::SessionConfig;
use crate::stream::StreamConfig;

/// Default data directory.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("creatorclaim")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for the mint record ledger
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Public gateway base content is served from
    #[serde(default = "default_gateway_base_url")]
    pub gateway_base_url: String,

    /// Royalty stream WebSocket endpoint
    #[serde(default = "default_royalty_ws_url")]
    pub royalty_ws_url: String,

    /// Largest accepted asset payload in bytes
    #[serde(default = "default_max_asset_bytes")]
    pub max_asset_bytes: u64,

    /// Total funding submission attempts
    #[serde(default = "default_funding_attempts")]
    pub funding_attempts: u32,

    /// Confirmation wait after funding the asset upload, seconds
    #[serde(default = "default_asset_confirmation_secs")]
    pub asset_confirmation_secs: u64,

    /// Confirmation wait after funding the metadata upload, seconds
    #[serde(default = "default_metadata_confirmation_secs")]
    pub metadata_confirmation_secs: u64,

    /// Gateway propagation wait before the metadata probe, seconds
    #[serde(default = "default_propagation_secs")]
    pub propagation_secs: u64,

    /// Upper bound on each pipeline stage's network call, seconds
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,

    /// Whether an unreachable metadata document blocks minting
    #[serde(default)]
    pub verification: VerificationPolicy,

    /// Royalty stream keep-alive interval, seconds
    #[serde(default = "default_ping_secs")]
    pub ping_secs: u64,

    /// Royalty feed capacity
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

fn default_gateway_base_url() -> String {
    "https://arweave.net".to_string()
}

fn default_royalty_ws_url() -> String {
    "ws://localhost:3001".to_string()
}

fn default_max_asset_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_funding_attempts() -> u32 {
    3
}

fn default_asset_confirmation_secs() -> u64 {
    15
}

fn default_metadata_confirmation_secs() -> u64 {
    10
}

fn default_propagation_secs() -> u64 {
    2
}

fn default_stage_timeout_secs() -> u64 {
    60
}

fn default_ping_secs() -> u64 {
    30
}

fn default_feed_capacity() -> usize {
    200
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            gateway_base_url: default_gateway_base_url(),
            royalty_ws_url: default_royalty_ws_url(),
            max_asset_bytes: default_max_asset_bytes(),
            funding_attempts: default_funding_attempts(),
            asset_confirmation_secs: default_asset_confirmation_secs(),
            metadata_confirmation_secs: default_metadata_confirmation_secs(),
            propagation_secs: default_propagation_secs(),
            stage_timeout_secs: default_stage_timeout_secs(),
            verification: VerificationPolicy::default(),
            ping_secs: default_ping_secs(),
            feed_capacity: default_feed_capacity(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Path of the mint record database
    pub fn records_db_path(&self) -> PathBuf {
        self.data_dir.join("mint-records.sled")
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            gateway_base_url: self.gateway_base_url.clone(),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_asset_bytes: self.max_asset_bytes,
            funding_attempts: self.funding_attempts,
            asset_confirmation_wait: Duration::from_secs(self.asset_confirmation_secs),
            metadata_confirmation_wait: Duration::from_secs(self.metadata_confirmation_secs),
            propagation_wait: Duration::from_secs(self.propagation_secs),
            stage_timeout: Duration::from_secs(self.stage_timeout_secs),
            verification: self.verification,
            ..PipelineConfig::default()
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            endpoint: self.royalty_ws_url.clone(),
            ping_interval: Duration::from_secs(self.ping_secs),
            feed_capacity: self.feed_capacity,
            ..StreamConfig::default()
        }
    }
}
