use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::NodeError;

/// Complete configuration for an ISAAC validator node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node_id: String,
    pub bind_addr: String,
    pub network_id: String,
    pub validators: Vec<PeerConfig>,

    pub consensus: ConsensusConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    pub address: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub threshold_init_percent: u8,
    pub threshold_sign_percent: u8,
    pub threshold_accept_percent: u8,
    pub threshold_allconfirm_percent: u8,

    pub timeout_init_ms: u64,
    pub timeout_sign_ms: u64,
    pub timeout_accept_ms: u64,
    pub timeout_allconfirm_ms: u64,
    pub block_time_buffer_ms: u64,

    pub max_transactions_per_block: usize,
    pub base_fee: u64,
    pub common_account: String,
    /// Amount of new supply minted into the common account per committed round, via
    /// the proposer transaction's `Inflation` operation. Zero disables minting.
    pub inflation_per_block_gon: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub ready_poll_interval_ms: u64,
    pub max_peers: usize,
}

impl NetworkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub backend: StorageBackend,
    pub max_pool_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageBackend {
    Memory,
    RocksDb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub bind_addr: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogFormat {
    Plain,
    Json,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "node".to_string(),
            bind_addr: "127.0.0.1:8000".to_string(),
            network_id: "isaac-test-network".to_string(),
            validators: Vec::new(),
            consensus: ConsensusConfig::default(),
            network: NetworkConfig::default(),
            storage: StorageConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            threshold_init_percent: 66,
            threshold_sign_percent: 66,
            threshold_accept_percent: 66,
            threshold_allconfirm_percent: 100,
            timeout_init_ms: 2_000,
            timeout_sign_ms: 2_000,
            timeout_accept_ms: 2_000,
            timeout_allconfirm_ms: 2_000,
            block_time_buffer_ms: 200,
            max_transactions_per_block: 1_000,
            base_fee: 10_000,
            common_account: "GCOMMON000000000000000000000000000000000000000000".to_string(),
            inflation_per_block_gon: 0,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
            ready_poll_interval_ms: 5,
            max_peers: 64,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            backend: StorageBackend::RocksDb,
            max_pool_size: 10_000,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: "127.0.0.1:9090".to_string(),
            endpoint: "/metrics".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Plain,
        }
    }
}

impl ConsensusConfig {
    pub fn timeout_init(&self) -> Duration {
        Duration::from_millis(self.timeout_init_ms)
    }
    pub fn timeout_sign(&self) -> Duration {
        Duration::from_millis(self.timeout_sign_ms)
    }
    pub fn timeout_accept(&self) -> Duration {
        Duration::from_millis(self.timeout_accept_ms)
    }
    pub fn timeout_allconfirm(&self) -> Duration {
        Duration::from_millis(self.timeout_allconfirm_ms)
    }
    pub fn block_time_buffer(&self) -> Duration {
        Duration::from_millis(self.block_time_buffer_ms)
    }
}

impl NodeConfig {
    pub fn load_from_file(path: &std::path::Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Configuration(format!("failed to read config file: {}", e)))?;

        if path.extension() == Some(std::ffi::OsStr::new("toml")) {
            toml::from_str(&content)
                .map_err(|e| NodeError::Configuration(format!("failed to parse TOML config: {}", e)))
        } else {
            serde_json::from_str(&content)
                .map_err(|e| NodeError::Configuration(format!("failed to parse JSON config: {}", e)))
        }
    }

    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), NodeError> {
        let content = if path.extension() == Some(std::ffi::OsStr::new("toml")) {
            toml::to_string_pretty(self)
                .map_err(|e| NodeError::Configuration(format!("failed to serialize to TOML: {}", e)))?
        } else {
            serde_json::to_string_pretty(self)
                .map_err(|e| NodeError::Configuration(format!("failed to serialize to JSON: {}", e)))?
        };

        std::fs::write(path, content)
            .map_err(|e| NodeError::Configuration(format!("failed to write config file: {}", e)))
    }

    /// Validate the configuration: this node cannot also appear in its own validator list,
    /// and all four thresholds must be in (0, 100].
    pub fn validate(&self) -> Result<(), NodeError> {
        if self
            .validators
            .iter()
            .any(|p| p.address == self.node_id)
        {
            return Err(NodeError::Configuration(
                "this node's address cannot be in its own validator list".to_string(),
            ));
        }

        let c = &self.consensus;
        for pct in [
            c.threshold_init_percent,
            c.threshold_sign_percent,
            c.threshold_accept_percent,
            c.threshold_allconfirm_percent,
        ] {
            if pct == 0 || pct > 100 {
                return Err(NodeError::Configuration(format!(
                    "threshold percentage out of range: {}",
                    pct
                )));
            }
        }

        Ok(())
    }

    pub fn total_validators(&self) -> usize {
        self.validators.len() + 1
    }

    pub fn timeout_init(&self) -> Duration {
        self.consensus.timeout_init()
    }
    pub fn timeout_sign(&self) -> Duration {
        self.consensus.timeout_sign()
    }
    pub fn timeout_accept(&self) -> Duration {
        self.consensus.timeout_accept()
    }
    pub fn timeout_allconfirm(&self) -> Duration {
        self.consensus.timeout_allconfirm()
    }
    pub fn block_time_buffer(&self) -> Duration {
        self.consensus.block_time_buffer()
    }

    /// Config tuned for fast, deterministic unit tests.
    pub fn default_for_testing() -> Self {
        let mut cfg = Self::default();
        cfg.storage.backend = StorageBackend::Memory;
        cfg.storage.data_dir = PathBuf::from("/tmp/isaac-node-test");
        cfg.consensus.timeout_init_ms = 60 * 60 * 1000;
        cfg.consensus.timeout_sign_ms = 60 * 60 * 1000;
        cfg.consensus.timeout_accept_ms = 60 * 60 * 1000;
        cfg.consensus.timeout_allconfirm_ms = 60 * 60 * 1000;
        cfg.consensus.block_time_buffer_ms = 0;
        cfg
    }
}
