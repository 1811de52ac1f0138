//! Node configuration file
//!
//! Every section may be omitted; missing keys take their defaults.
//!
//! ```toml
//! [storage]
//! backend = "sled"
//! path = "data/chain"
//!
//! [network]
//! listen = "0.0.0.0:20333"
//! seeds = ["10.0.0.2:20333"]
//!
//! [logging]
//! level = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use strata_core::block_pool::DEFAULT_CAPACITY;
use strata_core::ProcessorConfig;
use strata_mempool::{FeeSchedule, MempoolConfig};
use strata_network::NetworkConfig;
use strata_storage::StorageConfig;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorSection {
    pub polling_interval_ms: u64,
    pub sync_timeout_secs: u64,
    pub block_pool_capacity: usize,
    pub max_blocks_per_request: u32,
}

impl Default for ProcessorSection {
    fn default() -> Self {
        ProcessorSection {
            polling_interval_ms: 100,
            sync_timeout_secs: 30,
            block_pool_capacity: DEFAULT_CAPACITY,
            max_blocks_per_request: 500,
        }
    }
}

impl ProcessorSection {
    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            polling_interval: Duration::from_millis(self.polling_interval_ms),
            sync_timeout: Duration::from_secs(self.sync_timeout_secs),
            max_blocks_per_request: self.max_blocks_per_request,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        LoggingSection {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub storage: StorageConfig,
    pub processor: ProcessorSection,
    pub mempool: MempoolConfig,
    pub fees: FeeSchedule,
    pub network: NetworkConfig,
    pub logging: LoggingSection,
}

impl NodeConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: NodeConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("processor.polling_interval_ms", self.processor.polling_interval_ms),
            ("processor.sync_timeout_secs", self.processor.sync_timeout_secs),
            ("processor.block_pool_capacity", self.processor.block_pool_capacity as u64),
            ("processor.max_blocks_per_request", self.processor.max_blocks_per_request as u64),
            ("mempool.max_size", self.mempool.max_size as u64),
            ("mempool.admission_interval_ms", self.mempool.admission_interval_ms),
            ("mempool.admission_batch", self.mempool.admission_batch as u64),
            ("network.max_frame_bytes", self.network.max_frame_bytes as u64),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    message: "must be greater than zero".to_string(),
                });
            }
        }

        let fees = [
            ("fees.enrollment", self.fees.enrollment),
            ("fees.register", self.fees.register),
            ("fees.issue", self.fees.issue),
            ("fees.publish", self.fees.publish),
        ];
        for (field, value) in fees {
            if value < 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    message: format!("fee {} is negative", value),
                });
            }
        }

        if self.network.max_frame_bytes > u32::MAX as usize {
            return Err(ConfigError::InvalidValue {
                field: "network.max_frame_bytes",
                message: "does not fit a u32 length prefix".to_string(),
            });
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "logging.level",
                message: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}
