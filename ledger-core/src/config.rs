//! Configuration for the ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Maturity (hold window) configuration
    pub maturity: MaturityConfig,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/ledger"),
            service_name: "ledger-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            maturity: MaturityConfig::default(),
            rocksdb: RocksDbConfig::default(),
        }
    }
}

/// Maturity (hold window) configuration, in whole days per entry type.
///
/// Only categories that hold funds need a value; everything else matures
/// immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaturityConfig {
    /// Hold window for sale postings, in days
    pub sale_hold_days: i64,

    /// Hold window for commission postings, in days
    pub commission_hold_days: i64,

    /// Hold window for refund postings, in days
    pub refund_hold_days: i64,
}

impl Default for MaturityConfig {
    fn default() -> Self {
        Self {
            sale_hold_days: 7, // card-network chargeback window
            commission_hold_days: 0,
            refund_hold_days: 0,
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            target_file_size_mb: 64,
            max_background_jobs: 4,
            enable_statistics: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(days) = std::env::var("LEDGER_SALE_HOLD_DAYS") {
            config.maturity.sale_hold_days = days
                .parse()
                .map_err(|_| crate::Error::Config(format!("Invalid hold days: {}", days)))?;
        }

        Ok(config)
    }
}
