//! Configuration for the payout engine

use crate::scheduler::ScheduleConfig;
use crate::{Error, Result};
use ledger_core::Currency;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Payout engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Ledger data directory
    pub ledger_data_dir: PathBuf,

    /// Minimum available balance for a payout, minor units
    pub min_payout_cents: i64,

    /// Currencies settled by scheduled runs
    pub currencies: Vec<Currency>,

    /// Run schedule
    pub schedule: ScheduleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "payout-engine".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            ledger_data_dir: PathBuf::from("./data/ledger"),
            min_payout_cents: 10_000,
            currencies: vec![Currency::PEN],
            schedule: ScheduleConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| Error::Config(format!("Parse error: {}", e)))
    }

    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("PAYOUT_LEDGER_DATA_DIR") {
            config.ledger_data_dir = PathBuf::from(data_dir);
        }

        if let Ok(min) = std::env::var("PAYOUT_MIN_AMOUNT_CENTS") {
            config.min_payout_cents = min
                .parse()
                .map_err(|e| Error::Config(format!("Invalid PAYOUT_MIN_AMOUNT_CENTS: {}", e)))?;
        }

        if let Ok(currencies) = std::env::var("PAYOUT_CURRENCIES") {
            config.currencies = currencies
                .split(',')
                .map(|code| {
                    Currency::parse(code.trim())
                        .ok_or_else(|| Error::Config(format!("Unknown currency: {}", code)))
                })
                .collect::<Result<Vec<_>>>()?;
        }

        Ok(config)
    }
}
