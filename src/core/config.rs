//! Configuration - Type-safe engine config loaded from TOML

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::{Error, Result};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Fee and maintenance rates, settlement hooks
    #[serde(default)]
    pub risk: RiskConfig,

    /// Account opened at startup
    #[serde(default)]
    pub account: AccountConfig,

    /// Inbound event socket
    #[serde(default)]
    pub feed: FeedConfig,

    /// Local paper matcher
    #[serde(default)]
    pub paper: PaperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Trading fee as a fraction of notional (0.0005 = 0.05%)
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,

    /// Maintenance margin rate used in the liquidation price
    #[serde(default = "default_maintenance_margin_rate")]
    pub maintenance_margin_rate: Decimal,

    /// Close positions whose mark crosses the liquidation price
    #[serde(default)]
    pub force_liquidation: bool,

    /// Release margin and credit realized PnL to the ledger on close
    #[serde(default)]
    pub realize_pnl_on_close: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default = "default_account_id")]
    pub id: String,

    /// Quote currency balances are denominated in
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,

    #[serde(default = "default_initial_balance")]
    pub initial_balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Unix socket carrying JSON-lines ticks, fills and commands
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaperConfig {
    /// Fill orders locally against the price book
    #[serde(default)]
    pub enabled: bool,
}

fn default_fee_rate() -> Decimal {
    Decimal::new(5, 4)
}
fn default_maintenance_margin_rate() -> Decimal {
    Decimal::new(5, 3)
}
fn default_account_id() -> String {
    "paper".to_string()
}
fn default_quote_asset() -> String {
    "USDT".to_string()
}
fn default_initial_balance() -> Decimal {
    Decimal::from(100_000)
}
fn default_socket_path() -> String {
    "/tmp/aleph-margin.sock".to_string()
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            fee_rate: default_fee_rate(),
            maintenance_margin_rate: default_maintenance_margin_rate(),
            force_liquidation: false,
            realize_pnl_on_close: false,
        }
    }
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            id: default_account_id(),
            quote_asset: default_quote_asset(),
            initial_balance: default_initial_balance(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { socket_path: default_socket_path() }
    }
}

impl Config {
    /// Load from TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config {}: {}", path.display(), e)))?;

        Self::parse(&content)
    }

    /// Parse TOML text and validate it
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location (project root config.toml).
    pub fn load_default() -> Self {
        let candidates = [
            "config.toml",
            concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml"),
        ];

        for path in &candidates {
            match Self::load(Path::new(path)) {
                Ok(cfg) => {
                    tracing::info!("Loaded config from {}", path);
                    return cfg;
                }
                Err(e) => tracing::debug!("Skipping {}: {}", path, e),
            }
        }

        tracing::warn!("No config.toml found, using defaults");
        Self::default()
    }

    fn validate(&self) -> Result<()> {
        if self.risk.fee_rate < Decimal::ZERO {
            return Err(Error::Config(format!("fee_rate must not be negative, got {}", self.risk.fee_rate)));
        }
        if self.risk.maintenance_margin_rate < Decimal::ZERO || self.risk.maintenance_margin_rate >= Decimal::ONE {
            return Err(Error::Config(format!(
                "maintenance_margin_rate must be in [0, 1), got {}",
                self.risk.maintenance_margin_rate
            )));
        }
        if self.account.initial_balance < Decimal::ZERO {
            return Err(Error::Config("initial_balance must not be negative".to_string()));
        }
        Ok(())
    }
}
