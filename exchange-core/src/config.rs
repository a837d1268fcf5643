//! Configuration for the exchange core

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Exchange configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the tab-separated record files
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Pool economics and trading guardrails
    pub market: MarketConfig,

    /// Deposit claim bounds
    pub deposit: DepositConfig,

    /// Single-writer actor settings
    pub writer: WriterConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            service_name: "exchange-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            market: MarketConfig::default(),
            deposit: DepositConfig::default(),
            writer: WriterConfig::default(),
        }
    }
}

/// Market configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Minimum admissible INR per MRX
    pub price_floor: Decimal,

    /// Tax charged on buy orders (fraction of the order)
    pub tax_rate: Decimal,

    /// Largest single buy order (INR)
    pub max_single_order: Decimal,

    /// Cumulative buy notional per user per calendar day (INR)
    pub daily_trading_limit: Decimal,

    /// INR reserve the pool must keep after any withdrawal
    pub min_inr_pool: Decimal,

    /// Largest share of the MRX reserve a single buy may take
    pub max_drain_ratio: Decimal,

    /// INR reserve used when the market file is empty
    pub initial_inr_reserve: Decimal,

    /// MRX reserve used when the market file is empty
    pub initial_mrx_reserve: Decimal,

    /// Offset of the trading calendar day from UTC (minutes)
    pub utc_offset_minutes: i32,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            price_floor: Decimal::ONE,
            tax_rate: Decimal::new(5, 2),                 // 5%
            max_single_order: Decimal::new(100000, 2),    // ₹1,000.00
            daily_trading_limit: Decimal::new(1000000, 2), // ₹10,000.00
            min_inr_pool: Decimal::new(100000, 2),        // ₹1,000.00
            max_drain_ratio: Decimal::new(95, 2),
            initial_inr_reserve: Decimal::new(200000, 2), // ₹2,000.00
            initial_mrx_reserve: Decimal::new(1000000000, 6), // 1000 MRX
            utc_offset_minutes: 330,                      // IST
        }
    }
}

/// Deposit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositConfig {
    /// Smallest claim accepted (INR)
    pub min_amount: Decimal,

    /// Largest claim accepted (INR)
    pub max_amount: Decimal,

    /// Minimum length of the external payment reference
    pub min_reference_len: usize,
}

impl Default for DepositConfig {
    fn default() -> Self {
        Self {
            min_amount: Decimal::from(500),
            max_amount: Decimal::from(100_000),
            min_reference_len: 5,
        }
    }
}

/// Writer actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Bounded mailbox size
    pub mailbox_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1024,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("EXCHANGE_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        let overrides = [
            ("EXCHANGE_PRICE_FLOOR", &mut config.market.price_floor),
            ("EXCHANGE_TAX_RATE", &mut config.market.tax_rate),
            ("EXCHANGE_MAX_SINGLE_ORDER", &mut config.market.max_single_order),
            ("EXCHANGE_DAILY_LIMIT", &mut config.market.daily_trading_limit),
            ("EXCHANGE_MIN_INR_POOL", &mut config.market.min_inr_pool),
        ];
        for (var, slot) in overrides {
            if let Ok(raw) = std::env::var(var) {
                *slot = Decimal::from_str(raw.trim())
                    .map_err(|e| crate::Error::Config(format!("{}: {}", var, e)))?;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the guardrails meaningless
    pub fn validate(&self) -> crate::Result<()> {
        let m = &self.market;
        if m.price_floor <= Decimal::ZERO {
            return Err(crate::Error::Config("price_floor must be positive".into()));
        }
        if m.tax_rate < Decimal::ZERO || m.tax_rate >= Decimal::ONE {
            return Err(crate::Error::Config("tax_rate must be in [0, 1)".into()));
        }
        if m.max_drain_ratio <= Decimal::ZERO || m.max_drain_ratio > Decimal::ONE {
            return Err(crate::Error::Config("max_drain_ratio must be in (0, 1]".into()));
        }
        if m.max_single_order <= Decimal::ZERO || m.daily_trading_limit <= Decimal::ZERO {
            return Err(crate::Error::Config("order limits must be positive".into()));
        }
        if m.initial_mrx_reserve > Decimal::ZERO
            && m.initial_inr_reserve / m.initial_mrx_reserve < m.price_floor
        {
            return Err(crate::Error::Config(
                "initial pool is already below the price floor".into(),
            ));
        }
        if self.deposit.min_amount > self.deposit.max_amount {
            return Err(crate::Error::Config("deposit bounds are inverted".into()));
        }
        Ok(())
    }
}
