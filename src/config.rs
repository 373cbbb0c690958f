//! Configuration module for the market data collector

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{MarketDataError, Result};
use crate::orderbook::PriceValidation;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Instrument to collect (e.g., "FX_BTC_JPY")
    pub product_code: String,

    /// Maintain the board and emit quote summaries
    pub board_enabled: bool,

    /// Coalesce and emit executions
    pub executions_enabled: bool,

    /// How often the aggregator samples the book
    pub sample_interval_ms: u64,

    /// Spacing between quote summaries
    pub summary_interval_ms: u64,

    /// Reject price levels with a negative price instead of storing them
    pub validate_prices: bool,

    /// Sink batching
    pub summary_batch_size: usize,
    pub execution_batch_size: usize,
    pub flush_interval_secs: u64,

    /// Emit the open execution group when shutting down
    pub flush_pending_on_shutdown: bool,

    /// Port for the health and metrics server
    pub health_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            product_code: env::var("PRODUCT_CODE")
                .map(|s| s.trim().to_uppercase())
                .unwrap_or(defaults.product_code),
            board_enabled: env_or("BOARD_ENABLED", defaults.board_enabled)?,
            executions_enabled: env_or("EXECUTIONS_ENABLED", defaults.executions_enabled)?,
            sample_interval_ms: env_or("SAMPLE_INTERVAL_MS", defaults.sample_interval_ms)?,
            summary_interval_ms: env_or("SUMMARY_INTERVAL_MS", defaults.summary_interval_ms)?,
            validate_prices: env_or("VALIDATE_PRICES", defaults.validate_prices)?,
            summary_batch_size: env_or("SUMMARY_BATCH_SIZE", defaults.summary_batch_size)?,
            execution_batch_size: env_or("EXECUTION_BATCH_SIZE", defaults.execution_batch_size)?,
            flush_interval_secs: env_or("FLUSH_INTERVAL_SECS", defaults.flush_interval_secs)?,
            flush_pending_on_shutdown: env_or(
                "FLUSH_PENDING_ON_SHUTDOWN",
                defaults.flush_pending_on_shutdown,
            )?,
            health_port: env_or("HEALTH_PORT", defaults.health_port)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the collector cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.board_enabled && !self.executions_enabled {
            return Err(MarketDataError::ConfigError(
                "Neither board nor executions collection is enabled".to_string(),
            ));
        }
        if self.product_code.is_empty() {
            return Err(MarketDataError::ConfigError(
                "PRODUCT_CODE must not be empty".to_string(),
            ));
        }
        for (name, value) in [
            ("SAMPLE_INTERVAL_MS", self.sample_interval_ms),
            ("SUMMARY_INTERVAL_MS", self.summary_interval_ms),
            ("FLUSH_INTERVAL_SECS", self.flush_interval_secs),
            ("SUMMARY_BATCH_SIZE", self.summary_batch_size as u64),
            ("EXECUTION_BATCH_SIZE", self.execution_batch_size as u64),
        ] {
            if value == 0 {
                return Err(MarketDataError::ConfigError(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn price_validation(&self) -> PriceValidation {
        if self.validate_prices {
            PriceValidation::RejectNegative
        } else {
            PriceValidation::Trusting
        }
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn summary_interval(&self) -> Duration {
        Duration::from_millis(self.summary_interval_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

/// Parse `key` from the environment, falling back to `default` when unset
fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            MarketDataError::ConfigError(format!("Invalid value for {}: {:?}", key, raw))
        }),
        Err(_) => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            product_code: "FX_BTC_JPY".to_string(),
            board_enabled: true,
            executions_enabled: true,
            sample_interval_ms: 200,
            summary_interval_ms: 1000,
            validate_prices: false,
            summary_batch_size: 300,
            execution_batch_size: 1000,
            flush_interval_secs: 5,
            flush_pending_on_shutdown: false,
            health_port: 9090,
        }
    }
}
