//! Error types for the market data collector

use rust_decimal::Decimal;
use thiserror::Error;

use crate::orderbook::Side;

/// Market data collector errors
#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Sink '{sink}' failed: {reason}")]
    SinkError { sink: String, reason: String },

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("I/O error: {0}")]
    IoError(String),
}

/// Rejection of a single price level entry.
///
/// Only produced under [`PriceValidation::RejectNegative`](crate::orderbook::PriceValidation);
/// the rejected entry is dropped and the rest of the update is still applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Negative price {price} on {side:?} side")]
    NegativePrice { side: Side, price: Decimal },
}

impl From<serde_json::Error> for MarketDataError {
    fn from(err: serde_json::Error) -> Self {
        MarketDataError::ParseError(err.to_string())
    }
}

impl From<prometheus::Error> for MarketDataError {
    fn from(err: prometheus::Error) -> Self {
        MarketDataError::MetricsError(err.to_string())
    }
}

impl From<std::io::Error> for MarketDataError {
    fn from(err: std::io::Error) -> Self {
        MarketDataError::IoError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MarketDataError>;
