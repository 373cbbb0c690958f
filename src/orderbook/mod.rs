//! Order book module
//!
//! Maintains order book state from exchange board snapshots and diffs and
//! periodically summarizes the best quote.

mod aggregator;
mod book;
mod engine;
mod quote;

pub use aggregator::QuoteAggregator;
pub use book::OrderBook;
pub use engine::OrderBookEngine;
pub use quote::{Quote, QuoteSummary};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

/// A single level in the order book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub price: Decimal,
    pub size: Decimal,
}

impl Level {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Whether an update replaces the book or patches it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateKind {
    /// Full replacement: both sides are cleared before the levels are applied
    Snapshot,
    /// Incremental upsert/delete against the existing levels
    Diff,
}

/// Board update as delivered by the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookUpdate {
    pub kind: UpdateKind,
    pub asks: Vec<Level>,
    pub bids: Vec<Level>,
}

impl OrderBookUpdate {
    pub fn snapshot(asks: Vec<Level>, bids: Vec<Level>) -> Self {
        Self {
            kind: UpdateKind::Snapshot,
            asks,
            bids,
        }
    }

    pub fn diff(asks: Vec<Level>, bids: Vec<Level>) -> Self {
        Self {
            kind: UpdateKind::Diff,
            asks,
            bids,
        }
    }
}

/// How incoming level prices are checked before they are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PriceValidation {
    /// The feed is trusted: every price is stored as given
    #[default]
    Trusting,
    /// Entries with a negative price are rejected individually
    RejectNegative,
}
