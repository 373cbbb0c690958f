//! Core order book implementation
//!
//! Uses BTreeMap so each side's price order is maintained on every mutation:
//! asks ascending, bids descending (via `Reverse`).

use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use super::{Level, OrderBookUpdate, PriceValidation, Quote, Side, UpdateKind};
use crate::error::ValidationError;

/// Order book for a single instrument
#[derive(Debug, Default)]
pub struct OrderBook {
    /// Bids sorted by price descending (highest first)
    bids: BTreeMap<Reverse<Decimal>, Decimal>,
    /// Asks sorted by price ascending (lowest first)
    asks: BTreeMap<Decimal, Decimal>,
    validation: PriceValidation,
}

impl OrderBook {
    /// Create a new empty order book
    pub fn new(validation: PriceValidation) -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            validation,
        }
    }

    /// Drop every level on both sides
    pub fn reset(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    /// Apply a board update.
    ///
    /// A snapshot clears the book first so that levels from before a resync
    /// cannot survive. Asks are applied before bids.
    pub fn apply(&mut self, update: &OrderBookUpdate) -> Vec<ValidationError> {
        if update.kind == UpdateKind::Snapshot {
            self.reset();
        }

        let mut rejected = self.apply_levels(Side::Ask, &update.asks);
        rejected.extend(self.apply_levels(Side::Bid, &update.bids));
        rejected
    }

    /// Upsert or delete levels on one side.
    ///
    /// A positive size inserts or overwrites the level; a size of zero or
    /// less removes it (no-op when absent). Returns the entries rejected by
    /// the validation policy; all other entries are applied.
    pub fn apply_levels(&mut self, side: Side, levels: &[Level]) -> Vec<ValidationError> {
        let mut rejected = Vec::new();

        for level in levels {
            if let Err(e) = self.validate(side, level) {
                rejected.push(e);
                continue;
            }
            self.update_side(side, level);
        }

        rejected
    }

    fn validate(&self, side: Side, level: &Level) -> Result<(), ValidationError> {
        match self.validation {
            PriceValidation::RejectNegative if level.price < Decimal::ZERO => {
                Err(ValidationError::NegativePrice {
                    side,
                    price: level.price,
                })
            }
            _ => Ok(()),
        }
    }

    /// Update a single price level
    fn update_side(&mut self, side: Side, level: &Level) {
        match side {
            Side::Bid => {
                if level.size > Decimal::ZERO {
                    self.bids.insert(Reverse(level.price), level.size);
                } else {
                    self.bids.remove(&Reverse(level.price));
                }
            }
            Side::Ask => {
                if level.size > Decimal::ZERO {
                    self.asks.insert(level.price, level.size);
                } else {
                    self.asks.remove(&level.price);
                }
            }
        }
    }

    /// Get best bid price
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first_key_value().map(|(Reverse(p), _)| *p)
    }

    /// Get best ask price
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first_key_value().map(|(p, _)| *p)
    }

    /// Size resting at the best bid
    pub fn best_bid_size(&self) -> Option<Decimal> {
        self.bids.first_key_value().map(|(_, s)| *s)
    }

    /// Size resting at the best ask
    pub fn best_ask_size(&self) -> Option<Decimal> {
        self.asks.first_key_value().map(|(_, s)| *s)
    }

    /// Best ask minus best bid, negative when the book is crossed
    pub fn spread(&self) -> Option<Decimal> {
        self.quote().spread()
    }

    /// Best bid plus half the spread, rounded half-up to a whole price unit
    pub fn mid_price(&self) -> Option<Decimal> {
        self.quote().mid_price()
    }

    /// Best levels of both sides
    pub fn quote(&self) -> Quote {
        Quote {
            best_ask: self
                .asks
                .first_key_value()
                .map(|(p, s)| Level::new(*p, *s)),
            best_bid: self
                .bids
                .first_key_value()
                .map(|(Reverse(p), s)| Level::new(*p, *s)),
        }
    }

    /// Ask prices, lowest first
    pub fn ask_prices(&self) -> impl Iterator<Item = Decimal> + '_ {
        self.asks.keys().copied()
    }

    /// Bid prices, highest first
    pub fn bid_prices(&self) -> impl Iterator<Item = Decimal> + '_ {
        self.bids.keys().map(|Reverse(p)| *p)
    }

    /// Size at a given price, if the level exists
    pub fn size_at(&self, side: Side, price: Decimal) -> Option<Decimal> {
        match side {
            Side::Bid => self.bids.get(&Reverse(price)).copied(),
            Side::Ask => self.asks.get(&price).copied(),
        }
    }

    /// Number of levels as (asks, bids)
    pub fn depth(&self) -> (usize, usize) {
        (self.asks.len(), self.bids.len())
    }

    pub fn is_empty(&self) -> bool {
        self.asks.is_empty() && self.bids.is_empty()
    }
}
