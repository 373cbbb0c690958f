//! Best-quote view of the book and the periodic summary record derived from it

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Level;
use crate::schema::{Field, FieldKind, Record};

/// Best levels of both sides, read under a single lock acquisition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub best_ask: Option<Level>,
    pub best_bid: Option<Level>,
}

impl Quote {
    /// Best ask minus best bid.
    ///
    /// Negative when the book is crossed; the value is passed through as is.
    /// `None` if either side is missing or the difference overflows.
    pub fn spread(&self) -> Option<Decimal> {
        match (&self.best_ask, &self.best_bid) {
            (Some(ask), Some(bid)) => ask.price.checked_sub(bid.price),
            _ => None,
        }
    }

    /// Best bid plus half the spread rounded half-up, i.e. `floor(x + 0.5)`.
    pub fn mid_price(&self) -> Option<Decimal> {
        let bid = self.best_bid.as_ref()?.price;
        let half = self.spread()? / Decimal::from(2);
        let offset = half.checked_add(Decimal::new(5, 1))?.floor();
        bid.checked_add(offset)
    }

    /// Both sides present with strictly positive prices
    pub fn is_summarizable(&self) -> bool {
        matches!(
            (&self.best_ask, &self.best_bid),
            (Some(ask), Some(bid)) if ask.price > Decimal::ZERO && bid.price > Decimal::ZERO
        )
    }
}

/// Time-stamped best-quote summary handed to the summary sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSummary {
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,
    pub mid_price: i64,
    #[serde(rename = "best_ask_price")]
    pub best_ask: i64,
    pub best_ask_size: Decimal,
    #[serde(rename = "best_bid_price")]
    pub best_bid: i64,
    pub best_bid_size: Decimal,
    pub spread: i64,
}

impl QuoteSummary {
    /// Build a summary stamped with `timestamp`.
    ///
    /// Returns `None` when either side is missing or not strictly positive,
    /// or when a price does not fit an `i64`. Prices truncate toward zero.
    pub fn from_quote(quote: &Quote, timestamp: DateTime<Utc>) -> Option<Self> {
        if !quote.is_summarizable() {
            return None;
        }
        let ask = quote.best_ask.as_ref()?;
        let bid = quote.best_bid.as_ref()?;

        Some(Self {
            timestamp,
            mid_price: to_whole(quote.mid_price()?)?,
            best_ask: to_whole(ask.price)?,
            best_ask_size: ask.size,
            best_bid: to_whole(bid.price)?,
            best_bid_size: bid.size,
            spread: to_whole(quote.spread()?)?,
        })
    }
}

fn to_whole(value: Decimal) -> Option<i64> {
    value.trunc().to_i64()
}

impl Record for QuoteSummary {
    const FIELDS: &'static [Field] = &[
        Field::new("time", FieldKind::Timestamp),
        Field::new("mid_price", FieldKind::Integer),
        Field::new("best_ask_price", FieldKind::Integer),
        Field::new("best_ask_size", FieldKind::Decimal),
        Field::new("best_bid_price", FieldKind::Integer),
        Field::new("best_bid_size", FieldKind::Decimal),
        Field::new("spread", FieldKind::Integer),
    ];
}
