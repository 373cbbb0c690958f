//! Trade executions
//!
//! Raw execution prints from the feed and the coalesced records produced
//! from them for persistence.

mod coalescer;

pub use coalescer::ExecutionCoalescer;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::schema::{Field, FieldKind, Record};

/// Taker side of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// A single execution print as received
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub side: TradeSide,
    pub price: Decimal,
    pub size: Decimal,
    pub buy_order_ref: String,
    pub sell_order_ref: String,
    /// Receive time minus exchange execution time, in seconds
    pub latency: f64,
    pub received_at: DateTime<Utc>,
}

/// Executions delivered together, in exchange order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionBatch {
    pub items: Vec<Execution>,
}

impl ExecutionBatch {
    pub fn new(items: Vec<Execution>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One or more consecutive prints against the same counter-order.
///
/// `size` is the sum of the merged prints; every other field comes from the
/// first print of the group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoalescedExecution {
    pub id: u64,
    #[serde(rename = "exec_date")]
    pub timestamp: DateTime<Utc>,
    pub side: TradeSide,
    pub price: Decimal,
    pub size: Decimal,
    #[serde(rename = "buy_child_order_acceptance_id")]
    pub buy_order_ref: String,
    #[serde(rename = "sell_child_order_acceptance_id")]
    pub sell_order_ref: String,
    #[serde(rename = "delay")]
    pub latency: f64,
    #[serde(rename = "received_time")]
    pub received_at: DateTime<Utc>,
    #[serde(skip)]
    pub merged_count: u32,
}

impl CoalescedExecution {
    /// Whether `e` is another print of the same matched order at the same price
    pub fn can_merge(&self, e: &Execution) -> bool {
        if e.side != self.side || e.price != self.price {
            return false;
        }
        match e.side {
            TradeSide::Buy => e.buy_order_ref == self.buy_order_ref,
            TradeSide::Sell => e.sell_order_ref == self.sell_order_ref,
        }
    }

    /// Fold another print's size into this record
    pub fn merge(&mut self, e: &Execution) {
        self.size += e.size;
        self.merged_count += 1;
    }
}

impl From<&Execution> for CoalescedExecution {
    fn from(e: &Execution) -> Self {
        Self {
            id: e.id,
            timestamp: e.timestamp,
            side: e.side,
            price: e.price,
            size: e.size,
            buy_order_ref: e.buy_order_ref.clone(),
            sell_order_ref: e.sell_order_ref.clone(),
            latency: e.latency,
            received_at: e.received_at,
            merged_count: 1,
        }
    }
}

impl Record for CoalescedExecution {
    const FIELDS: &'static [Field] = &[
        Field::new("id", FieldKind::Integer),
        Field::new("exec_date", FieldKind::Timestamp),
        Field::new("side", FieldKind::Text),
        Field::new("price", FieldKind::Decimal),
        Field::new("size", FieldKind::Decimal),
        Field::new("buy_child_order_acceptance_id", FieldKind::Text),
        Field::new("sell_child_order_acceptance_id", FieldKind::Text),
        Field::new("delay", FieldKind::Float),
        Field::new("received_time", FieldKind::Timestamp),
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn print(side: TradeSide, price: Decimal, buy: &str, sell: &str) -> Execution {
        Execution {
            id: 1,
            timestamp: Utc::now(),
            side,
            price,
            size: dec!(0.1),
            buy_order_ref: buy.to_string(),
            sell_order_ref: sell.to_string(),
            latency: 0.05,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_merge_matches_on_taker_side_order() {
        let group = CoalescedExecution::from(&print(TradeSide::Buy, dec!(100), "A", "X"));
        // Buy side keys on the buy order; the sell order may differ
        assert!(group.can_merge(&print(TradeSide::Buy, dec!(100), "A", "Y")));
        assert!(!group.can_merge(&print(TradeSide::Buy, dec!(100), "B", "X")));
        assert!(!group.can_merge(&print(TradeSide::Buy, dec!(101), "A", "X")));
        assert!(!group.can_merge(&print(TradeSide::Sell, dec!(100), "A", "X")));

        let group = CoalescedExecution::from(&print(TradeSide::Sell, dec!(100), "A", "X"));
        assert!(group.can_merge(&print(TradeSide::Sell, dec!(100), "B", "X")));
        assert!(!group.can_merge(&print(TradeSide::Sell, dec!(100), "A", "Y")));
    }

    #[test]
    fn test_serialized_keys_follow_field_list() {
        let record = CoalescedExecution::from(&print(TradeSide::Sell, dec!(100), "A", "B"));
        let value = serde_json::to_value(&record).unwrap();
        let object = value.as_object().unwrap();
        for field in CoalescedExecution::FIELDS {
            assert!(object.contains_key(field.name), "missing {}", field.name);
        }
        assert_eq!(object.len(), CoalescedExecution::FIELDS.len());
        assert_eq!(object["side"], "SELL");
    }
}
