//! Parser module for exchange realtime channel messages
//!
//! The feed wraps every payload in a JSON-RPC 2.0 `channelMessage`
//! notification; the channel name tells board snapshots, board diffs and
//! executions apart.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;
use tracing::debug;

use crate::error::Result;
use crate::executions::{Execution, ExecutionBatch, TradeSide};
use crate::orderbook::{Level, OrderBookUpdate, UpdateKind};

const BOARD_SNAPSHOT_PREFIX: &str = "lightning_board_snapshot_";
const BOARD_PREFIX: &str = "lightning_board_";
const EXECUTIONS_PREFIX: &str = "lightning_executions_";

/// JSON-RPC envelope
#[derive(Debug, Clone, Deserialize)]
struct RpcMessage {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<ChannelParams>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChannelParams {
    channel: String,
    message: serde_json::Value,
}

/// Board payload (snapshot or diff)
#[derive(Debug, Clone, Deserialize)]
struct BoardMessage {
    #[serde(default)]
    bids: Vec<RawLevel>,
    #[serde(default)]
    asks: Vec<RawLevel>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawLevel {
    #[serde(deserialize_with = "deserialize_decimal")]
    price: Decimal,
    #[serde(deserialize_with = "deserialize_decimal")]
    size: Decimal,
}

/// One execution print
#[derive(Debug, Clone, Deserialize)]
struct RawExecution {
    id: u64,
    side: String,
    #[serde(deserialize_with = "deserialize_decimal")]
    price: Decimal,
    #[serde(deserialize_with = "deserialize_decimal")]
    size: Decimal,
    exec_date: DateTime<Utc>,
    buy_child_order_acceptance_id: String,
    sell_child_order_acceptance_id: String,
}

/// Parsed feed message
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedMessage {
    Board(OrderBookUpdate),
    Executions(ExecutionBatch),
    Unknown(String),
}

/// Decodes the channels of one product
#[derive(Debug, Clone)]
pub struct FeedParser {
    product_code: String,
}

impl FeedParser {
    pub fn new(product_code: &str) -> Self {
        Self {
            product_code: product_code.to_string(),
        }
    }

    /// Channel names to subscribe to for this product
    pub fn channels(&self) -> [String; 3] {
        [
            format!("{}{}", BOARD_SNAPSHOT_PREFIX, self.product_code),
            format!("{}{}", BOARD_PREFIX, self.product_code),
            format!("{}{}", EXECUTIONS_PREFIX, self.product_code),
        ]
    }

    /// Parse a raw message received at `received_at`.
    ///
    /// Subscription acknowledgements, other methods and other products'
    /// channels come back as `Unknown`; malformed payloads on a known
    /// channel are errors.
    pub fn parse(&self, raw: &str, received_at: DateTime<Utc>) -> Result<ParsedMessage> {
        let rpc: RpcMessage = serde_json::from_str(raw)?;

        let params = match (rpc.method.as_deref(), rpc.params) {
            (Some("channelMessage"), Some(params)) => params,
            _ => return Ok(ParsedMessage::Unknown(raw.to_string())),
        };

        let channel = params.channel.as_str();
        if let Some(product) = channel.strip_prefix(BOARD_SNAPSHOT_PREFIX) {
            if product == self.product_code {
                return Self::parse_board(params.message, UpdateKind::Snapshot);
            }
        } else if let Some(product) = channel.strip_prefix(EXECUTIONS_PREFIX) {
            if product == self.product_code {
                return Self::parse_executions(params.message, received_at);
            }
        } else if let Some(product) = channel.strip_prefix(BOARD_PREFIX) {
            if product == self.product_code {
                return Self::parse_board(params.message, UpdateKind::Diff);
            }
        }

        Ok(ParsedMessage::Unknown(params.channel))
    }

    fn parse_board(message: serde_json::Value, kind: UpdateKind) -> Result<ParsedMessage> {
        let board: BoardMessage = serde_json::from_value(message)?;
        let to_levels = |raw: Vec<RawLevel>| -> Vec<Level> {
            raw.into_iter()
                .map(|l| Level::new(l.price, l.size))
                .collect()
        };

        Ok(ParsedMessage::Board(OrderBookUpdate {
            kind,
            asks: to_levels(board.asks),
            bids: to_levels(board.bids),
        }))
    }

    fn parse_executions(
        message: serde_json::Value,
        received_at: DateTime<Utc>,
    ) -> Result<ParsedMessage> {
        let raw: Vec<RawExecution> = serde_json::from_value(message)?;
        let mut items = Vec::with_capacity(raw.len());

        for e in raw {
            let side = match e.side.as_str() {
                "BUY" => TradeSide::Buy,
                "SELL" => TradeSide::Sell,
                // Auction (itayose) prints carry no taker side
                other => {
                    debug!(id = e.id, side = other, "Skipping execution without taker side");
                    continue;
                }
            };
            let latency = (received_at - e.exec_date).num_microseconds().unwrap_or(0) as f64
                / 1_000_000.0;

            items.push(Execution {
                id: e.id,
                timestamp: e.exec_date,
                side,
                price: e.price,
                size: e.size,
                buy_order_ref: e.buy_child_order_acceptance_id,
                sell_order_ref: e.sell_child_order_acceptance_id,
                latency,
                received_at,
            });
        }

        Ok(ParsedMessage::Executions(ExecutionBatch::new(items)))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(serde_json::Number),
    String(String),
}

/// Decimal from either a JSON number or a numeric string
fn deserialize_decimal<'de, D>(deserializer: D) -> std::result::Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let text = match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => n.to_string(),
        NumberOrString::String(s) => s,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MarketDataError;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn parser() -> FeedParser {
        FeedParser::new("FX_BTC_JPY")
    }

    #[test]
    fn test_parse_board_snapshot() {
        let raw = r#"{
            "jsonrpc": "2.0",
            "method": "channelMessage",
            "params": {
                "channel": "lightning_board_snapshot_FX_BTC_JPY",
                "message": {
                    "mid_price": 5000050,
                    "bids": [{"price": 5000000, "size": 0.5}, {"price": 4999990, "size": 1.25}],
                    "asks": [{"price": 5000100, "size": 0.01}]
                }
            }
        }"#;

        let msg = parser().parse(raw, Utc::now()).unwrap();
        if let ParsedMessage::Board(update) = msg {
            assert_eq!(update.kind, UpdateKind::Snapshot);
            assert_eq!(update.bids.len(), 2);
            assert_eq!(update.bids[1], Level::new(dec!(4999990), dec!(1.25)));
            assert_eq!(update.asks[0], Level::new(dec!(5000100), dec!(0.01)));
        } else {
            panic!("Expected Board");
        }
    }

    #[test]
    fn test_parse_board_diff_with_deletion() {
        let raw = r#"{"jsonrpc":"2.0","method":"channelMessage","params":{
            "channel":"lightning_board_FX_BTC_JPY",
            "message":{"mid_price":5000050,"bids":[{"price":5000000,"size":0}],"asks":[]}}}"#;

        match parser().parse(raw, Utc::now()).unwrap() {
            ParsedMessage::Board(update) => {
                assert_eq!(update.kind, UpdateKind::Diff);
                assert_eq!(update.bids, vec![Level::new(dec!(5000000), dec!(0))]);
                assert!(update.asks.is_empty());
            }
            other => panic!("Expected Board, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_executions() {
        let raw = r#"{"jsonrpc":"2.0","method":"channelMessage","params":{
            "channel":"lightning_executions_FX_BTC_JPY",
            "message":[
                {"id":39361,"side":"SELL","price":35100,"size":0.01,
                 "exec_date":"2024-07-07T10:44:33.500Z",
                 "buy_child_order_acceptance_id":"JRF20240707-014356-184990",
                 "sell_child_order_acceptance_id":"JRF20240707-104433-186048"},
                {"id":39362,"side":"","price":35100,"size":1e-8,
                 "exec_date":"2024-07-07T10:44:33.500Z",
                 "buy_child_order_acceptance_id":"a",
                 "sell_child_order_acceptance_id":"b"}
            ]}}"#;
        let received = Utc.with_ymd_and_hms(2024, 7, 7, 10, 44, 34).unwrap();

        match parser().parse(raw, received).unwrap() {
            ParsedMessage::Executions(batch) => {
                assert_eq!(batch.len(), 1);
                let e = &batch.items[0];
                assert_eq!(e.id, 39361);
                assert_eq!(e.side, TradeSide::Sell);
                assert_eq!(e.price, dec!(35100));
                assert_eq!(e.size, dec!(0.01));
                assert_eq!(e.sell_order_ref, "JRF20240707-104433-186048");
                assert!((e.latency - 0.5).abs() < 1e-9);
                assert_eq!(e.received_at, received);
            }
            other => panic!("Expected Executions, got {:?}", other),
        }
    }

    #[test]
    fn test_other_product_and_acks_are_unknown() {
        let other = r#"{"jsonrpc":"2.0","method":"channelMessage","params":{
            "channel":"lightning_board_BTC_JPY","message":{"bids":[],"asks":[]}}}"#;
        assert!(matches!(
            parser().parse(other, Utc::now()).unwrap(),
            ParsedMessage::Unknown(_)
        ));

        let ack = r#"{"jsonrpc":"2.0","id":1,"result":true}"#;
        assert!(matches!(
            parser().parse(ack, Utc::now()).unwrap(),
            ParsedMessage::Unknown(_)
        ));
    }

    #[test]
    fn test_malformed_payload_is_error() {
        let raw = r#"{"jsonrpc":"2.0","method":"channelMessage","params":{
            "channel":"lightning_board_FX_BTC_JPY","message":{"bids":[{"price":"x","size":1}]}}}"#;
        assert!(matches!(
            parser().parse(raw, Utc::now()),
            Err(MarketDataError::ParseError(_))
        ));
        assert!(parser().parse("not json", Utc::now()).is_err());
    }

    #[test]
    fn test_string_and_scientific_decimals() {
        let level: RawLevel = serde_json::from_str(r#"{"price":"100.5","size":2.5e-3}"#).unwrap();
        assert_eq!(level.price, dec!(100.5));
        assert_eq!(level.size, dec!(0.0025));
    }

    #[test]
    fn test_channels() {
        let channels = parser().channels();
        assert_eq!(channels[0], "lightning_board_snapshot_FX_BTC_JPY");
        assert_eq!(channels[2], "lightning_executions_FX_BTC_JPY");
    }
}
