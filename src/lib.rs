//! Market Spider - market data collector library
//!
//! Keeps an in-memory order book for one exchange instrument from board
//! snapshots and diffs, samples it into evenly spaced best-quote summaries,
//! and coalesces split execution prints before they are handed to
//! persistence sinks.

pub mod config;
pub mod error;
pub mod executions;
pub mod orderbook;
pub mod parser;
pub mod pipeline;
pub mod schema;
pub mod sink;
pub mod telemetry;

pub use config::Config;
pub use error::{MarketDataError, Result, ValidationError};
pub use executions::{CoalescedExecution, Execution, ExecutionBatch, ExecutionCoalescer, TradeSide};
pub use orderbook::{
    Level, OrderBook, OrderBookEngine, OrderBookUpdate, PriceValidation, Quote, QuoteAggregator,
    QuoteSummary, Side, UpdateKind,
};
pub use parser::{FeedParser, ParsedMessage};
pub use pipeline::{FeedEvent, FeedHandle, Pipeline};
pub use schema::{Field, FieldKind, Record};
pub use sink::{Drain, LogSink, Sink};
pub use telemetry::Metrics;
