//! Shared order book handle
//!
//! Wraps a single `OrderBook` behind one mutex. Every mutation and every
//! best-price read takes the lock for the duration of the map work only;
//! logging and metrics happen after it is released.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rust_decimal::Decimal;
use tracing::{debug, warn};

use super::{Level, OrderBook, OrderBookUpdate, PriceValidation, Quote, Side};
use crate::error::ValidationError;
use crate::telemetry::Metrics;

/// Cloneable handle to the process' order book
#[derive(Debug, Clone)]
pub struct OrderBookEngine {
    book: Arc<Mutex<OrderBook>>,
    metrics: Option<Metrics>,
}

impl OrderBookEngine {
    /// Create an engine around an empty book
    pub fn new(validation: PriceValidation) -> Self {
        Self {
            book: Arc::new(Mutex::new(OrderBook::new(validation))),
            metrics: None,
        }
    }

    /// Attach counters for applied updates and rejected levels
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn lock(&self) -> MutexGuard<'_, OrderBook> {
        // A panic under the lock cannot leave a half-applied level behind,
        // so the book stays usable.
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear both sides
    pub fn reset(&self) {
        self.lock().reset();
        debug!("Order book reset");
    }

    /// Apply a snapshot or diff atomically with respect to readers
    pub fn apply(&self, update: &OrderBookUpdate) -> Vec<ValidationError> {
        let (rejected, depth) = {
            let mut book = self.lock();
            let rejected = book.apply(update);
            (rejected, book.depth())
        };

        debug!(
            kind = ?update.kind,
            asks = update.asks.len(),
            bids = update.bids.len(),
            ask_levels = depth.0,
            bid_levels = depth.1,
            "Applied board update"
        );
        self.record(&rejected);
        rejected
    }

    /// Upsert/delete levels on one side
    pub fn apply_levels(&self, side: Side, levels: &[Level]) -> Vec<ValidationError> {
        let rejected = self.lock().apply_levels(side, levels);
        self.record(&rejected);
        rejected
    }

    fn record(&self, rejected: &[ValidationError]) {
        for e in rejected {
            warn!(error = %e, "Dropped invalid price level");
        }
        if let Some(metrics) = &self.metrics {
            metrics.book_updates.inc();
            metrics.levels_rejected.inc_by(rejected.len() as u64);
        }
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.lock().best_ask()
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.lock().best_bid()
    }

    pub fn spread(&self) -> Option<Decimal> {
        self.lock().spread()
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        self.lock().mid_price()
    }

    /// Consistent view of both best levels
    pub fn quote(&self) -> Quote {
        self.lock().quote()
    }

    /// Number of levels as (asks, bids)
    pub fn depth(&self) -> (usize, usize) {
        self.lock().depth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::thread;

    #[test]
    fn test_clones_share_one_book() {
        let engine = OrderBookEngine::new(PriceValidation::Trusting);
        let writer = engine.clone();
        writer.apply(&OrderBookUpdate::snapshot(
            vec![Level::new(dec!(100), dec!(1))],
            vec![Level::new(dec!(99), dec!(1))],
        ));
        assert_eq!(engine.best_ask(), Some(dec!(100)));
        assert_eq!(engine.best_bid(), Some(dec!(99)));
        assert_eq!(engine.mid_price(), Some(dec!(100)));

        engine.reset();
        assert_eq!(writer.depth(), (0, 0));
    }

    #[test]
    fn test_concurrent_readers_see_consistent_snapshots() {
        let engine = OrderBookEngine::new(PriceValidation::Trusting);
        engine.apply(&OrderBookUpdate::snapshot(
            vec![Level::new(dec!(100), dec!(1))],
            vec![Level::new(dec!(99), dec!(1))],
        ));

        let writer = engine.clone();
        let handle = thread::spawn(move || {
            for i in 0..500u32 {
                let ask = dec!(100) + Decimal::from(i % 7);
                writer.apply(&OrderBookUpdate::snapshot(
                    vec![Level::new(ask, dec!(1))],
                    vec![Level::new(ask - dec!(1), dec!(1))],
                ));
            }
        });

        for _ in 0..500 {
            // A snapshot is applied under one lock, so readers never see
            // a book with only one side repopulated.
            let quote = engine.quote();
            assert_eq!(quote.spread(), Some(dec!(1)));
        }
        handle.join().unwrap();
    }

    #[test]
    fn test_metrics_count_rejections() {
        let registry = prometheus::Registry::new();
        let metrics = Metrics::new(&registry).unwrap();
        let engine =
            OrderBookEngine::new(PriceValidation::RejectNegative).with_metrics(metrics.clone());

        let rejected = engine.apply_levels(
            Side::Bid,
            &[Level::new(dec!(-1), dec!(1)), Level::new(dec!(-2), dec!(1))],
        );
        assert_eq!(rejected.len(), 2);
        assert_eq!(metrics.levels_rejected.get(), 2);
        assert_eq!(metrics.book_updates.get(), 1);
    }
}
