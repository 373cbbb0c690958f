//! Periodic best-quote summarization
//!
//! Samples the book on a short interval and emits at most one summary per
//! summary interval. Summaries carry the logical schedule time, not the time
//! the book happened to be read, so consecutive records stay evenly spaced.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::{OrderBookEngine, QuoteSummary};
use crate::error::{MarketDataError, Result};
use crate::telemetry::Metrics;

/// Turns the live book into a stream of `QuoteSummary` records
pub struct QuoteAggregator {
    engine: OrderBookEngine,
    output: mpsc::UnboundedSender<QuoteSummary>,
    sample_interval: Duration,
    summary_interval: chrono::Duration,
    next_time: DateTime<Utc>,
    metrics: Option<Metrics>,
}

impl QuoteAggregator {
    /// Create an aggregator whose first summary is due after `start`
    pub fn new(
        engine: OrderBookEngine,
        output: mpsc::UnboundedSender<QuoteSummary>,
        sample_interval: Duration,
        summary_interval: Duration,
        start: DateTime<Utc>,
    ) -> Result<Self> {
        let summary_interval = chrono::Duration::from_std(summary_interval).map_err(|e| {
            MarketDataError::ConfigError(format!("Summary interval out of range: {}", e))
        })?;

        Ok(Self {
            engine,
            output,
            sample_interval,
            summary_interval,
            next_time: start,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Logical timestamp of the next summary
    pub fn next_time(&self) -> DateTime<Utc> {
        self.next_time
    }

    /// Handle one sample tick observed at wall-clock `now`.
    ///
    /// Once `now` is past the scheduled time the book is read and the
    /// schedule advances by one summary interval, whether or not a summary
    /// could be built. A one-sided book is skipped silently. Fails only when
    /// the summary queue has no receiver left.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<Option<QuoteSummary>> {
        if now <= self.next_time {
            return Ok(None);
        }

        let quote = self.engine.quote();
        let timestamp = self.next_time;
        self.next_time = self.next_time + self.summary_interval;

        let Some(summary) = QuoteSummary::from_quote(&quote, timestamp) else {
            if let Some(metrics) = &self.metrics {
                metrics.ticks_skipped.inc();
            }
            debug!(time = %timestamp, "No summary for this tick, skipped");
            return Ok(None);
        };

        self.output
            .send(summary.clone())
            .map_err(|_| MarketDataError::ChannelClosed("quote summaries"))?;

        if let Some(metrics) = &self.metrics {
            metrics.summaries_emitted.inc();
        }
        debug!(
            time = %summary.timestamp,
            mid = summary.mid_price,
            ask = summary.best_ask,
            bid = summary.best_bid,
            spread = summary.spread,
            "Quote summary"
        );

        Ok(Some(summary))
    }

    /// Sample until shutdown is signalled or the summary queue closes
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            sample_ms = self.sample_interval.as_millis() as u64,
            summary_ms = self.summary_interval.num_milliseconds(),
            "Quote aggregator started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick(Utc::now()) {
                        info!(error = %e, "Quote aggregator stopping");
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Quote aggregator shut down");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::{Level, OrderBookUpdate, PriceValidation};
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn ms(n: i64) -> chrono::Duration {
        chrono::Duration::milliseconds(n)
    }

    fn setup() -> (
        OrderBookEngine,
        QuoteAggregator,
        mpsc::UnboundedReceiver<QuoteSummary>,
    ) {
        let engine = OrderBookEngine::new(PriceValidation::Trusting);
        let (tx, rx) = mpsc::unbounded_channel();
        let aggregator = QuoteAggregator::new(
            engine.clone(),
            tx,
            Duration::from_millis(200),
            Duration::from_secs(1),
            start(),
        )
        .unwrap();
        (engine, aggregator, rx)
    }

    fn two_sided(engine: &OrderBookEngine) {
        engine.apply(&OrderBookUpdate::snapshot(
            vec![Level::new(dec!(100), dec!(1))],
            vec![Level::new(dec!(99), dec!(2))],
        ));
    }

    #[test]
    fn test_summaries_use_logical_time() {
        let (engine, mut aggregator, mut rx) = setup();
        two_sided(&engine);

        // Not yet past the scheduled time
        assert!(aggregator.tick(start()).unwrap().is_none());

        let first = aggregator.tick(start() + ms(130)).unwrap().unwrap();
        assert_eq!(first.timestamp, start());
        assert_eq!(first.mid_price, 100);

        // Within the next window nothing is due
        assert!(aggregator.tick(start() + ms(330)).unwrap().is_none());
        assert!(aggregator.tick(start() + ms(1000)).unwrap().is_none());

        let second = aggregator.tick(start() + ms(1170)).unwrap().unwrap();
        assert_eq!(second.timestamp, start() + ms(1000));

        assert_eq!(rx.try_recv().unwrap(), first);
        assert_eq!(rx.try_recv().unwrap(), second);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_one_sided_book_skips_but_advances() {
        let (engine, mut aggregator, mut rx) = setup();
        engine.apply(&OrderBookUpdate::snapshot(vec![Level::new(dec!(100), dec!(1))], vec![]));

        assert!(aggregator.tick(start() + ms(200)).unwrap().is_none());
        assert_eq!(aggregator.next_time(), start() + ms(1000));
        assert!(rx.try_recv().is_err());

        two_sided(&engine);
        let summary = aggregator.tick(start() + ms(1200)).unwrap().unwrap();
        assert_eq!(summary.timestamp, start() + ms(1000));
    }

    #[test]
    fn test_extreme_book_skips_without_panicking() {
        let (engine, mut aggregator, mut rx) = setup();
        engine.apply(&OrderBookUpdate::snapshot(
            vec![Level::new(Decimal::MAX, dec!(1))],
            vec![Level::new(Decimal::MIN, dec!(1))],
        ));
        assert_eq!(engine.spread(), None);
        assert_eq!(engine.mid_price(), None);

        assert!(aggregator.tick(start() + ms(200)).unwrap().is_none());
        assert_eq!(aggregator.next_time(), start() + ms(1000));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_late_ticks_catch_up_one_interval_at_a_time() {
        let (engine, mut aggregator, _rx) = setup();
        two_sided(&engine);

        let late = start() + ms(3500);
        let stamps: Vec<_> = (0..4)
            .filter_map(|_| aggregator.tick(late).unwrap())
            .map(|s| s.timestamp)
            .collect();
        assert_eq!(
            stamps,
            vec![start(), start() + ms(1000), start() + ms(2000), start() + ms(3000)]
        );
    }

    #[test]
    fn test_closed_queue_is_an_error() {
        let (engine, mut aggregator, rx) = setup();
        two_sided(&engine);
        drop(rx);
        assert!(matches!(
            aggregator.tick(start() + ms(200)),
            Err(MarketDataError::ChannelClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let engine = OrderBookEngine::new(PriceValidation::Trusting);
        two_sided(&engine);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let aggregator = QuoteAggregator::new(
            engine,
            tx,
            Duration::from_millis(5),
            Duration::from_millis(10),
            Utc::now(),
        )
        .unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(aggregator.run(shutdown_rx));
        let summary = rx.recv().await.unwrap();
        assert_eq!(summary.best_ask, 100);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
