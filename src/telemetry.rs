//! Logging setup and prometheus counters

use prometheus::{IntCounter, Registry};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Counters for the collector, registered into an explicit registry
#[derive(Debug, Clone)]
pub struct Metrics {
    pub book_updates: IntCounter,
    pub levels_rejected: IntCounter,
    pub summaries_emitted: IntCounter,
    pub ticks_skipped: IntCounter,
    pub executions_ingested: IntCounter,
    pub executions_emitted: IntCounter,
    pub sink_records_written: IntCounter,
    pub sink_failures: IntCounter,
}

impl Metrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let metrics = Self {
            book_updates: IntCounter::new("book_updates_total", "Board updates applied")?,
            levels_rejected: IntCounter::new(
                "book_levels_rejected_total",
                "Price levels dropped by validation",
            )?,
            summaries_emitted: IntCounter::new(
                "quote_summaries_emitted_total",
                "Quote summaries pushed to the summary queue",
            )?,
            ticks_skipped: IntCounter::new(
                "quote_ticks_skipped_total",
                "Summary ticks skipped because the book was one-sided",
            )?,
            executions_ingested: IntCounter::new(
                "executions_ingested_total",
                "Raw executions received",
            )?,
            executions_emitted: IntCounter::new(
                "executions_emitted_total",
                "Coalesced executions pushed to the execution queue",
            )?,
            sink_records_written: IntCounter::new(
                "sink_records_written_total",
                "Records accepted by sinks",
            )?,
            sink_failures: IntCounter::new("sink_failures_total", "Failed sink batch writes")?,
        };

        for counter in [
            &metrics.book_updates,
            &metrics.levels_rejected,
            &metrics.summaries_emitted,
            &metrics.ticks_skipped,
            &metrics.executions_ingested,
            &metrics.executions_emitted,
            &metrics.sink_records_written,
            &metrics.sink_failures,
        ] {
            registry.register(Box::new(counter.clone()))?;
        }

        Ok(metrics)
    }
}

/// Install the JSON tracing subscriber; `RUST_LOG` refines the INFO default
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once_per_registry() {
        let registry = Registry::new();
        let metrics = Metrics::new(&registry).unwrap();
        metrics.summaries_emitted.inc();

        let names: Vec<_> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"quote_summaries_emitted_total".to_string()));

        assert!(Metrics::new(&registry).is_err());
    }
}
