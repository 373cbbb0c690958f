//! Sink module for handing records to external persistence
//!
//! Producers push into unbounded queues; a drain task per queue batches the
//! records and passes each batch to a `Sink`. Sinks own transport and format;
//! a failed batch is logged and dropped here.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::error::Result;
use crate::schema::Record;
use crate::telemetry::Metrics;

/// Destination for a stream of output records
#[cfg_attr(test, mockall::automock)]
pub trait Sink<T> {
    fn name(&self) -> &'static str;

    /// Persist one batch, in order
    fn write(&mut self, records: &[T]) -> Result<()>;
}

/// Sink that emits every record as a structured log event.
///
/// The column header is logged once, ahead of the first record.
#[derive(Debug, Clone)]
pub struct LogSink {
    name: &'static str,
    header_logged: bool,
}

impl LogSink {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            header_logged: false,
        }
    }
}

impl<T: Serialize + Record> Sink<T> for LogSink {
    fn name(&self) -> &'static str {
        self.name
    }

    fn write(&mut self, records: &[T]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if !self.header_logged {
            info!(sink = self.name, header = %T::header_row(','), "Columns");
            self.header_logged = true;
        }
        for record in records {
            let line = serde_json::to_string(record)?;
            info!(sink = self.name, record = %line, "Record");
        }
        Ok(())
    }
}

/// Batches a queue into a sink
pub struct Drain<S> {
    sink: S,
    batch_size: usize,
    flush_interval: Duration,
    metrics: Option<Metrics>,
}

impl<S> Drain<S> {
    pub fn new(sink: S, batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            sink,
            batch_size: batch_size.max(1),
            flush_interval,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Drain `rx` until every sender is gone.
    ///
    /// A batch is written once `batch_size` records are buffered or when the
    /// flush interval fires with a non-empty buffer. Whatever is buffered
    /// when the queue closes is written before returning the sink.
    pub async fn run<T>(mut self, mut rx: mpsc::UnboundedReceiver<T>) -> S
    where
        S: Sink<T>,
    {
        let mut buffer: Vec<T> = Vec::with_capacity(self.batch_size);
        let mut ticker = interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                item = rx.recv() => match item {
                    Some(record) => {
                        buffer.push(record);
                        if buffer.len() >= self.batch_size {
                            self.write_batch(&mut buffer);
                        }
                    }
                    None => {
                        self.write_batch(&mut buffer);
                        info!(sink = self.sink.name(), "Queue closed, drain finished");
                        break;
                    }
                },
                _ = ticker.tick() => self.write_batch(&mut buffer),
            }
        }

        self.sink
    }

    fn write_batch<T>(&mut self, buffer: &mut Vec<T>)
    where
        S: Sink<T>,
    {
        if buffer.is_empty() {
            return;
        }
        let count = buffer.len();

        match self.sink.write(buffer) {
            Ok(()) => {
                if let Some(metrics) = &self.metrics {
                    metrics.sink_records_written.inc_by(count as u64);
                }
                debug!(sink = self.sink.name(), records = count, "Wrote batch");
            }
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.sink_failures.inc();
                }
                error!(
                    sink = self.sink.name(),
                    records = count,
                    error = %e,
                    "Sink write failed, batch dropped"
                );
            }
        }

        buffer.clear();
    }
}
