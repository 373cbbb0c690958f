//! Execution coalescing
//!
//! A single taker order that sweeps one price level is printed by the
//! exchange as several executions, one per resting counter-order. Prints of
//! the same side at the same price that share the taker-side order reference
//! are folded into one record. The open group is carried over between
//! batches and is only emitted when a print that does not belong to it
//! arrives.

use tokio::sync::mpsc;
use tracing::debug;

use super::{CoalescedExecution, Execution, ExecutionBatch};
use crate::error::{MarketDataError, Result};
use crate::telemetry::Metrics;

pub struct ExecutionCoalescer {
    pending: Option<CoalescedExecution>,
    output: mpsc::UnboundedSender<CoalescedExecution>,
    metrics: Option<Metrics>,
}

impl ExecutionCoalescer {
    pub fn new(output: mpsc::UnboundedSender<CoalescedExecution>) -> Self {
        Self {
            pending: None,
            output,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Coalesce a batch and push every completed group to the output queue.
    ///
    /// Returns the number of records emitted. The group still open at the
    /// end of the batch stays pending.
    pub fn ingest(&mut self, batch: &ExecutionBatch) -> Result<usize> {
        let completed = self.coalesce(&batch.items);
        let emitted = completed.len();

        for record in completed {
            self.output
                .send(record)
                .map_err(|_| MarketDataError::ChannelClosed("coalesced executions"))?;
        }

        if let Some(metrics) = &self.metrics {
            metrics.executions_ingested.inc_by(batch.len() as u64);
            metrics.executions_emitted.inc_by(emitted as u64);
        }
        debug!(
            received = batch.len(),
            emitted,
            pending = self.pending.is_some(),
            "Coalesced execution batch"
        );

        Ok(emitted)
    }

    /// Run the merge state machine over `items`, returning completed groups
    pub fn coalesce(&mut self, items: &[Execution]) -> Vec<CoalescedExecution> {
        let mut completed = Vec::new();

        for e in items {
            if let Some(group) = self.pending.as_mut() {
                if group.can_merge(e) {
                    group.merge(e);
                    continue;
                }
            }
            if let Some(done) = self.pending.replace(CoalescedExecution::from(e)) {
                completed.push(done);
            }
        }

        completed
    }

    /// The group currently accumulating, if any
    pub fn pending(&self) -> Option<&CoalescedExecution> {
        self.pending.as_ref()
    }

    /// Remove the open group without emitting it
    pub fn take_pending(&mut self) -> Option<CoalescedExecution> {
        self.pending.take()
    }

    /// Emit the open group to the output queue. Returns whether one was sent.
    pub fn flush(&mut self) -> Result<bool> {
        let Some(record) = self.pending.take() else {
            return Ok(false);
        };
        self.output
            .send(record)
            .map_err(|_| MarketDataError::ChannelClosed("coalesced executions"))?;
        if let Some(metrics) = &self.metrics {
            metrics.executions_emitted.inc();
        }
        Ok(true)
    }
}
