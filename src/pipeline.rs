//! Collector wiring
//!
//! Builds the engine, aggregator and coalescer for one product, connects
//! them to their sinks through unbounded queues and runs each on its own
//! task. Book updates and executions share one ordered feed queue but no
//! state.

use std::io::ErrorKind;

use chrono::Utc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{MarketDataError, Result};
use crate::executions::{CoalescedExecution, ExecutionBatch, ExecutionCoalescer};
use crate::orderbook::{OrderBookEngine, OrderBookUpdate, QuoteAggregator, QuoteSummary};
use crate::parser::{FeedParser, ParsedMessage};
use crate::sink::{Drain, Sink};
use crate::telemetry::Metrics;

/// Event delivered by the external feed
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Board(OrderBookUpdate),
    Executions(ExecutionBatch),
}

impl FeedEvent {
    /// Feed event carried by a parsed message, if any
    pub fn from_parsed(msg: ParsedMessage) -> Option<Self> {
        match msg {
            ParsedMessage::Board(update) => Some(FeedEvent::Board(update)),
            ParsedMessage::Executions(batch) => Some(FeedEvent::Executions(batch)),
            ParsedMessage::Unknown(_) => None,
        }
    }
}

/// Producer side of the feed queue
#[derive(Debug, Clone)]
pub struct FeedHandle {
    tx: mpsc::UnboundedSender<FeedEvent>,
}

impl FeedHandle {
    pub fn send(&self, event: FeedEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| MarketDataError::ChannelClosed("feed"))
    }

    /// Forward newline-delimited feed messages from `reader` until it ends.
    ///
    /// Blank lines, lines that are not valid UTF-8 and messages the parser
    /// rejects are skipped. Returns the number of events forwarded.
    pub async fn forward_lines<R>(&self, reader: R, parser: &FeedParser) -> Result<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut forwarded = 0;

        loop {
            let raw = match lines.next_line().await {
                Ok(Some(raw)) => raw,
                Ok(None) => break,
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    warn!(error = %e, "Skipping unreadable feed line");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if raw.trim().is_empty() {
                continue;
            }

            match parser.parse(&raw, Utc::now()) {
                Ok(msg) => {
                    if let Some(event) = FeedEvent::from_parsed(msg) {
                        self.send(event)?;
                        forwarded += 1;
                    }
                }
                Err(e) => warn!(error = %e, "Failed to parse feed message"),
            }
        }

        Ok(forwarded)
    }
}

/// Running collector
pub struct Pipeline {
    feed: FeedHandle,
    engine: OrderBookEngine,
    shutdown: watch::Sender<bool>,
    ingestion: JoinHandle<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Spawn the collector tasks onto the current tokio runtime
    pub fn spawn<SS, ES>(
        config: &Config,
        metrics: Option<Metrics>,
        summary_sink: SS,
        execution_sink: ES,
    ) -> Result<Self>
    where
        SS: Sink<QuoteSummary> + Send + 'static,
        ES: Sink<CoalescedExecution> + Send + 'static,
    {
        config.validate()?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        let mut tasks = Vec::new();

        let mut engine = OrderBookEngine::new(config.price_validation());
        if let Some(m) = &metrics {
            engine = engine.with_metrics(m.clone());
        }

        if config.board_enabled {
            let (summary_tx, summary_rx) = mpsc::unbounded_channel();
            let mut aggregator = QuoteAggregator::new(
                engine.clone(),
                summary_tx,
                config.sample_interval(),
                config.summary_interval(),
                Utc::now(),
            )?;
            let mut drain = Drain::new(
                summary_sink,
                config.summary_batch_size,
                config.flush_interval(),
            );
            if let Some(m) = &metrics {
                aggregator = aggregator.with_metrics(m.clone());
                drain = drain.with_metrics(m.clone());
            }

            tasks.push(tokio::spawn(aggregator.run(shutdown_rx.clone())));
            tasks.push(tokio::spawn(async move {
                drain.run(summary_rx).await;
            }));
        }

        let coalescer = if config.executions_enabled {
            let (execution_tx, execution_rx) = mpsc::unbounded_channel();
            let mut coalescer = ExecutionCoalescer::new(execution_tx);
            let mut drain = Drain::new(
                execution_sink,
                config.execution_batch_size,
                config.flush_interval(),
            );
            if let Some(m) = &metrics {
                coalescer = coalescer.with_metrics(m.clone());
                drain = drain.with_metrics(m.clone());
            }

            tasks.push(tokio::spawn(async move {
                drain.run(execution_rx).await;
            }));
            Some(coalescer)
        } else {
            None
        };

        let ingestion = tokio::spawn(ingest(
            feed_rx,
            engine.clone(),
            coalescer,
            config.board_enabled,
            config.flush_pending_on_shutdown,
            shutdown_rx,
        ));

        info!(
            product = %config.product_code,
            board = config.board_enabled,
            executions = config.executions_enabled,
            "Pipeline started"
        );

        Ok(Self {
            feed: FeedHandle { tx: feed_tx },
            engine,
            shutdown,
            ingestion,
            tasks,
        })
    }

    pub fn feed(&self) -> FeedHandle {
        self.feed.clone()
    }

    pub fn engine(&self) -> &OrderBookEngine {
        &self.engine
    }

    /// Stop at once. Queued feed events that were not ingested yet are lost.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        drop(self.feed);

        let mut tasks = vec![self.ingestion];
        tasks.extend(self.tasks);
        join_all(tasks).await;
    }

    /// Ingest everything already queued, then stop.
    ///
    /// Waits until every `FeedHandle` has been dropped.
    pub async fn finish(self) {
        drop(self.feed);
        if let Err(e) = self.ingestion.await {
            warn!(error = %e, "Ingestion task failed");
        }

        let _ = self.shutdown.send(true);
        join_all(self.tasks).await;
    }
}

async fn join_all(tasks: Vec<JoinHandle<()>>) {
    for handle in tasks {
        if let Err(e) = handle.await {
            warn!(error = %e, "Pipeline task failed");
        }
    }
    info!("Pipeline stopped");
}

async fn ingest(
    mut feed: mpsc::UnboundedReceiver<FeedEvent>,
    engine: OrderBookEngine,
    mut coalescer: Option<ExecutionCoalescer>,
    board_enabled: bool,
    flush_pending: bool,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = feed.recv() => match event {
                Some(FeedEvent::Board(update)) if board_enabled => {
                    engine.apply(&update);
                }
                Some(FeedEvent::Executions(batch)) => {
                    let Some(c) = coalescer.as_mut() else {
                        continue;
                    };
                    if let Err(e) = c.ingest(&batch) {
                        warn!(error = %e, "Execution queue closed, dropping executions");
                        coalescer = None;
                    }
                }
                Some(_) => debug!("Board update ignored, board collection disabled"),
                None => {
                    info!("Feed closed");
                    break;
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Ingestion shut down");
                    break;
                }
            }
        }
    }

    if let Some(mut c) = coalescer {
        if flush_pending {
            match c.flush() {
                Ok(true) => info!("Flushed pending execution group"),
                Ok(false) => {}
                Err(e) => warn!(error = %e, "Could not flush pending execution group"),
            }
        } else if let Some(lost) = c.pending() {
            info!(id = lost.id, size = %lost.size, "Pending execution group not flushed");
        }
    }
}
