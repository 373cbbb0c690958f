//! Market Spider - collector entry point
//!
//! Reads newline-delimited feed messages from stdin, keeps the order book,
//! and logs quote summaries and coalesced executions. The transport that
//! produces the feed lines is run outside this process.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::io::BufReader;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use market_spider::telemetry::{init_tracing, Metrics};
use market_spider::{Config, FeedParser, LogSink, Pipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting Market Spider collector");

    let config = Config::load()?;
    info!(
        product = %config.product_code,
        board = config.board_enabled,
        executions = config.executions_enabled,
        "Configuration loaded"
    );

    let registry = Arc::new(Registry::new());
    let metrics = Metrics::new(&registry)?;

    let health_registry = registry.clone();
    let port = config.health_port;
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_registry, port).await {
            warn!(error = %e, "Health server error");
        }
    });

    let pipeline = Pipeline::spawn(
        &config,
        Some(metrics),
        LogSink::new("quote_summaries"),
        LogSink::new("executions"),
    )?;

    let parser = FeedParser::new(&config.product_code);
    let feed = pipeline.feed();
    let stdin = BufReader::new(tokio::io::stdin());

    let interrupted = tokio::select! {
        res = feed.forward_lines(stdin, &parser) => {
            match res {
                Ok(count) => info!(events = count, "Feed input ended"),
                Err(e) => warn!(error = %e, "Feed input failed"),
            }
            false
        }
        _ = tokio::signal::ctrl_c() => true,
    };
    drop(feed);

    if interrupted {
        info!("Interrupted, shutting down");
        pipeline.shutdown().await;
    } else {
        info!("Draining pipeline");
        pipeline.finish().await;
    }

    Ok(())
}

/// Start HTTP server for health checks and metrics
async fn start_health_server(registry: Arc<Registry>, port: u16) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(registry);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "component": "market-spider",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn metrics(State(registry): State<Arc<Registry>>) -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
