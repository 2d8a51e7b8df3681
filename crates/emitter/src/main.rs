//! Metrics Emitter - Synthetic pod metrics generator
//!
//! This binary enumerates cluster pods, draws CPU and memory samples
//! from normal distributions, and pushes them to a push-gateway sink.

use anyhow::Result;
use clap::Parser;
use emitter_lib::{
    BatchStore, Emitter, EmitterMetrics, KubePodSource, QueryResponder, StructuredLogger,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const EMITTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting metrics-emitter");

    // Load configuration
    let cli = config::Cli::parse();
    let emitter_config = cli.emitter_config();
    info!(
        destination = %emitter_config.destination,
        job = %emitter_config.job,
        "Emitter configured"
    );

    // Initialize metrics
    let metrics = EmitterMetrics::new();

    // Initialize structured logger
    let logger = StructuredLogger::new(&emitter_config.job);
    logger.log_startup(EMITTER_VERSION, &emitter_config.destination);

    // Connect to the cluster
    let source = Arc::new(KubePodSource::try_default().await?);

    let store = BatchStore::new();
    let emitter = Arc::new(Emitter::new(source, store.clone(), &emitter_config)?);
    let responder = QueryResponder::new(store);

    // Create shared application state
    let app_state = Arc::new(api::AppState::new(
        emitter.clone(),
        responder,
        metrics.clone(),
    ));

    // Start the query and trigger server
    let _api_handle = tokio::spawn(api::serve(cli.port, app_state));

    if cli.standalone {
        // Standalone mode drives passes on a timer until SIGINT
        let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
        let loop_handle = tokio::spawn(
            emitter
                .clone()
                .run_loop(emitter_config.interval, shutdown_rx),
        );

        tokio::signal::ctrl_c().await?;
        logger.log_shutdown("SIGINT received");
        let _ = shutdown_tx.send(());
        let _ = loop_handle.await;
    } else {
        // Trigger mode waits for /healthz requests to run passes
        tokio::signal::ctrl_c().await?;
        logger.log_shutdown("SIGINT received");
    }

    info!("Shutting down");

    Ok(())
}
