mod config;
mod error;
mod routes;
mod state;
mod workers;
mod ws;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use trafficflow_core::prelude::*;

use crate::config::{LoggingConfig, ServerConfig};
use crate::state::AppState;

#[derive(Debug, Parser)]
#[command(version, about = "Real-time traffic routing server")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init_tracing(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn wait_for_shutdown(trigger: watch::Sender<bool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
    signal_shutdown(&trigger);
}

/// Flips the shutdown flag; returns false when no worker is left to see it
fn signal_shutdown(trigger: &watch::Sender<bool>) -> bool {
    match trigger.send(true) {
        Ok(()) => true,
        Err(_) => {
            debug!("Shutdown signalled with no workers listening");
            false
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = ServerConfig::load(cli.config.as_deref())?;
    init_tracing(&config.logging);

    let definition = NetworkDefinition::from_path(&config.network.path)?;
    let graph = GraphStore::from_definition(definition)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (state, pipeline) = AppState::build(
        graph,
        &config.core,
        config.server.websocket_queue,
        shutdown_rx.clone(),
    );

    let stop_ingest = Arc::new(AtomicBool::new(false));
    workers::spawn_ingestion(pipeline, &config.ingest, Arc::clone(&stop_ingest))?;
    let retrain = workers::spawn_retrain(
        Arc::clone(&state.engine),
        config.schedule.retrain_interval(),
        shutdown_rx.clone(),
    );
    let flush = workers::spawn_flush(
        Arc::clone(&state.broadcaster),
        config.schedule.flush_interval(),
        shutdown_rx,
    );

    let app = routes::router(state.clone(), &config.server);
    let listener = TcpListener::bind(config.server.bind).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown_tx))
        .await?;

    stop_ingest.store(true, Ordering::Release);
    let _ = tokio::join!(retrain, flush);
    state.broadcaster.close();
    info!("Final counters: {:?}", state.metrics.snapshot());
    Ok(())
}
