//! Background routines: stream consumer, retrain scheduler, broadcast flush

use std::fs::File;
use std::io::{self, BufReader};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};
use trafficflow_core::prelude::*;

use crate::config::IngestConfig;

/// Runs the ingestion pipeline on its own thread.
///
/// Reads are blocking, so the consumer never occupies a runtime worker. The
/// thread is not joined: a stdin source may block until process exit.
pub fn spawn_ingestion(
    pipeline: IngestionPipeline,
    config: &IngestConfig,
    stop: Arc<AtomicBool>,
) -> io::Result<()> {
    // Opened up front so a bad path fails startup; stdin is locked on the
    // consumer thread since its guard cannot move between threads
    let file = if config.source == "-" {
        info!("Consuming events from stdin");
        None
    } else {
        info!("Consuming events from {}", config.source);
        Some(File::open(&config.source)?)
    };

    thread::Builder::new()
        .name("ingest".to_string())
        .spawn(move || {
            let report = match file {
                Some(file) => pipeline.run(LineSource::new(BufReader::new(file)), &stop),
                None => pipeline.run(LineSource::new(io::stdin().lock()), &stop),
            };
            info!(
                "Event stream finished: {} applied, {} stale, {} invalid",
                report.applied, report.stale, report.invalid
            );
        })?;
    Ok(())
}

/// Retrains the forecaster every `period` until shutdown
pub fn spawn_retrain(
    engine: Arc<PredictionEngine>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; there is no history yet
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let engine = Arc::clone(&engine);
                    match tokio::task::spawn_blocking(move || engine.retrain()).await {
                        Ok(Ok(report)) => debug!(
                            "Retrain produced generation {} ({} fitted)",
                            report.generation, report.fitted
                        ),
                        Ok(Err(err)) => warn!("Retrain failed: {err}"),
                        Err(err) => error!("Retrain task aborted: {err}"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("Retrain scheduler stopped");
    })
}

/// Retries buffered subscriber deliveries every `period` until shutdown
pub fn spawn_flush(
    broadcaster: Arc<SubscriptionBroadcaster>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let sent = broadcaster.flush();
                    if sent > 0 {
                        debug!("Flushed {sent} buffered notifications");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("Broadcast flush stopped");
    })
}
