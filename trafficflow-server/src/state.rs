use std::sync::Arc;

use tokio::sync::watch;
use trafficflow_core::prelude::*;

/// Handles shared by every request handler and worker
#[derive(Clone)]
pub struct AppState {
    pub graph: Arc<GraphStore>,
    pub engine: Arc<PredictionEngine>,
    pub broadcaster: Arc<SubscriptionBroadcaster>,
    pub optimizer: Arc<RouteOptimizer>,
    pub metrics: Arc<Metrics>,
    pub websocket_queue: usize,
    /// Flips to true once shutdown starts
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    /// Wires the core components in dependency order and returns the state
    /// together with the ingestion pipeline feeding it
    pub fn build(
        graph: GraphStore,
        config: &CoreConfig,
        websocket_queue: usize,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, IngestionPipeline) {
        let metrics = Arc::new(Metrics::default());
        let graph = Arc::new(graph);
        let engine = Arc::new(PredictionEngine::new(
            config.prediction.clone(),
            Arc::clone(&metrics),
        ));
        let broadcaster = Arc::new(SubscriptionBroadcaster::new(
            config.broadcast.clone(),
            Arc::clone(&metrics),
        ));
        let pipeline = IngestionPipeline::new(
            Arc::clone(&graph),
            engine.clone(),
            Arc::clone(&broadcaster),
            Arc::clone(&metrics),
        );
        let optimizer = Arc::new(RouteOptimizer::new(
            Arc::clone(&graph),
            engine.clone(),
            config.optimizer.clone(),
            Arc::clone(&metrics),
        ));

        let state = Self {
            graph,
            engine,
            broadcaster,
            optimizer,
            metrics,
            websocket_queue: websocket_queue.max(1),
            shutdown,
        };
        (state, pipeline)
    }
}
