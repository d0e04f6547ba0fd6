//! Per-segment congestion forecasting.
//!
//! [`Forecaster`] is the capability route queries and the ingestion pipeline
//! depend on. [`PredictionEngine`] is the production implementation,
//! [`FixedForecaster`] a deterministic stand-in for harnesses.

mod context;
mod engine;
mod fixed;
mod model;

pub use context::ContextState;
pub use engine::PredictionEngine;
pub use fixed::FixedForecaster;
pub use model::{ForecastModel, ForecastPoint, ForecastView, SegmentFit};

use serde::Serialize;

use crate::{ContextEvent, Error, SegmentId, TrafficSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Training,
}

/// Outcome of a successful retrain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetrainReport {
    pub generation: u64,
    /// Segments fitted from fresh samples
    pub fitted: usize,
    /// Segments whose previous fit was kept
    pub carried_over: usize,
    /// Segments with history but no fit at all
    pub skipped: usize,
}

pub trait Forecaster: Send + Sync {
    /// Forecast points for every covered segment, one per horizon step.
    /// Segments the current model does not cover are omitted.
    fn forecast(&self, segment_ids: &[SegmentId], horizon_minutes: u32) -> Vec<ForecastPoint>;

    /// Builds a new model generation and swaps it in.
    ///
    /// # Errors
    ///
    /// `RetrainFailure` if no segment has enough recent samples,
    /// `RetrainInProgress` if another retrain is running. The previous
    /// generation stays published in both cases.
    fn retrain(&self) -> Result<RetrainReport, Error>;

    /// Folds weather or incident context into future forecasts
    fn ingest_context(&self, event: ContextEvent);

    /// Records an accepted sample as training history
    fn observe(&self, sample: &TrafficSample);

    /// Current model generation with its context
    fn view(&self) -> ForecastView;
}

/// Horizon offsets reported for a request: every `step` minutes up to and
/// including `horizon`
pub(crate) fn horizon_steps(horizon: u32, step: u32) -> Vec<u32> {
    let step = step.max(1);
    if horizon == 0 {
        return vec![0];
    }
    let mut steps: Vec<u32> = (1..=horizon / step).map(|i| i * step).collect();
    if steps.last() != Some(&horizon) {
        steps.push(horizon);
    }
    steps
}
