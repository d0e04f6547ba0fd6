use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use hashbrown::HashMap;

use super::context::ContextState;
use super::model::{ForecastModel, ForecastPoint, ForecastView, SegmentFit};
use super::{Forecaster, RetrainReport, horizon_steps};
use crate::{ContextEvent, Error, SegmentId, TrafficSample};

/// Forecaster returning preset, horizon-independent values.
///
/// Context events are folded in like the real engine; retrain and observe
/// do nothing.
#[derive(Debug)]
pub struct FixedForecaster {
    model: Arc<ForecastModel>,
    context: RwLock<Arc<ContextState>>,
    step_minutes: u32,
}

impl FixedForecaster {
    /// `predictions` maps segment ids to (speed km/h, congestion)
    pub fn new(
        reference_time: DateTime<Utc>,
        predictions: impl IntoIterator<Item = (SegmentId, (f64, f64))>,
    ) -> Self {
        let fits: HashMap<SegmentId, SegmentFit> = predictions
            .into_iter()
            .map(|(id, (speed, congestion))| {
                (
                    id,
                    SegmentFit::constant(speed, congestion, usize::MAX / 2, reference_time),
                )
            })
            .collect();
        Self {
            model: Arc::new(ForecastModel::from_fits(1, reference_time, 60.0, fits)),
            context: RwLock::new(Arc::new(ContextState::default())),
            step_minutes: 15,
        }
    }
}

impl Forecaster for FixedForecaster {
    fn forecast(&self, segment_ids: &[SegmentId], horizon_minutes: u32) -> Vec<ForecastPoint> {
        let view = self.view();
        let steps = horizon_steps(horizon_minutes, self.step_minutes);
        segment_ids
            .iter()
            .flat_map(|id| steps.iter().filter_map(|&h| view.predict(id, h)))
            .collect()
    }

    fn retrain(&self) -> Result<RetrainReport, Error> {
        Ok(RetrainReport {
            generation: self.model.generation(),
            fitted: 0,
            carried_over: self.model.len(),
            skipped: 0,
        })
    }

    fn ingest_context(&self, event: ContextEvent) {
        let mut context = self.context.write().unwrap_or_else(PoisonError::into_inner);
        *context = Arc::new(context.with_event(event));
    }

    fn observe(&self, _sample: &TrafficSample) {}

    fn view(&self) -> ForecastView {
        ForecastView {
            model: Arc::clone(&self.model),
            context: Arc::clone(&self.context.read().unwrap_or_else(PoisonError::into_inner)),
        }
    }
}
