use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Duration;
use hashbrown::HashMap;
use log::{debug, info, warn};
use rayon::prelude::*;

use super::context::ContextState;
use super::model::{ForecastModel, ForecastPoint, ForecastView, Observation, SegmentFit};
use super::{EngineState, Forecaster, RetrainReport, horizon_steps};
use crate::config::PredictionConfig;
use crate::metrics::Metrics;
use crate::{ContextEvent, Error, SegmentId, TrafficSample};

/// Forecast engine retrained from the recent sample history.
///
/// The current model lives behind an `Arc` that is replaced wholesale when a
/// retrain completes; readers clone the `Arc` and never see a model that is
/// still being built.
#[derive(Debug)]
pub struct PredictionEngine {
    config: PredictionConfig,
    model: RwLock<Arc<ForecastModel>>,
    context: RwLock<Arc<ContextState>>,
    history: Mutex<HashMap<SegmentId, VecDeque<Observation>>>,
    training: AtomicBool,
    next_generation: AtomicU64,
    metrics: Arc<Metrics>,
}

/// Clears the training flag however retrain exits
struct TrainingGuard<'a>(&'a AtomicBool);

impl Drop for TrainingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl PredictionEngine {
    pub fn new(config: PredictionConfig, metrics: Arc<Metrics>) -> Self {
        let empty = ForecastModel::empty(config.reversion_minutes);
        Self {
            config,
            model: RwLock::new(Arc::new(empty)),
            context: RwLock::new(Arc::new(ContextState::default())),
            history: Mutex::new(HashMap::new()),
            training: AtomicBool::new(false),
            next_generation: AtomicU64::new(1),
            metrics,
        }
    }

    pub fn state(&self) -> EngineState {
        if self.training.load(Ordering::Acquire) {
            EngineState::Training
        } else {
            EngineState::Idle
        }
    }

    /// Currently published model generation
    pub fn model(&self) -> Arc<ForecastModel> {
        Arc::clone(&self.model.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Drops all recorded history, leaving the published model in place
    pub fn clear_history(&self) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn training_set(&self) -> HashMap<SegmentId, Vec<Observation>> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(newest) = history.values().filter_map(|h| h.back()).map(|o| o.at).max() else {
            return HashMap::new();
        };
        let cutoff = newest - Duration::minutes(i64::from(self.config.history_window_minutes));
        history
            .iter()
            .map(|(id, obs)| {
                let recent: Vec<Observation> =
                    obs.iter().filter(|o| o.at >= cutoff).copied().collect();
                (id.clone(), recent)
            })
            .collect()
    }
}

impl Forecaster for PredictionEngine {
    fn forecast(&self, segment_ids: &[SegmentId], horizon_minutes: u32) -> Vec<ForecastPoint> {
        let view = self.view();
        let horizon = horizon_minutes.min(self.config.max_horizon_minutes);
        let steps = horizon_steps(horizon, self.config.step_minutes);

        let mut points = Vec::with_capacity(segment_ids.len() * steps.len());
        for id in segment_ids {
            if view.model().fit(id).is_none() {
                debug!("No forecast available for segment {id}");
                continue;
            }
            points.extend(steps.iter().filter_map(|&h| view.predict(id, h)));
        }
        points
    }

    fn retrain(&self) -> Result<RetrainReport, Error> {
        if self
            .training
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::RetrainInProgress);
        }
        let _guard = TrainingGuard(&self.training);

        let training_set = self.training_set();
        let min_samples = self.config.min_samples.max(1);
        let fresh: HashMap<SegmentId, SegmentFit> = training_set
            .par_iter()
            .filter(|(_, obs)| obs.len() >= min_samples)
            .filter_map(|(id, obs)| SegmentFit::fit(obs).map(|fit| (id.clone(), fit)))
            .collect();

        if fresh.is_empty() {
            Metrics::incr(&self.metrics.retrains_failed);
            warn!(
                "Retrain skipped: no segment has {} recent samples, keeping generation {}",
                min_samples,
                self.model().generation()
            );
            return Err(Error::RetrainFailure(format!(
                "insufficient recent samples (need {min_samples} per segment)"
            )));
        }

        let previous = self.model();
        let fitted = fresh.len();
        let mut fits = fresh;
        let mut carried_over = 0;
        for (id, fit) in previous.fits() {
            if !fits.contains_key(id) {
                fits.insert(id.clone(), fit.clone());
                carried_over += 1;
            }
        }
        let skipped = training_set
            .keys()
            .filter(|id| !fits.contains_key(*id))
            .count();

        let reference_time = fits
            .values()
            .map(|fit| fit.observed_at)
            .max()
            .unwrap_or_else(chrono::Utc::now);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let model = ForecastModel::from_fits(
            generation,
            reference_time,
            self.config.reversion_minutes,
            fits,
        );

        *self.model.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(model);
        Metrics::incr(&self.metrics.retrains_succeeded);
        info!(
            "Forecast model generation {generation} published: {fitted} fitted, \
            {carried_over} carried over, {skipped} without enough samples"
        );

        Ok(RetrainReport {
            generation,
            fitted,
            carried_over,
            skipped,
        })
    }

    fn ingest_context(&self, event: ContextEvent) {
        let mut context = self.context.write().unwrap_or_else(PoisonError::into_inner);
        *context = Arc::new(context.with_event(event));
        Metrics::incr(&self.metrics.context_events);
    }

    fn observe(&self, sample: &TrafficSample) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let entries = history.entry(sample.segment_id.clone()).or_default();
        let observation = Observation {
            at: sample.timestamp,
            speed_kmh: sample.speed_kmh,
            congestion: sample.congestion,
        };
        // Keep the ring ordered by time; replays land in place.
        let pos = entries.partition_point(|o| o.at <= observation.at);
        if pos > 0 && entries[pos - 1] == observation {
            return;
        }
        entries.insert(pos, observation);
        while entries.len() > self.config.history_len.max(1) {
            entries.pop_front();
        }
    }

    fn view(&self) -> ForecastView {
        ForecastView {
            model: self.model(),
            context: Arc::clone(&self.context.read().unwrap_or_else(PoisonError::into_inner)),
        }
    }
}
