//! Per-segment damped trend model
//!
//! Each fit keeps the recent mean, the last observation and a least-squares
//! slope. Predictions start from the trend line through the last observation
//! and decay exponentially toward the mean as the look-ahead grows.

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use serde::Serialize;

use super::context::ContextState;
use crate::SegmentId;

/// Lowest speed a forecast may report, km/h
const MIN_PREDICTED_SPEED_KMH: f64 = 1.0;
/// Sample count at which confidence reaches one half
const CONFIDENCE_HALF_SAMPLES: f64 = 5.0;

/// One forecast for one segment at one horizon
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub segment_id: SegmentId,
    pub horizon_minutes: u32,
    pub predicted_speed_kmh: f64,
    pub predicted_congestion: f64,
    /// In [0, 1]
    pub confidence: f64,
    /// Model generation that produced the point
    pub generation: u64,
}

/// A single observation kept for training
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Observation {
    pub(crate) at: DateTime<Utc>,
    pub(crate) speed_kmh: f64,
    pub(crate) congestion: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentFit {
    pub samples: usize,
    pub mean_speed: f64,
    pub mean_congestion: f64,
    pub last_speed: f64,
    pub last_congestion: f64,
    /// km/h per minute
    pub speed_slope: f64,
    /// congestion units per minute
    pub congestion_slope: f64,
    pub observed_at: DateTime<Utc>,
}

impl SegmentFit {
    /// Fit that predicts the same values at every horizon
    pub fn constant(speed_kmh: f64, congestion: f64, samples: usize, at: DateTime<Utc>) -> Self {
        Self {
            samples,
            mean_speed: speed_kmh,
            mean_congestion: congestion,
            last_speed: speed_kmh,
            last_congestion: congestion,
            speed_slope: 0.0,
            congestion_slope: 0.0,
            observed_at: at,
        }
    }

    /// Fits the observations, which must be ordered by time and non-empty
    pub(crate) fn fit(observations: &[Observation]) -> Option<Self> {
        let first = observations.first()?;
        let last = observations.last()?;
        #[allow(clippy::cast_precision_loss)]
        let n = observations.len() as f64;

        let minutes = |o: &Observation| (o.at - first.at).num_seconds() as f64 / 60.0;
        let mean_t = observations.iter().map(minutes).sum::<f64>() / n;
        let mean_speed = observations.iter().map(|o| o.speed_kmh).sum::<f64>() / n;
        let mean_congestion = observations.iter().map(|o| o.congestion).sum::<f64>() / n;

        let var_t: f64 = observations
            .iter()
            .map(|o| (minutes(o) - mean_t).powi(2))
            .sum();
        let (speed_slope, congestion_slope) = if var_t > f64::EPSILON {
            let cov = |value: fn(&Observation) -> f64, mean: f64| {
                observations
                    .iter()
                    .map(|o| (minutes(o) - mean_t) * (value(o) - mean))
                    .sum::<f64>()
                    / var_t
            };
            (
                cov(|o| o.speed_kmh, mean_speed),
                cov(|o| o.congestion, mean_congestion),
            )
        } else {
            (0.0, 0.0)
        };

        Some(Self {
            samples: observations.len(),
            mean_speed,
            mean_congestion,
            last_speed: last.speed_kmh,
            last_congestion: last.congestion,
            speed_slope,
            congestion_slope,
            observed_at: last.at,
        })
    }

    /// (speed, congestion, confidence) `lookahead` minutes after the last observation
    fn predict(&self, lookahead: f64, reversion_minutes: f64) -> (f64, f64, f64) {
        let lookahead = lookahead.max(0.0);
        let decay = (-lookahead / reversion_minutes).exp();
        let speed = self.mean_speed
            + (self.last_speed + self.speed_slope * lookahead - self.mean_speed) * decay;
        let congestion = self.mean_congestion
            + (self.last_congestion + self.congestion_slope * lookahead - self.mean_congestion)
                * decay;

        #[allow(clippy::cast_precision_loss)]
        let n = self.samples as f64;
        let confidence =
            n / (n + CONFIDENCE_HALF_SAMPLES) * (-lookahead / (2.0 * reversion_minutes)).exp();

        (
            speed.max(MIN_PREDICTED_SPEED_KMH),
            congestion.clamp(0.0, 1.0),
            confidence.clamp(0.0, 1.0),
        )
    }
}

/// Immutable model generation. Never mutated once built; retraining
/// produces a new one.
#[derive(Debug, Clone)]
pub struct ForecastModel {
    generation: u64,
    trained_at: DateTime<Utc>,
    /// Newest observation across all segments; horizons are offsets from it
    reference_time: DateTime<Utc>,
    reversion_minutes: f64,
    fits: HashMap<SegmentId, SegmentFit>,
}

impl ForecastModel {
    pub fn empty(reversion_minutes: f64) -> Self {
        Self {
            generation: 0,
            trained_at: Utc::now(),
            reference_time: Utc::now(),
            reversion_minutes,
            fits: HashMap::new(),
        }
    }

    pub fn from_fits(
        generation: u64,
        reference_time: DateTime<Utc>,
        reversion_minutes: f64,
        fits: HashMap<SegmentId, SegmentFit>,
    ) -> Self {
        Self {
            generation,
            trained_at: Utc::now(),
            reference_time,
            reversion_minutes,
            fits,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn reference_time(&self) -> DateTime<Utc> {
        self.reference_time
    }

    pub fn len(&self) -> usize {
        self.fits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fits.is_empty()
    }

    pub fn fit(&self, id: &SegmentId) -> Option<&SegmentFit> {
        self.fits.get(id)
    }

    pub(crate) fn fits(&self) -> &HashMap<SegmentId, SegmentFit> {
        &self.fits
    }

    /// Forecast without context adjustments
    pub fn predict(&self, id: &SegmentId, horizon_minutes: u32) -> Option<ForecastPoint> {
        let fit = self.fits.get(id)?;
        #[allow(clippy::cast_precision_loss)]
        let staleness = (self.reference_time - fit.observed_at).num_seconds() as f64 / 60.0;
        let lookahead = staleness + f64::from(horizon_minutes);
        let (speed, congestion, confidence) = fit.predict(lookahead, self.reversion_minutes);
        Some(ForecastPoint {
            segment_id: id.clone(),
            horizon_minutes,
            predicted_speed_kmh: speed,
            predicted_congestion: congestion,
            confidence,
            generation: self.generation,
        })
    }
}

/// A model generation paired with the context it is read against.
///
/// Route queries take one view and use it throughout, so every segment of a
/// route is costed against the same model version.
#[derive(Debug, Clone)]
pub struct ForecastView {
    pub(crate) model: std::sync::Arc<ForecastModel>,
    pub(crate) context: std::sync::Arc<ContextState>,
}

impl ForecastView {
    pub fn generation(&self) -> u64 {
        self.model.generation
    }

    pub fn model(&self) -> &ForecastModel {
        &self.model
    }

    pub fn predict(&self, id: &SegmentId, horizon_minutes: u32) -> Option<ForecastPoint> {
        let mut point = self.model.predict(id, horizon_minutes)?;
        let target = self.model.reference_time
            + chrono::Duration::minutes(i64::from(horizon_minutes));
        self.context.adjust(&mut point, target);
        Some(point)
    }
}
