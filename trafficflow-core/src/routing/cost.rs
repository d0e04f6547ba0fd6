use petgraph::graph::EdgeIndex;

use super::query::{CostBasis, Preference};
use crate::GraphSnapshot;
use crate::prediction::ForecastView;

/// Traversal cost of one edge entered at a given time
#[derive(Debug, Clone, Copy)]
pub(crate) struct EdgeCost {
    /// Objective value, strictly positive
    pub(crate) cost: f64,
    pub(crate) travel_secs: f64,
    pub(crate) speed_kmh: f64,
    pub(crate) congestion: f64,
    pub(crate) basis: CostBasis,
}

/// Edge costs over a snapshot, optionally looking ahead into forecasts
pub(crate) struct CostModel<'a> {
    pub(crate) snapshot: &'a GraphSnapshot,
    pub(crate) forecast: Option<&'a ForecastView>,
    pub(crate) horizon_minutes: u32,
    pub(crate) preference: Preference,
    pub(crate) min_speed_kmh: f64,
    pub(crate) congestion_penalty: f64,
}

impl CostModel<'_> {
    /// Cost of `edge` entered `elapsed_secs` after departure.
    ///
    /// Segments reached within the horizon are costed at their forecast for
    /// that moment; the first minute and anything without a forecast use the
    /// snapshot's current reading.
    pub(crate) fn edge(&self, edge: EdgeIndex, elapsed_secs: f64) -> EdgeCost {
        let info = self.snapshot.info(edge);
        let state = self.snapshot.state(edge);

        let (speed, congestion, basis) = match self.forecast_at(edge, elapsed_secs) {
            Some((speed, congestion)) => (speed, congestion, CostBasis::Predicted),
            None => (state.speed_kmh, state.congestion, CostBasis::Current),
        };

        let speed = speed.max(self.min_speed_kmh);
        let congestion = congestion.clamp(0.0, 1.0);
        let travel_secs =
            info.length_m * 3.6 / speed * (1.0 + self.congestion_penalty.max(0.0) * congestion);
        let cost = match self.preference {
            Preference::MinimizeTime => travel_secs,
            Preference::MinimizeDistance => info.length_m,
        };

        EdgeCost {
            cost,
            travel_secs,
            speed_kmh: speed,
            congestion,
            basis,
        }
    }

    fn forecast_at(&self, edge: EdgeIndex, elapsed_secs: f64) -> Option<(f64, f64)> {
        if self.horizon_minutes == 0 {
            return None;
        }
        let forecast = self.forecast?;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let offset = (elapsed_secs / 60.0).round().max(0.0) as u32;
        if offset == 0 {
            return None;
        }
        let id = &self.snapshot.info(edge).id;
        let point = forecast.predict(id, offset.min(self.horizon_minutes))?;
        Some((point.predicted_speed_kmh, point.predicted_congestion))
    }
}
