use chrono::{DateTime, Utc};

use super::model::ForecastPoint;
use crate::{ContextEvent, IncidentReport, WeatherReport};

/// Share of speed an incident of severity 1.0 takes away
const INCIDENT_SPEED_IMPACT: f64 = 0.6;

/// Weather and incident context forecasts are adjusted with
#[derive(Debug, Clone, Default)]
pub struct ContextState {
    weather: Option<WeatherReport>,
    incidents: Vec<IncidentReport>,
}

impl ContextState {
    /// Copy of this context with the event folded in
    pub(crate) fn with_event(&self, event: ContextEvent) -> Self {
        let mut next = self.clone();
        match event {
            ContextEvent::Weather(report) => {
                if next
                    .weather
                    .as_ref()
                    .is_none_or(|current| report.timestamp >= current.timestamp)
                {
                    next.weather = Some(report);
                }
            }
            ContextEvent::Incident(incident) => {
                let now = incident.timestamp;
                next.incidents.retain(|i| i.expires_at() > now);
                next.incidents.push(incident);
            }
        }
        next
    }

    pub fn weather(&self) -> Option<&WeatherReport> {
        self.weather.as_ref()
    }

    pub fn incidents(&self) -> &[IncidentReport] {
        &self.incidents
    }

    pub(crate) fn adjust(&self, point: &mut ForecastPoint, target: DateTime<Utc>) {
        if let Some(weather) = &self.weather {
            if target >= weather.timestamp && target < weather.expires_at() {
                point.predicted_speed_kmh *= weather.condition.speed_factor();
            }
        }

        for incident in &self.incidents {
            if incident.is_active_at(target) && incident.segment_ids.contains(&point.segment_id)
            {
                point.predicted_speed_kmh *= 1.0 - INCIDENT_SPEED_IMPACT * incident.severity;
                point.predicted_congestion +=
                    (1.0 - point.predicted_congestion) * incident.severity;
            }
        }

        point.predicted_speed_kmh = point.predicted_speed_kmh.max(1.0);
        point.predicted_congestion = point.predicted_congestion.clamp(0.0, 1.0);
    }
}
