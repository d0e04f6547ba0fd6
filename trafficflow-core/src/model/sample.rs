//! Measurements and context events delivered by the stream transport

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::network::{SegmentId, SourceTag};
use crate::Error;

/// One traffic measurement for one segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSample {
    pub segment_id: SegmentId,
    pub speed_kmh: f64,
    pub congestion: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub source: SourceTag,
}

impl TrafficSample {
    pub fn validate(&self) -> Result<(), Error> {
        if self.segment_id.as_str().is_empty() {
            return Err(Error::InvalidSample("empty segment id".to_string()));
        }
        if !self.speed_kmh.is_finite() || self.speed_kmh < 0.0 {
            return Err(Error::InvalidSample(format!(
                "speed {} on segment {} is not a non-negative number",
                self.speed_kmh, self.segment_id
            )));
        }
        if !(0.0..=1.0).contains(&self.congestion) {
            return Err(Error::InvalidSample(format!(
                "congestion {} on segment {} is outside [0, 1]",
                self.congestion, self.segment_id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    Clear,
    Rain,
    HeavyRain,
    Fog,
    Wind,
}

impl WeatherCondition {
    /// Multiplier applied to predicted speed while the condition holds
    pub fn speed_factor(self) -> f64 {
        match self {
            WeatherCondition::Clear => 1.0,
            WeatherCondition::Rain => 0.9,
            WeatherCondition::HeavyRain => 0.75,
            WeatherCondition::Fog => 0.8,
            WeatherCondition::Wind => 0.95,
        }
    }
}

fn default_valid_minutes() -> u32 {
    60
}

fn default_incident_minutes() -> u32 {
    30
}

/// City-wide weather observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub condition: WeatherCondition,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_valid_minutes")]
    pub valid_minutes: u32,
}

impl WeatherReport {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.timestamp + Duration::minutes(i64::from(self.valid_minutes))
    }
}

/// Reported incident affecting a set of segments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentReport {
    pub segment_ids: Vec<SegmentId>,
    /// Severity in [0, 1]
    pub severity: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_incident_minutes")]
    pub duration_minutes: u32,
}

impl IncidentReport {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.timestamp + Duration::minutes(i64::from(self.duration_minutes))
    }

    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        at >= self.timestamp && at < self.expires_at()
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.segment_ids.is_empty() {
            return Err(Error::InvalidSample(
                "incident without segment ids".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.severity) {
            return Err(Error::InvalidSample(format!(
                "incident severity {} is outside [0, 1]",
                self.severity
            )));
        }
        Ok(())
    }
}

/// Auxiliary input consumed by the prediction engine
#[derive(Debug, Clone, PartialEq)]
pub enum ContextEvent {
    Weather(WeatherReport),
    Incident(IncidentReport),
}

impl ContextEvent {
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            ContextEvent::Weather(_) => Ok(()),
            ContextEvent::Incident(incident) => incident.validate(),
        }
    }
}
