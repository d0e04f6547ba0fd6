use serde::Deserialize;

use crate::{Error, IncidentReport, TrafficSample, WeatherReport};

/// Payload on the measurement stream, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamEvent {
    Traffic(TrafficSample),
    Weather(WeatherReport),
    Incident(IncidentReport),
}

impl StreamEvent {
    /// Deserializes and validates one payload
    ///
    /// # Errors
    ///
    /// Returns `InvalidSample` for undecodable payloads or out-of-range values
    pub fn decode(payload: &[u8]) -> Result<Self, Error> {
        let event: StreamEvent = serde_json::from_slice(payload)
            .map_err(|e| Error::InvalidSample(format!("undecodable payload: {e}")))?;
        match &event {
            StreamEvent::Traffic(sample) => sample.validate()?,
            StreamEvent::Weather(_) => {}
            StreamEvent::Incident(incident) => incident.validate()?,
        }
        Ok(event)
    }
}
