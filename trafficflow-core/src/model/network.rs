//! Road network components - intersections, segments and their live state

use std::fmt;

use chrono::{DateTime, Utc};
use geo::{LineString, Point};
use serde::{Deserialize, Serialize};

/// Opaque intersection identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

/// Opaque road segment identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(pub String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl SegmentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for SegmentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a segment's current reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// Initial state taken from the network definition
    Baseline,
    #[default]
    Sensor,
    Probe,
    IncidentReport,
    Estimate,
}

impl SourceTag {
    /// Relative trust in a reading from this source, in [0, 1]
    pub fn reliability(self) -> f64 {
        match self {
            SourceTag::Sensor => 0.95,
            SourceTag::Probe => 0.8,
            SourceTag::IncidentReport => 0.7,
            SourceTag::Estimate => 0.5,
            SourceTag::Baseline => 0.3,
        }
    }
}

/// Road network node
#[derive(Debug, Clone)]
pub struct Intersection {
    pub id: NodeId,
    /// Node coordinates (lon, lat)
    pub geometry: Point<f64>,
}

/// Static part of a road segment, fixed once the network is loaded
#[derive(Debug, Clone)]
pub struct SegmentInfo {
    pub id: SegmentId,
    pub from: NodeId,
    pub to: NodeId,
    /// Ordered polyline from `from` to `to`
    pub geometry: LineString<f64>,
    /// Free-flow length in meters
    pub length_m: f64,
    /// Legal speed in km/h
    pub speed_limit_kmh: f64,
    pub toll: bool,
    pub road_class: Option<String>,
}

/// Live traffic state of a segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SegmentState {
    pub speed_kmh: f64,
    /// Congestion level in [0, 1]
    pub congestion: f64,
    pub last_update: Option<DateTime<Utc>>,
    pub source: SourceTag,
}

impl SegmentState {
    /// State of an unobserved segment: legal speed, no congestion
    pub fn free_flow(speed_limit_kmh: f64) -> Self {
        Self {
            speed_kmh: speed_limit_kmh,
            congestion: 0.0,
            last_update: None,
            source: SourceTag::Baseline,
        }
    }
}

/// Complete view of a segment: static description plus current state
#[derive(Debug, Clone)]
pub struct RoadSegment {
    pub info: SegmentInfo,
    pub state: SegmentState,
}

impl RoadSegment {
    pub fn id(&self) -> &SegmentId {
        &self.info.id
    }
}
