use std::fmt;

use chrono::{DateTime, Utc};
use geo::LineString;
use serde::{Deserialize, Serialize};

use crate::{NodeId, SegmentId};

/// Where a route starts or ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Endpoint {
    Node(NodeId),
    /// Resolved to the nearest intersection
    Coordinate { lon: f64, lat: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preference {
    #[default]
    MinimizeTime,
    MinimizeDistance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    /// Toll segments are removed from the search graph
    pub avoid_tolls: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteQuery {
    pub origin: Endpoint,
    pub destination: Endpoint,
    #[serde(default)]
    pub preference: Preference,
    #[serde(default)]
    pub constraints: Constraints,
    /// Minutes of look-ahead; 0 uses current conditions only
    #[serde(default)]
    pub horizon_minutes: u32,
    /// Number of routes wanted, optimum included; capped at the configured maximum
    #[serde(default)]
    pub max_alternatives: Option<usize>,
}

impl RouteQuery {
    pub fn between_nodes(origin: &str, destination: &str) -> Self {
        Self {
            origin: Endpoint::Node(NodeId::from(origin)),
            destination: Endpoint::Node(NodeId::from(destination)),
            preference: Preference::MinimizeTime,
            constraints: Constraints::default(),
            horizon_minutes: 0,
            max_alternatives: None,
        }
    }

    #[must_use]
    pub fn with_preference(mut self, preference: Preference) -> Self {
        self.preference = preference;
        self
    }

    #[must_use]
    pub fn avoiding_tolls(mut self) -> Self {
        self.constraints.avoid_tolls = true;
        self
    }

    #[must_use]
    pub fn with_horizon(mut self, minutes: u32) -> Self {
        self.horizon_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_alternatives(mut self, total: usize) -> Self {
        self.max_alternatives = Some(total);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteId(pub String);

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RouteId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Found,
    Unreachable,
}

/// Whether a cost came from the live reading or a forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CostBasis {
    Current,
    Predicted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CongestionStatus {
    Free,
    Moderate,
    Heavy,
    Severe,
}

impl CongestionStatus {
    pub fn from_level(congestion: f64) -> Self {
        match congestion {
            c if c < 0.25 => CongestionStatus::Free,
            c if c < 0.5 => CongestionStatus::Moderate,
            c if c < 0.75 => CongestionStatus::Heavy,
            _ => CongestionStatus::Severe,
        }
    }
}

/// Conditions a route expects on one of its segments
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentCondition {
    pub segment_id: SegmentId,
    pub speed_kmh: f64,
    pub congestion: f64,
    pub travel_time_secs: f64,
    /// Seconds from departure until the segment is entered
    pub enter_after_secs: f64,
    pub basis: CostBasis,
}

/// One path through the network with its costs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutePath {
    pub segments: Vec<SegmentId>,
    pub total_distance_m: f64,
    pub total_time_secs: f64,
    /// Objective value under the query's preference
    pub cost: f64,
    pub basis: CostBasis,
    pub congestion: CongestionStatus,
    pub conditions: Vec<SegmentCondition>,
    #[serde(skip)]
    pub geometry: LineString<f64>,
}

impl RoutePath {
    pub(crate) fn empty() -> Self {
        Self {
            segments: Vec::new(),
            total_distance_m: 0.0,
            total_time_secs: 0.0,
            cost: 0.0,
            basis: CostBasis::Current,
            congestion: CongestionStatus::Free,
            conditions: Vec::new(),
            geometry: LineString::new(Vec::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteResult {
    pub route_id: RouteId,
    pub status: RouteStatus,
    /// Optimal path; empty when unreachable or when origin equals destination
    pub route: RoutePath,
    /// Additional paths ranked by cost, optimum excluded
    pub alternatives: Vec<RoutePath>,
    pub preference: Preference,
    pub horizon_minutes: u32,
    /// Forecast generation used, if any segment was costed from a forecast
    pub forecast_generation: Option<u64>,
    /// Seconds between that generation's newest observation and this
    /// computation; forecast horizons count from that observation
    pub forecast_age_secs: Option<i64>,
    pub computed_at: DateTime<Utc>,
}

impl RouteResult {
    pub fn is_reachable(&self) -> bool {
        self.status == RouteStatus::Found
    }

    pub fn path(&self) -> &[SegmentId] {
        &self.route.segments
    }

    pub fn total_cost(&self) -> f64 {
        self.route.cost
    }
}
