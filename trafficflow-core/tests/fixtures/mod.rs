//! Shared builders for integration tests
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use trafficflow_core::prelude::*;
use trafficflow_core::{OptimizerConfig, SourceTag};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
}

pub fn at_minute(minute: i64) -> DateTime<Utc> {
    base_time() + Duration::minutes(minute)
}

pub fn node(id: &str, lon: f64) -> NodeDefinition {
    NodeDefinition::new(id, lon, 0.0)
}

/// Segment whose travel time in seconds equals `secs` at its speed limit
/// (length = 10 m per second at 36 km/h)
pub fn timed(id: &str, from: &str, to: &str, secs: f64) -> SegmentDefinition {
    SegmentDefinition::new(id, from, to, secs * 10.0, 36.0)
}

pub fn sample(segment: &str, speed: f64, congestion: f64, minute: i64) -> TrafficSample {
    TrafficSample {
        segment_id: SegmentId::from(segment),
        speed_kmh: speed,
        congestion,
        timestamp: at_minute(minute),
        source: SourceTag::Sensor,
    }
}

pub fn traffic_payload(segment: &str, speed: f64, congestion: f64, minute: i64) -> Vec<u8> {
    format!(
        r#"{{"kind":"traffic","segment_id":"{segment}","speed_kmh":{speed},"congestion":{congestion},"timestamp":"{}"}}"#,
        at_minute(minute).to_rfc3339()
    )
    .into_bytes()
}

/// A -> B (10 s), B -> C (5 s), A -> C (20 s), plus an isolated node D
pub fn triangle() -> GraphStore {
    GraphStore::load(
        vec![node("A", 0.0), node("B", 0.001), node("C", 0.002), node("D", 0.5)],
        vec![
            timed("ab", "A", "B", 10.0),
            timed("bc", "B", "C", 5.0),
            timed("ac", "A", "C", 20.0),
        ],
    )
    .unwrap()
}

pub fn optimizer_with(
    graph: Arc<GraphStore>,
    forecaster: Arc<dyn Forecaster>,
    config: OptimizerConfig,
) -> RouteOptimizer {
    RouteOptimizer::new(graph, forecaster, config, Arc::new(Metrics::default()))
}

pub fn optimizer(graph: GraphStore) -> RouteOptimizer {
    optimizer_with(
        Arc::new(graph),
        Arc::new(FixedForecaster::new(base_time(), [])),
        OptimizerConfig::default(),
    )
}

pub fn ids(segments: &[&str]) -> Vec<SegmentId> {
    segments.iter().map(|s| SegmentId::from(*s)).collect()
}
