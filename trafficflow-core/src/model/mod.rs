//! Data model for the live road network
//!
//! Contains identifiers, segment descriptions, their mutable traffic state,
//! and the measurements that update it.

pub mod network;
pub mod sample;

pub use network::{
    Intersection, NodeId, RoadSegment, SegmentId, SegmentInfo, SegmentState, SourceTag,
};
pub use sample::{ContextEvent, IncidentReport, TrafficSample, WeatherCondition, WeatherReport};
