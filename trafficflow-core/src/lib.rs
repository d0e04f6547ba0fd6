//! Real-time road network model, route optimizer and streaming update
//! pipeline.
//!
//! Components and their construction order:
//!
//! 1. [`GraphStore`] - owns the network and all live traffic state
//! 2. [`PredictionEngine`] - independent of the graph
//! 3. [`SubscriptionBroadcaster`]
//! 4. [`IngestionPipeline`] - needs the three above
//! 5. [`RouteOptimizer`] - needs the graph store and a forecaster
//!
//! Components share only `Arc` handles and snapshots; none of them holds a
//! lock spanning another's state.

pub mod broadcast;
mod config;
mod error;
pub mod graph;
pub mod ingest;
pub mod loading;
mod metrics;
pub mod model;
pub mod prediction;
pub mod prelude;
pub mod routing;

pub use broadcast::{Subscription, SubscriptionBroadcaster};
pub use config::{BroadcastConfig, CoreConfig, OptimizerConfig, PredictionConfig};
pub use error::Error;
pub use graph::{ApplyOutcome, GraphSnapshot, GraphStore};
pub use ingest::IngestionPipeline;
pub use metrics::{Metrics, MetricsSnapshot};
pub use model::{
    ContextEvent, IncidentReport, Intersection, NodeId, RoadSegment, SegmentId, SegmentInfo,
    SegmentState, SourceTag, TrafficSample, WeatherCondition, WeatherReport,
};
pub use prediction::{ForecastPoint, Forecaster, PredictionEngine};
pub use routing::{RouteOptimizer, RouteQuery, RouteResult};
