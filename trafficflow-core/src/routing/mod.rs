//! Route optimization over graph snapshots

mod cost;
mod dijkstra;
mod optimizer;
mod query;
mod to_geojson;

pub use optimizer::RouteOptimizer;
pub use query::{
    CongestionStatus, Constraints, CostBasis, Endpoint, Preference, RouteId, RoutePath,
    RouteQuery, RouteResult, RouteStatus, SegmentCondition,
};
