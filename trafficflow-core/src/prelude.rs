// Re-export key components
pub use crate::broadcast::{
    Interest, MemoryTransport, Notification, SegmentChange, SendOutcome, SubscriberTransport,
    Subscription, SubscriptionBroadcaster,
};
pub use crate::ingest::{
    EventOutcome, EventSource, IngestReport, IngestionPipeline, LineSource, VecSource,
};
pub use crate::loading::{NetworkDefinition, NodeDefinition, SegmentDefinition};
pub use crate::prediction::{
    EngineState, FixedForecaster, ForecastPoint, Forecaster, PredictionEngine, RetrainReport,
};
pub use crate::routing::{
    Constraints, CostBasis, Endpoint, Preference, RouteId, RouteOptimizer, RouteQuery,
    RouteResult, RouteStatus,
};
pub use crate::{
    ApplyOutcome, CoreConfig, Error, GraphSnapshot, GraphStore, Metrics, NodeId, SegmentId,
    SegmentState, TrafficSample,
};
