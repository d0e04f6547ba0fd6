use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed network: {0}")]
    MalformedNetwork(String),
    #[error("Invalid sample: {0}")]
    InvalidSample(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Route search exceeded its budget of {0:?}")]
    OptimizationTimeout(Duration),
    #[error("Retrain failed: {0}")]
    RetrainFailure(String),
    #[error("Retrain already in progress")]
    RetrainInProgress,
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
}
