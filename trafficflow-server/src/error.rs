use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;
use trafficflow_core::Error;

/// Error returned by request handlers
#[derive(Debug)]
pub enum ApiError {
    Core(Error),
    /// A blocking task panicked or was cancelled
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Core(err)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Core(Error::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Core(Error::InvalidQuery(_) | Error::InvalidSample(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Core(Error::OptimizationTimeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Core(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Core(err) => err.to_string(),
            ApiError::Internal(msg) => msg.clone(),
        };
        if status.is_server_error() {
            error!("Request failed: {message}");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}
