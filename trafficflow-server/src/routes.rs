use axum::error_handling::HandleErrorLayer;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{BoxError, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower::limit::ConcurrencyLimitLayer;
use tower::timeout::TimeoutLayer;
use tower::timeout::error::Elapsed;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use trafficflow_core::prelude::*;
use trafficflow_core::{MetricsSnapshot, SourceTag};

use crate::config::HttpConfig;
use crate::error::ApiError;
use crate::state::AppState;
use crate::ws;

pub fn router(state: AppState, config: &HttpConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/traffic/current", get(current_traffic))
        .route("/api/routes/optimize", post(optimize_route))
        .route("/api/predictions/traffic", post(predict_traffic))
        .route("/ws", get(ws::upgrade))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .layer(TimeoutLayer::new(config.request_timeout()))
                .layer(ConcurrencyLimitLayer::new(config.concurrency_limit.max(1))),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn handle_middleware_error(err: BoxError) -> (StatusCode, Json<Value>) {
    if err.is::<Elapsed>() {
        (
            StatusCode::REQUEST_TIMEOUT,
            Json(json!({ "error": "request timed out" })),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": err.to_string() })),
        )
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let model = state.engine.model();
    Json(json!({
        "status": "ok",
        "nodes": state.graph.node_count(),
        "segments": state.graph.segment_count(),
        "subscribers": state.broadcaster.subscriber_count(),
        "forecast_generation": model.generation(),
        "forecast_segments": model.len(),
        "prediction_engine": state.engine.state(),
    }))
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

#[derive(Debug, Deserialize)]
struct CurrentQuery {
    /// Comma separated segment ids; all segments when absent
    segments: Option<String>,
}

#[derive(Debug, Serialize)]
struct SegmentReport {
    segment_id: SegmentId,
    speed_kmh: f64,
    congestion: f64,
    last_update: Option<DateTime<Utc>>,
    source: SourceTag,
}

impl SegmentReport {
    fn new(segment_id: SegmentId, state: &SegmentState) -> Self {
        Self {
            segment_id,
            speed_kmh: state.speed_kmh,
            congestion: state.congestion,
            last_update: state.last_update,
            source: state.source,
        }
    }
}

async fn current_traffic(
    State(state): State<AppState>,
    Query(query): Query<CurrentQuery>,
) -> Result<Json<Vec<SegmentReport>>, ApiError> {
    let snapshot = state.graph.snapshot();
    let reports = match query.segments.as_deref() {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| {
                let segment = snapshot.segment(&SegmentId::from(id))?;
                Ok(SegmentReport::new(segment.info.id, &segment.state))
            })
            .collect::<Result<Vec<_>, trafficflow_core::Error>>()?,
        None => snapshot
            .segments()
            .map(|(info, segment_state)| SegmentReport::new(info.id.clone(), segment_state))
            .collect(),
    };
    Ok(Json(reports))
}

#[derive(Debug, Default, Deserialize)]
struct OptimizeParams {
    /// `geojson` returns a feature collection instead of the route document
    format: Option<String>,
}

async fn optimize_route(
    State(state): State<AppState>,
    Query(params): Query<OptimizeParams>,
    Json(query): Json<RouteQuery>,
) -> Result<Response, ApiError> {
    let optimizer = state.optimizer.clone();
    let result = tokio::task::spawn_blocking(move || optimizer.optimize(&query)).await??;

    if result.is_reachable() {
        state.broadcaster.register_route(
            result.route_id.clone(),
            result.route.segments.iter().cloned(),
        );
    }

    if params.format.as_deref() == Some("geojson") {
        return Ok(Json(result.to_geojson()?).into_response());
    }
    Ok(Json(result).into_response())
}

#[derive(Debug, Deserialize)]
struct PredictionRequest {
    segment_ids: Vec<SegmentId>,
    #[serde(default)]
    horizon_minutes: u32,
}

#[derive(Debug, Serialize)]
struct PredictionResponse {
    generation: u64,
    trained_at: DateTime<Utc>,
    points: Vec<ForecastPoint>,
}

async fn predict_traffic(
    State(state): State<AppState>,
    Json(request): Json<PredictionRequest>,
) -> Json<PredictionResponse> {
    let model = state.engine.model();
    let points = state
        .engine
        .forecast(&request.segment_ids, request.horizon_minutes);
    Json(PredictionResponse {
        generation: points.first().map_or(model.generation(), |p| p.generation),
        trained_at: model.trained_at(),
        points,
    })
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tokio::sync::watch;
    use tower::ServiceExt;

    use super::*;

    fn test_state() -> AppState {
        state_with(&CoreConfig::default())
    }

    fn state_with(config: &CoreConfig) -> AppState {
        let graph = GraphStore::load(
            vec![
                NodeDefinition::new("A", 0.0, 0.0),
                NodeDefinition::new("B", 0.001, 0.0),
                NodeDefinition::new("C", 0.002, 0.0),
            ],
            vec![
                SegmentDefinition::new("ab", "A", "B", 100.0, 36.0),
                SegmentDefinition::new("bc", "B", "C", 50.0, 36.0),
                SegmentDefinition::new("ac", "A", "C", 200.0, 36.0),
            ],
        )
        .unwrap();
        let (_tx, rx) = watch::channel(false);
        AppState::build(graph, config, 8, rx).0
    }

    async fn call(state: AppState, request: Request<Body>) -> (StatusCode, Value) {
        let app = router(state, &HttpConfig::default());
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_network_size() {
        let (status, body) = call(
            test_state(),
            Request::get("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["nodes"], 3);
        assert_eq!(body["segments"], 3);
        assert_eq!(body["forecast_generation"], 0);
    }

    #[tokio::test]
    async fn optimize_returns_route_and_registers_it() {
        let state = test_state();
        let (status, body) = call(
            state.clone(),
            post_json(
                "/api/routes/optimize",
                json!({ "origin": "A", "destination": "C" }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "found");
        assert_eq!(body["route"]["segments"], json!(["ab", "bc"]));
        assert_eq!(state.metrics.snapshot().route_queries, 1);
    }

    #[tokio::test]
    async fn repeated_optimize_keeps_route_registry_bounded() {
        let mut config = CoreConfig::default();
        config.broadcast.max_routes = 2;
        let state = state_with(&config);

        for _ in 0..5 {
            let (status, _) = call(
                state.clone(),
                post_json(
                    "/api/routes/optimize",
                    json!({ "origin": "A", "destination": "C" }),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }
        assert_eq!(state.metrics.snapshot().route_queries, 5);
        assert_eq!(state.broadcaster.route_count(), 2);
    }

    #[tokio::test]
    async fn optimize_accepts_coordinates_and_geojson_output() {
        let (status, body) = call(
            test_state(),
            post_json(
                "/api/routes/optimize?format=geojson",
                json!({
                    "origin": { "lon": 0.0, "lat": 0.0 },
                    "destination": { "lon": 0.002, "lat": 0.0 },
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "FeatureCollection");
        assert_eq!(body["features"][0]["properties"]["rank"], 0);
    }

    #[tokio::test]
    async fn unknown_node_is_404() {
        let (status, body) = call(
            test_state(),
            post_json(
                "/api/routes/optimize",
                json!({ "origin": "A", "destination": "Z" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains('Z'));
    }

    #[tokio::test]
    async fn current_traffic_filters_segments() {
        let state = test_state();
        let (status, body) = call(
            state.clone(),
            Request::get("/api/traffic/current?segments=ab,bc")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[0]["segment_id"], "ab");
        assert_eq!(body[0]["speed_kmh"], 36.0);

        let (status, _) = call(
            state,
            Request::get("/api/traffic/current?segments=nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn predictions_omit_untrained_segments() {
        let (status, body) = call(
            test_state(),
            post_json(
                "/api/predictions/traffic",
                json!({ "segment_ids": ["ab"], "horizon_minutes": 30 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["generation"], 0);
        assert_eq!(body["points"], json!([]));
    }
}
