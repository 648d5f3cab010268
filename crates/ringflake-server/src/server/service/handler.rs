//! HTTP routes over the cached generator.
//!
//! - `GET /uid` returns `{"uid": <u64>}`
//! - `GET /uid/{uid}` returns the decoded fields of an id
//! - `GET /stats` returns a snapshot of the ring buffer
//! - `GET /health` returns `ok`
//!
//! An empty ring answers `503 Service Unavailable` so callers retry; every
//! other generator error is a `500`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use ringflake::{BufferStats, Error};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::config::Generator;

#[derive(Clone)]
pub struct AppState {
    generator: Arc<Generator>,
}

impl AppState {
    pub const fn new(generator: Arc<Generator>) -> Self {
        Self { generator }
    }
}

#[derive(Debug, Serialize)]
pub struct UidResponse {
    pub uid: u64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// A generator error on its way to the client.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            Error::BufferExhausted => {
                tracing::warn!("No UID ready, asking client to retry");
                StatusCode::SERVICE_UNAVAILABLE
            }
            ref e => {
                tracing::error!("UID generation failed: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/uid", get(next_uid))
        .route("/uid/{uid}", get(parse_uid))
        .route("/stats", get(stats))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

async fn next_uid(State(state): State<AppState>) -> Result<Json<UidResponse>, ApiError> {
    let uid = state.generator.get_uid()?;
    Ok(Json(UidResponse { uid }))
}

async fn parse_uid(State(state): State<AppState>, Path(uid): Path<u64>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        state.generator.parse_uid(uid),
    )
}

async fn stats(State(state): State<AppState>) -> Json<BufferStats> {
    Json(state.generator.stats())
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::service::config::Clock;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use ringflake::{StaticWorkerIdAssigner, UidConfig};
    use tower::ServiceExt;

    fn generator(worker_id: u64) -> Arc<Generator> {
        // 16 ids per second in a 16 slot ring, no ticker.
        let config = UidConfig::default()
            .with_bits(28, 31, 4)
            .with_boost_power(0)
            .with_schedule_interval_seconds(0)
            .with_padding_workers(1);
        let assigner = StaticWorkerIdAssigner(worker_id);
        Arc::new(Generator::new(&config, &assigner, Clock::default()).unwrap())
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn serves_uid_and_parses_it() {
        let generator = generator(7);
        let app = router(AppState::new(Arc::clone(&generator)));

        let (status, body) = get(app.clone(), "/uid").await;
        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        let uid = value["uid"].as_u64().unwrap();

        let (status, body) = get(app, &format!("/uid/{uid}")).await;
        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["UID"], uid.to_string());
        assert_eq!(parsed["workerId"], 7);
        assert_eq!(parsed["sequence"], 0);
    }

    #[tokio::test]
    async fn empty_ring_is_service_unavailable() {
        let generator = generator(1);
        generator.shutdown();
        while generator.get_uid().is_ok() {}

        let (status, body) = get(router(AppState::new(generator)), "/uid").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("exhausted"));
    }

    #[tokio::test]
    async fn malformed_uid_is_rejected() {
        let (status, _) = get(router(AppState::new(generator(1))), "/uid/not-a-number").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stats_and_health() {
        let app = router(AppState::new(generator(1)));

        let (status, body) = get(app.clone(), "/stats").await;
        assert_eq!(status, StatusCode::OK);
        let stats: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(stats["capacity"], 16);
        assert_eq!(stats["padding_threshold"], 8);

        let (status, body) = get(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[test]
    fn other_errors_are_internal() {
        let response = ApiError::from(Error::ClockMovedBackward { seconds: 1 }).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
