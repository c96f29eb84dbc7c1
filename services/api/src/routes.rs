use crate::infra::AppState;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use axum::Json;
use mipaseo::walks::{walk_router, Directory, RequestStore, ReviewStore, WalkApiState};
use serde_json::json;
use std::time::Duration;
use tracing::warn;

/// Walk and review endpoints plus health, readiness and metrics, all under one request deadline.
pub(crate) fn with_walk_routes<R, V, D>(
    api: WalkApiState<R, V, D>,
    request_timeout: Duration,
) -> axum::Router
where
    R: RequestStore + 'static,
    V: ReviewStore + 'static,
    D: Directory + 'static,
{
    walk_router(api)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .layer(middleware::from_fn_with_state(
            request_timeout,
            enforce_deadline,
        ))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// A request that outlives the deadline is answered with 503 and may be retried.
pub(crate) async fn enforce_deadline(
    State(limit): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(%path, timeout_ms = limit.as_millis() as u64, "request timed out");
            let body = Json(json!({
                "error": "request timed out",
                "kind": "timeout",
            }));
            (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
        }
    }
}
