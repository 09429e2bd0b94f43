use crate::infra::{AppState, Collaborators};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use leadgate::config::AppConfig;
use leadgate::workflows::admin::admin_router;
use leadgate::workflows::admission::admission_router;
use leadgate::workflows::autopilot::autopilot_router;
use serde_json::json;
use std::sync::Arc;

/// Lead decisions, auto-pilot ticks, the admin surface and the service probes on one router.
pub(crate) fn with_application_routes(
    collaborators: &Collaborators,
    config: &AppConfig,
) -> axum::Router {
    let engine = Arc::new(collaborators.engine(config));
    let controller = Arc::new(collaborators.controller(config));

    admission_router(engine)
        .merge(autopilot_router(controller))
        .merge(admin_router(collaborators.admin_state(config)))
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
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
