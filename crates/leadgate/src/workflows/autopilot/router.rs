use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde_json::json;
use tracing::error;

use super::controller::AutoPilotController;
use super::performance::PerformanceSource;
use crate::workflows::admission::{CounterStore, RuleStore};

/// Router builder exposing the scheduled auto-pilot tick.
pub fn autopilot_router<R, C, S>(controller: Arc<AutoPilotController<R, C, S>>) -> Router
where
    R: RuleStore + ?Sized + 'static,
    C: CounterStore + ?Sized + 'static,
    S: PerformanceSource + ?Sized + 'static,
{
    Router::new()
        .route("/api/v1/autopilot/tick", post(tick_handler::<R, C, S>))
        .with_state(controller)
}

pub(crate) async fn tick_handler<R, C, S>(
    State(controller): State<Arc<AutoPilotController<R, C, S>>>,
) -> Response
where
    R: RuleStore + ?Sized + 'static,
    C: CounterStore + ?Sized + 'static,
    S: PerformanceSource + ?Sized + 'static,
{
    match controller.tick().await {
        Ok(report) => {
            let payload = json!({
                "ok": true,
                "synced": report.synced,
                "updates": report.adjustments.len(),
                "adjustments": report.adjustments,
                "notes": report.notes,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => {
            error!(error = %err, "auto-pilot tick failed");
            let payload = json!({
                "ok": false,
                "error": err.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}
