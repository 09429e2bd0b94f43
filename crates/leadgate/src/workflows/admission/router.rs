use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::counters::CounterStore;
use super::decision::{Decision, DecisionRecord};
use super::domain::{deserialize_dimension, LeadSubmission, Targeting};
use super::engine::{AdmissionEngine, AdmissionError};
use super::postback::PostbackGateway;
use super::repository::RuleStore;

/// Router builder exposing the lead decision and rule resolution endpoints.
pub fn admission_router<R, C, P>(engine: Arc<AdmissionEngine<R, C, P>>) -> Router
where
    R: RuleStore + ?Sized + 'static,
    C: CounterStore + ?Sized + 'static,
    P: PostbackGateway + ?Sized + 'static,
{
    Router::new()
        .route("/api/v1/leads/decide", post(decide_handler::<R, C, P>))
        .route("/api/lead-optimize", post(decide_handler::<R, C, P>))
        .route("/api/v1/rules/resolve", get(resolve_handler::<R, C, P>))
        .with_state(engine)
}

#[derive(Debug, Serialize)]
pub(crate) struct DecisionResponse {
    pub(crate) ok: bool,
    #[serde(flatten)]
    pub(crate) record: DecisionRecord,
}

/// Every non-validation failure still answers 200 with a reject so the pipeline never stalls.
pub(crate) async fn decide_handler<R, C, P>(
    State(engine): State<Arc<AdmissionEngine<R, C, P>>>,
    axum::Json(submission): axum::Json<LeadSubmission>,
) -> Response
where
    R: RuleStore + ?Sized + 'static,
    C: CounterStore + ?Sized + 'static,
    P: PostbackGateway + ?Sized + 'static,
{
    match engine.submit(submission).await {
        Ok(record) => {
            (StatusCode::OK, axum::Json(DecisionResponse { ok: true, record })).into_response()
        }
        Err(AdmissionError::Validation(error)) => {
            let payload = json!({
                "ok": false,
                "error": error.to_string(),
            });
            (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
        }
        Err(other) => {
            error!(error = %other, "lead decision degraded to reject");
            let payload = json!({
                "ok": false,
                "decision": Decision::Reject,
                "reason": other.reason(),
                "error": other.to_string(),
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ResolveQuery {
    #[serde(default, deserialize_with = "deserialize_dimension")]
    affiliate_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_dimension")]
    offer_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_dimension")]
    sub_id: Option<String>,
}

pub(crate) async fn resolve_handler<R, C, P>(
    State(engine): State<Arc<AdmissionEngine<R, C, P>>>,
    Query(query): Query<ResolveQuery>,
) -> Response
where
    R: RuleStore + ?Sized + 'static,
    C: CounterStore + ?Sized + 'static,
    P: PostbackGateway + ?Sized + 'static,
{
    if query.affiliate_id.is_none() || query.offer_id.is_none() {
        let payload = json!({
            "ok": false,
            "error": "need affiliate_id & offer_id in query",
        });
        return (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response();
    }

    let target = Targeting {
        affiliate_id: query.affiliate_id.as_deref(),
        offer_id: query.offer_id.as_deref(),
        sub_id: query.sub_id.as_deref(),
    };

    match engine.resolve(target).await {
        Ok(resolution) => {
            let payload = json!({
                "ok": true,
                "query": {
                    "affiliate_id": query.affiliate_id,
                    "offer_id": query.offer_id,
                    "sub_id": query.sub_id,
                },
                "candidate_count": resolution.candidates.len(),
                "candidates": resolution.candidates,
                "selected": resolution.selected,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(other) => {
            let payload = json!({
                "ok": false,
                "error": other.to_string(),
            });
            (StatusCode::BAD_GATEWAY, axum::Json(payload)).into_response()
        }
    }
}
