//! Token-guarded administration passthrough for rules and counters.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::AdminConfig;
use crate::workflows::admission::{
    CounterQuery, CounterStore, RuleDraft, RuleFilter, RuleId, RulePatch, RuleStore,
    RuleStoreError, SubFilter,
};
use crate::workflows::autopilot::{CounterSync, PerformanceSource};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

const DEFAULT_SYNC_DAYS: u32 = 5;
const MAX_SYNC_DAYS: u32 = 366;

/// Collaborators reachable from the administration surface.
#[derive(Clone)]
pub struct AdminState {
    rules: Arc<dyn RuleStore>,
    counters: Arc<dyn CounterStore>,
    sync: Arc<CounterSync<dyn CounterStore, dyn PerformanceSource>>,
    token: Option<String>,
}

impl AdminState {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        counters: Arc<dyn CounterStore>,
        performance: Arc<dyn PerformanceSource>,
        config: &AdminConfig,
    ) -> Self {
        Self {
            rules,
            sync: Arc::new(CounterSync::new(counters.clone(), performance)),
            counters,
            token: config.token.clone(),
        }
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), Response> {
        let presented = headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim);
        match (&self.token, presented) {
            (Some(expected), Some(presented)) if expected == presented => Ok(()),
            _ => {
                let payload = json!({ "ok": false, "error": "forbidden" });
                Err((StatusCode::FORBIDDEN, axum::Json(payload)).into_response())
            }
        }
    }
}

pub fn admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/api/v1/rules", get(list_rules).post(create_rule))
        .route("/api/v1/rules/:id", patch(patch_rule).delete(delete_rule))
        .route("/api/v1/counters", get(list_counters))
        .route("/api/v1/counters/sync", post(sync_counters))
        .with_state(state)
}

fn rule_store_failure(err: RuleStoreError) -> Response {
    let status = match &err {
        RuleStoreError::NotFound => StatusCode::NOT_FOUND,
        RuleStoreError::Rejected { status, .. } if *status < 500 => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        _ => StatusCode::BAD_GATEWAY,
    };
    let payload = json!({ "ok": false, "error": err.to_string() });
    (status, axum::Json(payload)).into_response()
}

fn upstream_failure(err: impl std::fmt::Display) -> Response {
    let payload = json!({ "ok": false, "error": err.to_string() });
    (StatusCode::BAD_GATEWAY, axum::Json(payload)).into_response()
}

async fn list_rules(State(state): State<AdminState>, headers: HeaderMap) -> Response {
    if let Err(denied) = state.authorize(&headers) {
        return denied;
    }
    match state.rules.list(RuleFilter::All).await {
        Ok(items) => (StatusCode::OK, axum::Json(json!({ "ok": true, "items": items })))
            .into_response(),
        Err(err) => rule_store_failure(err),
    }
}

async fn create_rule(
    State(state): State<AdminState>,
    headers: HeaderMap,
    axum::Json(draft): axum::Json<RuleDraft>,
) -> Response {
    if let Err(denied) = state.authorize(&headers) {
        return denied;
    }
    match state.rules.create(draft).await {
        Ok(item) => {
            info!(rule_id = %item.id, "rule created");
            (
                StatusCode::CREATED,
                axum::Json(json!({ "ok": true, "item": item })),
            )
                .into_response()
        }
        Err(err) => rule_store_failure(err),
    }
}

async fn patch_rule(
    State(state): State<AdminState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    axum::Json(patch): axum::Json<RulePatch>,
) -> Response {
    if let Err(denied) = state.authorize(&headers) {
        return denied;
    }
    match state.rules.patch(&RuleId(id), patch).await {
        Ok(item) => {
            info!(rule_id = %item.id, "rule updated");
            (StatusCode::OK, axum::Json(json!({ "ok": true, "item": item }))).into_response()
        }
        Err(err) => rule_store_failure(err),
    }
}

async fn delete_rule(
    State(state): State<AdminState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = state.authorize(&headers) {
        return denied;
    }
    let id = RuleId(id);
    match state.rules.delete(&id).await {
        Ok(()) => {
            info!(rule_id = %id, "rule deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => rule_store_failure(err),
    }
}

#[derive(Debug, Default, Deserialize)]
struct CounterListParams {
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
    affiliate_id: Option<String>,
    offer_id: Option<String>,
    sub_id: Option<String>,
    limit: Option<usize>,
}

impl From<CounterListParams> for CounterQuery {
    fn from(params: CounterListParams) -> Self {
        let defaults = CounterQuery::default();
        let non_empty = |value: Option<String>| {
            value
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };
        CounterQuery {
            date_from: params.date_from,
            date_to: params.date_to,
            affiliate_id: non_empty(params.affiliate_id),
            offer_id: non_empty(params.offer_id),
            sub_id: SubFilter::parse(params.sub_id.as_deref()),
            limit: params.limit.filter(|limit| *limit > 0).unwrap_or(defaults.limit),
        }
    }
}

async fn list_counters(
    State(state): State<AdminState>,
    headers: HeaderMap,
    Query(params): Query<CounterListParams>,
) -> Response {
    if let Err(denied) = state.authorize(&headers) {
        return denied;
    }
    let query = CounterQuery::from(params);
    match state.counters.list(&query).await {
        Ok(items) => (StatusCode::OK, axum::Json(json!({ "ok": true, "items": items })))
            .into_response(),
        Err(err) => upstream_failure(err),
    }
}

#[derive(Debug, Default, Deserialize)]
struct SyncParams {
    offset: Option<u32>,
    limit: Option<u32>,
}

async fn sync_counters(
    State(state): State<AdminState>,
    headers: HeaderMap,
    Query(params): Query<SyncParams>,
) -> Response {
    if let Err(denied) = state.authorize(&headers) {
        return denied;
    }
    let offset = params.offset.unwrap_or(0);
    let limit = params
        .limit
        .filter(|limit| *limit > 0)
        .unwrap_or(DEFAULT_SYNC_DAYS)
        .min(MAX_SYNC_DAYS);

    info!(offset, limit, "syncing counter history");
    match state
        .sync
        .sync_history(Utc::now().date_naive(), offset, limit)
        .await
    {
        Ok(total_rows) => {
            let payload = json!({
                "ok": true,
                "message": format!("synced {limit} days (offset {offset})"),
                "total_rows": total_rows,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => {
            warn!(error = %err, "counter history sync failed");
            upstream_failure(err)
        }
    }
}
