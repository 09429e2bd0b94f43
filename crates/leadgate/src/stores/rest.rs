//! REST clients for the hosted stores: a Directus-style `items` API for rules and a
//! PostgREST-style API for counters, performance rows and synced traffic.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::RestStoreConfig;
use crate::workflows::admission::{
    CounterDelta, CounterKey, CounterQuery, CounterRow, CounterStore, CounterStoreError,
    CounterTotals, Rule, RuleDraft, RuleFilter, RuleId, RulePatch, RuleStore, RuleStoreError,
    SubFilter,
};
use crate::workflows::autopilot::{PerformanceError, PerformanceRow, PerformanceSource, TrafficRow};

#[derive(Debug, thiserror::Error)]
pub enum RestSetupError {
    #[error("store URL '{url}' is invalid: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unable to build store HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

fn base_url(raw: &str) -> Result<String, RestSetupError> {
    Url::parse(raw).map_err(|err| RestSetupError::InvalidUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;
    Ok(raw.trim_end_matches('/').to_string())
}

fn http_client(config: &RestStoreConfig) -> Result<reqwest::Client, RestSetupError> {
    Ok(reqwest::Client::builder().timeout(config.timeout).build()?)
}

/// Directus wraps every payload in a `data` envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Rule store backed by a Directus-style collection.
#[derive(Debug, Clone)]
pub struct RestRuleStore {
    http: reqwest::Client,
    base: String,
    token: String,
    collection: String,
}

impl RestRuleStore {
    pub fn new(config: &RestStoreConfig) -> Result<Self, RestSetupError> {
        Ok(Self {
            http: http_client(config)?,
            base: base_url(&config.rule_store_url)?,
            token: config.rule_store_token.clone(),
            collection: config.rule_collection.clone(),
        })
    }

    fn request(&self, method: Method, suffix: &str) -> RequestBuilder {
        let url = format!("{}/items/{}{}", self.base, self.collection, suffix);
        self.http.request(method, url).bearer_auth(&self.token)
    }

    fn filter_json(filter: &RuleFilter) -> Option<Value> {
        match filter {
            RuleFilter::ActiveForOffer(offer) => Some(json!({
                "_and": [
                    { "active": { "_eq": true } },
                    { "_or": [
                        { "offer_id": { "_eq": offer } },
                        { "offer_id": { "_null": true } },
                    ] },
                ]
            })),
            RuleFilter::AutoPilot => Some(json!({ "auto_pilot": { "_eq": true } })),
            RuleFilter::All => None,
        }
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RuleStoreError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RuleStoreError::NotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RuleStoreError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        let envelope: Envelope<T> = response.json().await?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl RuleStore for RestRuleStore {
    async fn list(&self, filter: RuleFilter) -> Result<Vec<Rule>, RuleStoreError> {
        let mut query = vec![
            ("limit".to_string(), "-1".to_string()),
            ("sort".to_string(), "priority".to_string()),
        ];
        if let Some(json) = Self::filter_json(&filter) {
            query.push(("filter".to_string(), json.to_string()));
        }

        let response = self.request(Method::GET, "").query(&query).send().await?;
        let mut rules: Vec<Rule> = Self::read(response).await?;
        rules.retain(|rule| filter.admits(rule));
        debug!(count = rules.len(), ?filter, "fetched rules");
        Ok(rules)
    }

    async fn create(&self, draft: RuleDraft) -> Result<Rule, RuleStoreError> {
        let response = self.request(Method::POST, "").json(&draft).send().await?;
        Self::read(response).await
    }

    async fn patch(&self, id: &RuleId, patch: RulePatch) -> Result<Rule, RuleStoreError> {
        let response = self
            .request(Method::PATCH, &format!("/{id}"))
            .json(&patch)
            .send()
            .await?;
        Self::read(response).await
    }

    async fn delete(&self, id: &RuleId) -> Result<(), RuleStoreError> {
        let response = self
            .request(Method::DELETE, &format!("/{id}"))
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RuleStoreError::NotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RuleStoreError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Shared PostgREST plumbing: base URL plus the service key sent as `apikey` and bearer.
#[derive(Debug, Clone)]
struct Postgrest {
    http: reqwest::Client,
    base: String,
    key: String,
}

impl Postgrest {
    fn new(config: &RestStoreConfig) -> Result<Self, RestSetupError> {
        Ok(Self {
            http: http_client(config)?,
            base: base_url(&config.analytics_url)?,
            key: config.analytics_key.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/rest/v1/{}", self.base, path))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }
}

/// Pass a 2xx response through, otherwise hand back its status and body.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, (u16, String)> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err((status.as_u16(), body))
}

fn counter_rejection((status, body): (u16, String)) -> CounterStoreError {
    CounterStoreError::Rejected { status, body }
}

fn performance_rejection((status, body): (u16, String)) -> PerformanceError {
    PerformanceError::Rejected { status, body }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

fn nullable_eq(value: Option<&str>) -> String {
    value.map_or_else(|| "is.null".to_string(), |value| eq(value))
}

/// Counter rows in an analytics table, incremented through the `increment_counter` RPC.
#[derive(Debug, Clone)]
pub struct RestCounterStore {
    api: Postgrest,
    table: String,
}

#[derive(Debug, Serialize)]
struct IncrementArgs<'a> {
    p_day: NaiveDate,
    p_aff: &'a str,
    p_offer: &'a str,
    p_sub: Option<&'a str>,
    p_rule: Option<&'a str>,
    p_add_total: u64,
    p_add_acc: u64,
}

#[derive(Debug, Deserialize)]
struct TotalsRow {
    #[serde(default)]
    total_leads: Option<u64>,
    #[serde(default)]
    accepted_leads: Option<u64>,
}

impl RestCounterStore {
    pub fn new(config: &RestStoreConfig) -> Result<Self, RestSetupError> {
        Ok(Self {
            api: Postgrest::new(config)?,
            table: config.counter_table.clone(),
        })
    }

    fn list_params(query: &CounterQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![("select", "*".to_string()), ("order", "day.desc".to_string())];
        if let Some(from) = query.date_from {
            params.push(("day", format!("gte.{from}")));
        }
        if let Some(to) = query.date_to {
            params.push(("day", format!("lte.{to}")));
        }
        if let Some(affiliate) = &query.affiliate_id {
            params.push(("affiliate_id", eq(affiliate)));
        }
        if let Some(offer) = &query.offer_id {
            params.push(("offer_id", eq(offer)));
        }
        match &query.sub_id {
            SubFilter::Any => {}
            SubFilter::Missing => params.push(("sub_id", "is.null".to_string())),
            SubFilter::Equals(sub) => params.push(("sub_id", eq(sub))),
        }
        if query.limit != usize::MAX {
            params.push(("limit", query.limit.to_string()));
        }
        params
    }
}

#[async_trait]
impl CounterStore for RestCounterStore {
    async fn get(&self, key: &CounterKey) -> Result<CounterTotals, CounterStoreError> {
        let params = [
            ("select", "total_leads,accepted_leads".to_string()),
            ("day", eq(key.date)),
            ("affiliate_id", eq(&key.affiliate_id)),
            ("offer_id", eq(&key.offer_id)),
            ("sub_id", nullable_eq(key.sub_id.as_deref())),
            (
                "rule_id",
                nullable_eq(key.rule_id.as_ref().map(|id| id.0.as_str())),
            ),
            ("limit", "1".to_string()),
        ];
        let response = self
            .api
            .request(Method::GET, &self.table)
            .query(&params)
            .send()
            .await?;
        let rows: Vec<TotalsRow> = ensure_success(response)
            .await
            .map_err(counter_rejection)?
            .json()
            .await?;
        Ok(rows
            .first()
            .map(|row| CounterTotals {
                total: row.total_leads.unwrap_or(0),
                accepted: row.accepted_leads.unwrap_or(0),
            })
            .unwrap_or_default())
    }

    async fn increment(
        &self,
        key: &CounterKey,
        delta: CounterDelta,
    ) -> Result<(), CounterStoreError> {
        let args = IncrementArgs {
            p_day: key.date,
            p_aff: &key.affiliate_id,
            p_offer: &key.offer_id,
            p_sub: key.sub_id.as_deref(),
            p_rule: key.rule_id.as_ref().map(|id| id.0.as_str()),
            p_add_total: delta.total(),
            p_add_acc: delta.accepted(),
        };
        let response = self
            .api
            .request(Method::POST, "rpc/increment_counter")
            .json(&args)
            .send()
            .await?;
        ensure_success(response).await.map_err(counter_rejection)?;
        Ok(())
    }

    async fn list(&self, query: &CounterQuery) -> Result<Vec<CounterRow>, CounterStoreError> {
        let response = self
            .api
            .request(Method::GET, &self.table)
            .query(&Self::list_params(query))
            .send()
            .await?;
        let rows = ensure_success(response)
            .await
            .map_err(counter_rejection)?
            .json()
            .await?;
        Ok(rows)
    }
}

/// Daily performance view plus the traffic table the counter sync writes into.
#[derive(Debug, Clone)]
pub struct RestPerformanceSource {
    api: Postgrest,
    view: String,
    traffic_table: String,
}

const PERFORMANCE_COLUMNS: &str =
    "offer_id,sub_id,margin_pct,shortform_leads,visits,affise_cost,omzet_totaal,day";
const TRAFFIC_CONFLICT_KEY: &str = "day,offer_id,sub_id,affiliate_id";

impl RestPerformanceSource {
    pub fn new(config: &RestStoreConfig) -> Result<Self, RestSetupError> {
        Ok(Self {
            api: Postgrest::new(config)?,
            view: config.performance_view.clone(),
            traffic_table: config.traffic_table.clone(),
        })
    }
}

#[async_trait]
impl PerformanceSource for RestPerformanceSource {
    async fn rows_for_day(&self, day: NaiveDate) -> Result<Vec<PerformanceRow>, PerformanceError> {
        let response = self
            .api
            .request(Method::GET, &self.view)
            .query(&[("select", PERFORMANCE_COLUMNS.to_string()), ("day", eq(day))])
            .send()
            .await?;
        let rows = ensure_success(response)
            .await
            .map_err(performance_rejection)?
            .json()
            .await?;
        Ok(rows)
    }

    async fn upsert_traffic(&self, rows: Vec<TrafficRow>) -> Result<usize, PerformanceError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let response = self
            .api
            .request(Method::POST, &self.traffic_table)
            .query(&[("on_conflict", TRAFFIC_CONFLICT_KEY)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&rows)
            .send()
            .await?;
        ensure_success(response)
            .await
            .map_err(performance_rejection)?;
        Ok(rows.len())
    }
}
