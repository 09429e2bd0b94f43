use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::config::AdmissionConfig;
use crate::stores::memory::{InMemoryCounterStore, InMemoryRuleStore};
use crate::workflows::admission::{
    AdmissionEngine, CounterDelta, CounterKey, CounterQuery, CounterRow, CounterStore,
    CounterStoreError, CounterTotals, Lead, PostbackGateway, PostbackOutcome, Rule, RuleDraft,
    RuleFilter, RuleId, RulePatch, RuleStore, RuleStoreError,
};

pub(super) const SECRET: &str = "test-secret";

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 1).expect("valid date")
}

pub(super) fn created(day: u32) -> Option<DateTime<Utc>> {
    Some(
        Utc.with_ymd_and_hms(2026, 1, day, 9, 0, 0)
            .single()
            .expect("valid timestamp"),
    )
}

pub(super) fn admission_config() -> AdmissionConfig {
    AdmissionConfig {
        hash_secret: SECRET.to_string(),
        decision_deadline: Duration::from_secs(2),
    }
}

pub(super) fn rule(
    id: &str,
    affiliate: Option<&str>,
    offer: Option<&str>,
    sub: Option<&str>,
    percent: u8,
) -> Rule {
    Rule {
        id: RuleId(id.to_string()),
        affiliate_id: affiliate.map(str::to_string),
        offer_id: offer.map(str::to_string),
        sub_id: sub.map(str::to_string),
        percent_accept: percent,
        cap_per_day: None,
        active: true,
        auto_pilot: false,
        target_margin: None,
        min_volume: None,
        min_cpc: None,
        priority: Some(100),
        created_at: created(1),
        description: None,
        pilot_log: None,
    }
}

/// Lead from affiliate `A1` on offer `42`.
///
/// Buckets under [`SECRET`] with sub `S9`: L1 31, L2 19, L3 81, L4 73, L14 4, L17 2.
/// Buckets without a sub: L1 4, L2 92, L3 4, L14 44.
pub(super) fn lead(id: &str, sub: Option<&str>, click: Option<&str>) -> Lead {
    Lead {
        lead_id: id.to_string(),
        affiliate_id: "A1".to_string(),
        offer_id: "42".to_string(),
        sub_id: sub.map(str::to_string),
        click_id: click.map(str::to_string),
    }
}

pub(super) fn rule_key(lead: &Lead, rule_id: &str) -> CounterKey {
    CounterKey::for_lead(today(), lead, Some(&RuleId(rule_id.to_string())))
}

pub(super) type TestEngine =
    AdmissionEngine<InMemoryRuleStore, InMemoryCounterStore, ScriptedPostback>;

pub(super) fn build_engine(
    rules: Vec<Rule>,
    postback: ScriptedPostback,
) -> (TestEngine, Arc<InMemoryCounterStore>, Arc<ScriptedPostback>) {
    let counters = Arc::new(InMemoryCounterStore::default());
    let postback = Arc::new(postback);
    let engine = AdmissionEngine::new(
        Arc::new(InMemoryRuleStore::with_rules(rules)),
        counters.clone(),
        postback.clone(),
        admission_config(),
    );
    (engine, counters, postback)
}

/// Postback double that answers every call with the same outcome and records the click ids.
pub(super) struct ScriptedPostback {
    outcome: PostbackOutcome,
    calls: Mutex<Vec<String>>,
}

impl ScriptedPostback {
    pub(super) fn delivering() -> Self {
        Self::answering(PostbackOutcome::Delivered {
            status: 200,
            attempts: 1,
        })
    }

    pub(super) fn failing() -> Self {
        Self::answering(PostbackOutcome::Failed {
            detail: "postback returned HTTP 503".to_string(),
            attempts: 3,
        })
    }

    fn answering(outcome: PostbackOutcome) -> Self {
        Self {
            outcome,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("postback mutex poisoned").clone()
    }
}

#[async_trait]
impl PostbackGateway for ScriptedPostback {
    async fn forward(&self, click_id: &str) -> PostbackOutcome {
        self.calls
            .lock()
            .expect("postback mutex poisoned")
            .push(click_id.to_string());
        self.outcome.clone()
    }
}

pub(super) struct UnavailableRules;

#[async_trait]
impl RuleStore for UnavailableRules {
    async fn list(&self, _filter: RuleFilter) -> Result<Vec<Rule>, RuleStoreError> {
        Err(RuleStoreError::Unavailable("directus offline".to_string()))
    }

    async fn create(&self, _draft: RuleDraft) -> Result<Rule, RuleStoreError> {
        Err(RuleStoreError::Unavailable("directus offline".to_string()))
    }

    async fn patch(&self, _id: &RuleId, _patch: RulePatch) -> Result<Rule, RuleStoreError> {
        Err(RuleStoreError::Unavailable("directus offline".to_string()))
    }

    async fn delete(&self, _id: &RuleId) -> Result<(), RuleStoreError> {
        Err(RuleStoreError::Unavailable("directus offline".to_string()))
    }
}

/// Rule store that answers only after a delay longer than any test deadline.
pub(super) struct StalledRules;

#[async_trait]
impl RuleStore for StalledRules {
    async fn list(&self, _filter: RuleFilter) -> Result<Vec<Rule>, RuleStoreError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }

    async fn create(&self, _draft: RuleDraft) -> Result<Rule, RuleStoreError> {
        Err(RuleStoreError::Unavailable("stalled".to_string()))
    }

    async fn patch(&self, _id: &RuleId, _patch: RulePatch) -> Result<Rule, RuleStoreError> {
        Err(RuleStoreError::Unavailable("stalled".to_string()))
    }

    async fn delete(&self, _id: &RuleId) -> Result<(), RuleStoreError> {
        Err(RuleStoreError::Unavailable("stalled".to_string()))
    }
}

/// Counter store whose writes always fail; reads see empty totals.
pub(super) struct ReadOnlyCounters;

#[async_trait]
impl CounterStore for ReadOnlyCounters {
    async fn get(&self, _key: &CounterKey) -> Result<CounterTotals, CounterStoreError> {
        Ok(CounterTotals::default())
    }

    async fn increment(
        &self,
        _key: &CounterKey,
        _delta: CounterDelta,
    ) -> Result<(), CounterStoreError> {
        Err(CounterStoreError::Rejected {
            status: 503,
            body: "rpc unavailable".to_string(),
        })
    }

    async fn list(&self, _query: &CounterQuery) -> Result<Vec<CounterRow>, CounterStoreError> {
        Ok(Vec::new())
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
