use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::config::AutoPilotConfig;
use crate::stores::memory::{InMemoryCounterStore, InMemoryPerformanceSource, InMemoryRuleStore};
use crate::workflows::admission::{Rule, RuleId};
use crate::workflows::autopilot::{
    AutoPilotController, PerformanceError, PerformanceRow, PerformanceSource, TrafficRow,
};

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 14, 30, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn today() -> NaiveDate {
    now().date_naive()
}

pub(super) fn pilot_rule(id: &str, offer: Option<&str>, sub: Option<&str>, percent: u8) -> Rule {
    Rule {
        id: RuleId(id.to_string()),
        affiliate_id: None,
        offer_id: offer.map(str::to_string),
        sub_id: sub.map(str::to_string),
        percent_accept: percent,
        cap_per_day: None,
        active: true,
        auto_pilot: true,
        target_margin: Some(15.0),
        min_volume: Some(20),
        min_cpc: None,
        priority: Some(100),
        created_at: None,
        description: None,
        pilot_log: None,
    }
}

pub(super) fn row(
    offer: &str,
    sub: Option<&str>,
    leads: f64,
    visits: f64,
    spend: f64,
    revenue: f64,
) -> PerformanceRow {
    PerformanceRow {
        day: today(),
        offer_id: Some(offer.to_string()),
        sub_id: sub.map(str::to_string),
        leads,
        visits,
        spend,
        revenue,
        margin_pct: None,
    }
}

pub(super) type TestController =
    AutoPilotController<InMemoryRuleStore, InMemoryCounterStore, InMemoryPerformanceSource>;

pub(super) struct Harness {
    pub(super) controller: TestController,
    pub(super) rules: Arc<InMemoryRuleStore>,
    pub(super) counters: Arc<InMemoryCounterStore>,
    pub(super) performance: Arc<InMemoryPerformanceSource>,
}

pub(super) fn harness(rules: Vec<Rule>, rows: Vec<PerformanceRow>) -> Harness {
    let rules = Arc::new(InMemoryRuleStore::with_rules(rules));
    let counters = Arc::new(InMemoryCounterStore::default());
    let performance = Arc::new(InMemoryPerformanceSource::with_rows(rows));
    let controller = AutoPilotController::new(
        rules.clone(),
        counters.clone(),
        performance.clone(),
        AutoPilotConfig::default(),
    );
    Harness {
        controller,
        rules,
        counters,
        performance,
    }
}

pub(super) fn stored(rules: &InMemoryRuleStore, id: &str) -> Rule {
    rules
        .snapshot()
        .into_iter()
        .find(|rule| rule.id.0 == id)
        .expect("rule stored")
}

pub(super) struct OfflineAnalytics;

#[async_trait]
impl PerformanceSource for OfflineAnalytics {
    async fn rows_for_day(&self, _day: NaiveDate) -> Result<Vec<PerformanceRow>, PerformanceError> {
        Err(PerformanceError::Unavailable("analytics offline".to_string()))
    }

    async fn upsert_traffic(&self, _rows: Vec<TrafficRow>) -> Result<usize, PerformanceError> {
        Err(PerformanceError::Unavailable("analytics offline".to_string()))
    }
}
