//! In-process collaborators used in development mode and by tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use crate::workflows::admission::{
    CounterDelta, CounterKey, CounterQuery, CounterRow, CounterStore, CounterStoreError,
    CounterTotals, DecisionLedger, DecisionRecord, LedgerError, Rule, RuleDraft, RuleFilter,
    RuleId, RulePatch, RuleStore, RuleStoreError,
};
use crate::workflows::autopilot::{PerformanceError, PerformanceRow, PerformanceSource, TrafficRow};

#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    rules: Mutex<Vec<Rule>>,
    sequence: AtomicU64,
}

impl InMemoryRuleStore {
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self {
            rules: Mutex::new(rules),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> Vec<Rule> {
        self.rules
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn next_id(&self, existing: &[Rule]) -> RuleId {
        loop {
            let candidate = RuleId(format!(
                "rule-{:04}",
                self.sequence.fetch_add(1, Ordering::Relaxed) + 1
            ));
            if existing.iter().all(|rule| rule.id != candidate) {
                return candidate;
            }
        }
    }
}

fn poisoned(what: &str) -> String {
    format!("{what} lock poisoned")
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn list(&self, filter: RuleFilter) -> Result<Vec<Rule>, RuleStoreError> {
        let guard = self
            .rules
            .lock()
            .map_err(|_| RuleStoreError::Unavailable(poisoned("rule store")))?;
        let mut rules: Vec<Rule> = guard
            .iter()
            .filter(|rule| filter.admits(rule))
            .cloned()
            .collect();
        if filter == RuleFilter::All {
            rules.sort_by_key(|rule| rule.priority.unwrap_or(100));
        }
        Ok(rules)
    }

    async fn create(&self, draft: RuleDraft) -> Result<Rule, RuleStoreError> {
        let mut guard = self
            .rules
            .lock()
            .map_err(|_| RuleStoreError::Unavailable(poisoned("rule store")))?;
        let rule = Rule {
            id: self.next_id(&guard),
            affiliate_id: draft.affiliate_id,
            offer_id: draft.offer_id,
            sub_id: draft.sub_id,
            percent_accept: draft.percent_accept.min(100),
            cap_per_day: draft.cap_per_day,
            active: draft.active,
            auto_pilot: draft.auto_pilot,
            target_margin: draft.target_margin,
            min_volume: draft.min_volume,
            min_cpc: draft.min_cpc,
            priority: Some(draft.priority),
            created_at: Some(Utc::now()),
            description: draft.description,
            pilot_log: None,
        };
        guard.push(rule.clone());
        Ok(rule)
    }

    async fn patch(&self, id: &RuleId, patch: RulePatch) -> Result<Rule, RuleStoreError> {
        let mut guard = self
            .rules
            .lock()
            .map_err(|_| RuleStoreError::Unavailable(poisoned("rule store")))?;
        let rule = guard
            .iter_mut()
            .find(|rule| &rule.id == id)
            .ok_or(RuleStoreError::NotFound)?;
        patch.apply_to(rule);
        Ok(rule.clone())
    }

    async fn delete(&self, id: &RuleId) -> Result<(), RuleStoreError> {
        let mut guard = self
            .rules
            .lock()
            .map_err(|_| RuleStoreError::Unavailable(poisoned("rule store")))?;
        let before = guard.len();
        guard.retain(|rule| &rule.id != id);
        if guard.len() == before {
            return Err(RuleStoreError::NotFound);
        }
        Ok(())
    }
}

/// Counter map guarded by one lock, so each increment is applied atomically.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    counters: Mutex<BTreeMap<CounterKey, CounterTotals>>,
}

impl InMemoryCounterStore {
    pub fn totals(&self, key: &CounterKey) -> CounterTotals {
        self.counters
            .lock()
            .ok()
            .and_then(|guard| guard.get(key).copied())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get(&self, key: &CounterKey) -> Result<CounterTotals, CounterStoreError> {
        let guard = self
            .counters
            .lock()
            .map_err(|_| CounterStoreError::Unavailable(poisoned("counter store")))?;
        Ok(guard.get(key).copied().unwrap_or_default())
    }

    async fn increment(
        &self,
        key: &CounterKey,
        delta: CounterDelta,
    ) -> Result<(), CounterStoreError> {
        let mut guard = self
            .counters
            .lock()
            .map_err(|_| CounterStoreError::Unavailable(poisoned("counter store")))?;
        guard.entry(key.clone()).or_default().add(delta);
        Ok(())
    }

    async fn list(&self, query: &CounterQuery) -> Result<Vec<CounterRow>, CounterStoreError> {
        let guard = self
            .counters
            .lock()
            .map_err(|_| CounterStoreError::Unavailable(poisoned("counter store")))?;
        let mut rows: Vec<CounterRow> = guard
            .iter()
            .map(|(key, totals)| CounterRow {
                date: key.date,
                affiliate_id: key.affiliate_id.clone(),
                offer_id: key.offer_id.clone(),
                sub_id: key.sub_id.clone(),
                rule_id: key.rule_id.clone(),
                total_leads: totals.total,
                accepted_leads: totals.accepted,
            })
            .filter(|row| query.admits(row))
            .collect();
        rows.sort_by(|left, right| right.date.cmp(&left.date));
        rows.truncate(query.limit);
        Ok(rows)
    }
}

/// Analytics stand-in: serves seeded performance rows and keeps synced traffic rows.
#[derive(Debug, Default)]
pub struct InMemoryPerformanceSource {
    rows: Mutex<Vec<PerformanceRow>>,
    traffic: Mutex<BTreeMap<(NaiveDate, String, Option<String>, String), TrafficRow>>,
}

impl InMemoryPerformanceSource {
    pub fn with_rows(rows: Vec<PerformanceRow>) -> Self {
        Self {
            rows: Mutex::new(rows),
            traffic: Mutex::default(),
        }
    }

    pub fn traffic(&self) -> Vec<TrafficRow> {
        self.traffic
            .lock()
            .map(|guard| guard.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PerformanceSource for InMemoryPerformanceSource {
    async fn rows_for_day(&self, day: NaiveDate) -> Result<Vec<PerformanceRow>, PerformanceError> {
        let guard = self
            .rows
            .lock()
            .map_err(|_| PerformanceError::Unavailable(poisoned("performance source")))?;
        Ok(guard.iter().filter(|row| row.day == day).cloned().collect())
    }

    async fn upsert_traffic(&self, rows: Vec<TrafficRow>) -> Result<usize, PerformanceError> {
        let mut guard = self
            .traffic
            .lock()
            .map_err(|_| PerformanceError::Unavailable(poisoned("performance source")))?;
        let count = rows.len();
        for row in rows {
            let key = (
                row.day,
                row.offer_id.clone(),
                row.sub_id.clone(),
                row.affiliate_id.clone(),
            );
            guard.insert(key, row);
        }
        Ok(count)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDecisionLedger {
    decisions: Mutex<HashMap<String, DecisionRecord>>,
}

#[async_trait]
impl DecisionLedger for InMemoryDecisionLedger {
    async fn lookup(&self, lead_id: &str) -> Result<Option<DecisionRecord>, LedgerError> {
        let guard = self
            .decisions
            .lock()
            .map_err(|_| LedgerError::Unavailable(poisoned("decision ledger")))?;
        Ok(guard.get(lead_id).cloned())
    }

    async fn record(&self, lead_id: &str, record: &DecisionRecord) -> Result<(), LedgerError> {
        let mut guard = self
            .decisions
            .lock()
            .map_err(|_| LedgerError::Unavailable(poisoned("decision ledger")))?;
        guard
            .entry(lead_id.to_string())
            .or_insert_with(|| record.clone());
        Ok(())
    }
}
