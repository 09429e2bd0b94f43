use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::decision::Decision;
use super::domain::{deserialize_dimension, null_as_default, Lead, RuleId};

/// Aggregate counter key. `rule_id` is `None` for leads no rule matched.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CounterKey {
    pub date: NaiveDate,
    pub affiliate_id: String,
    pub offer_id: String,
    pub sub_id: Option<String>,
    pub rule_id: Option<RuleId>,
}

impl CounterKey {
    pub fn for_lead(date: NaiveDate, lead: &Lead, rule_id: Option<&RuleId>) -> Self {
        Self {
            date,
            affiliate_id: lead.affiliate_id.clone(),
            offer_id: lead.offer_id.clone(),
            sub_id: lead.sub_id.clone(),
            rule_id: rule_id.cloned(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterTotals {
    pub total: u64,
    pub accepted: u64,
}

impl CounterTotals {
    pub fn add(&mut self, delta: CounterDelta) {
        self.total = self.total.saturating_add(delta.total());
        self.accepted = self.accepted.saturating_add(delta.accepted());
    }
}

/// Increment applied per decision. Only the two shapes that keep `accepted <= total` exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterDelta {
    Rejected,
    Accepted,
}

impl CounterDelta {
    pub fn for_decision(decision: Decision) -> Self {
        match decision {
            Decision::Accept => CounterDelta::Accepted,
            Decision::Reject => CounterDelta::Rejected,
        }
    }

    pub fn total(&self) -> u64 {
        1
    }

    pub fn accepted(&self) -> u64 {
        match self {
            CounterDelta::Accepted => 1,
            CounterDelta::Rejected => 0,
        }
    }
}

/// Counter row as listed for reporting and copied to the analytics store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRow {
    #[serde(alias = "day")]
    pub date: NaiveDate,
    #[serde(default, deserialize_with = "null_as_default")]
    pub affiliate_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub offer_id: String,
    #[serde(default, deserialize_with = "deserialize_dimension")]
    pub sub_id: Option<String>,
    #[serde(default)]
    pub rule_id: Option<RuleId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_leads: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub accepted_leads: u64,
}

/// How a counter listing filters on the sub dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SubFilter {
    #[default]
    Any,
    Missing,
    Equals(String),
}

impl SubFilter {
    /// `null` selects rows without a sub, an empty value selects everything.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => SubFilter::Any,
            Some("null") => SubFilter::Missing,
            Some(value) => SubFilter::Equals(value.to_string()),
        }
    }

    pub fn admits(&self, sub_id: Option<&str>) -> bool {
        match self {
            SubFilter::Any => true,
            SubFilter::Missing => sub_id.is_none(),
            SubFilter::Equals(value) => sub_id == Some(value.as_str()),
        }
    }
}

/// Listing filter for the administration surface and the analytics sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterQuery {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub affiliate_id: Option<String>,
    pub offer_id: Option<String>,
    pub sub_id: SubFilter,
    pub limit: usize,
}

impl Default for CounterQuery {
    fn default() -> Self {
        Self {
            date_from: None,
            date_to: None,
            affiliate_id: None,
            offer_id: None,
            sub_id: SubFilter::Any,
            limit: 500,
        }
    }
}

impl CounterQuery {
    pub fn for_day(date: NaiveDate) -> Self {
        Self {
            date_from: Some(date),
            date_to: Some(date),
            limit: usize::MAX,
            ..Self::default()
        }
    }

    pub fn admits(&self, row: &CounterRow) -> bool {
        self.date_from.map_or(true, |from| row.date >= from)
            && self.date_to.map_or(true, |to| row.date <= to)
            && self
                .affiliate_id
                .as_deref()
                .map_or(true, |affiliate| row.affiliate_id == affiliate)
            && self
                .offer_id
                .as_deref()
                .map_or(true, |offer| row.offer_id == offer)
            && self.sub_id.admits(row.sub_id.as_deref())
    }
}

/// Storage for per-day aggregate counters.
///
/// `increment` must apply both deltas in one atomic server-side operation; there is no
/// read-then-write path for counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn get(&self, key: &CounterKey) -> Result<CounterTotals, CounterStoreError>;
    async fn increment(&self, key: &CounterKey, delta: CounterDelta)
        -> Result<(), CounterStoreError>;
    async fn list(&self, query: &CounterQuery) -> Result<Vec<CounterRow>, CounterStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CounterStoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
    #[error("counter store rejected the request with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("counter store returned an unreadable payload: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for CounterStoreError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Unavailable(value.to_string())
        }
    }
}
