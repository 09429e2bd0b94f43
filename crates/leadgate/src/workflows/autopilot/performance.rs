use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::workflows::admission::domain::{
    deserialize_dimension, deserialize_optional_number, number_or_zero,
};
use crate::workflows::admission::Rule;

/// Per-day performance aggregate for one (offer, sub), as exposed by the analytics view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRow {
    pub day: NaiveDate,
    #[serde(default, deserialize_with = "deserialize_dimension")]
    pub offer_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_dimension")]
    pub sub_id: Option<String>,
    #[serde(rename = "shortform_leads", default, deserialize_with = "number_or_zero")]
    pub leads: f64,
    #[serde(default, deserialize_with = "number_or_zero")]
    pub visits: f64,
    #[serde(rename = "affise_cost", default, deserialize_with = "number_or_zero")]
    pub spend: f64,
    #[serde(rename = "omzet_totaal", default, deserialize_with = "number_or_zero")]
    pub revenue: f64,
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub margin_pct: Option<f64>,
}

/// Sums over the rows attributed to one rule.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerformanceAggregate {
    pub leads: f64,
    pub visits: f64,
    pub spend: f64,
    pub revenue: f64,
}

impl PerformanceAggregate {
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a PerformanceRow>) -> Self {
        rows.into_iter().fold(Self::default(), |mut total, row| {
            total.leads += row.leads;
            total.visits += row.visits;
            total.spend += row.spend;
            total.revenue += row.revenue;
            total
        })
    }

    /// Realized margin in percent. Zero when there is no revenue.
    pub fn margin_pct(&self) -> f64 {
        if self.revenue > 0.0 {
            (self.revenue - self.spend) / self.revenue * 100.0
        } else {
            0.0
        }
    }

    /// Publisher payout per visit. Zero when there are no visits.
    pub fn epc(&self) -> f64 {
        if self.visits > 0.0 {
            self.spend / self.visits
        } else {
            0.0
        }
    }
}

/// Rows attributed to `rule` under the isolation policy.
///
/// A rule with a sub takes only that sub's rows. A rule without a sub takes the offer's
/// rows minus the subs claimed by another auto-pilot rule targeting a concrete sub, so
/// the same traffic never steers two rules.
pub fn isolated_rows<'a>(
    rule: &Rule,
    autopilot_rules: &[Rule],
    rows: &'a [PerformanceRow],
) -> Vec<&'a PerformanceRow> {
    rows.iter()
        .filter(|row| {
            rule.offer_id
                .as_deref()
                .map_or(true, |offer| row.offer_id.as_deref() == Some(offer))
        })
        .filter(|row| match rule.sub_id.as_deref() {
            Some(sub) => row.sub_id.as_deref() == Some(sub),
            None => !sub_is_claimed(rule, autopilot_rules, row),
        })
        .collect()
}

fn sub_is_claimed(rule: &Rule, autopilot_rules: &[Rule], row: &PerformanceRow) -> bool {
    let Some(sub) = row.sub_id.as_deref() else {
        return false;
    };
    autopilot_rules.iter().any(|other| {
        other.id != rule.id
            && other.auto_pilot
            && other.active
            && other.sub_id.as_deref() == Some(sub)
            && other
                .offer_id
                .as_deref()
                .map_or(true, |offer| row.offer_id.as_deref() == Some(offer))
    })
}

/// Counter totals summed over rules, in the shape the analytics traffic table expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficRow {
    pub day: NaiveDate,
    pub offer_id: String,
    pub sub_id: Option<String>,
    pub affiliate_id: String,
    pub total_leads: u64,
    pub accepted_leads: u64,
}

/// Read access to daily performance plus the write path for synced traffic.
#[async_trait]
pub trait PerformanceSource: Send + Sync {
    async fn rows_for_day(&self, day: NaiveDate) -> Result<Vec<PerformanceRow>, PerformanceError>;
    async fn upsert_traffic(&self, rows: Vec<TrafficRow>) -> Result<usize, PerformanceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PerformanceError {
    #[error("analytics store unavailable: {0}")]
    Unavailable(String),
    #[error("analytics store rejected the request with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("analytics store returned an unreadable payload: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for PerformanceError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Unavailable(value.to_string())
        }
    }
}
