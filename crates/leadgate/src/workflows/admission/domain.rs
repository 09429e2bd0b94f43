use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, Unexpected};
use serde::{Deserialize, Deserializer, Serialize};

/// Identifier wrapper for rule records. Upstream stores hand these out as numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RuleId(pub String);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RuleId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let scalar = Scalar::deserialize(deserializer)?;
        Ok(RuleId(scalar.into_text()))
    }
}

/// JSON scalar as sent by loosely typed producers.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Text(value) => value,
            Scalar::Integer(value) => value.to_string(),
            Scalar::Float(value) => value.to_string(),
            Scalar::Flag(value) => value.to_string(),
        }
    }

    /// Numeric reading. Decimal columns often arrive as strings such as `"15.00"`.
    fn into_number<E: de::Error>(self) -> Result<Option<f64>, E> {
        match self {
            Scalar::Integer(value) => Ok(Some(value as f64)),
            Scalar::Float(value) => Ok(Some(value)),
            Scalar::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() || trimmed == "null" {
                    return Ok(None);
                }
                trimmed
                    .parse::<f64>()
                    .map(Some)
                    .map_err(|_| E::invalid_value(Unexpected::Str(trimmed), &"a number"))
            }
            Scalar::Flag(value) => Err(E::invalid_type(Unexpected::Bool(value), &"a number")),
        }
    }
}

fn deserialize_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Scalar>::deserialize(deserializer)? {
        Some(scalar) => {
            let number = scalar.into_number::<D::Error>()?;
            Ok(number.filter(|value| value.is_finite()))
        }
        None => Ok(None),
    }
}

/// Trim an identifier and fold absent, empty and literal `null` values into the wildcard.
pub fn normalize_dimension(raw: Option<&str>) -> Option<String> {
    let value = raw?.trim();
    if value.is_empty() || value == "null" {
        None
    } else {
        Some(value.to_string())
    }
}

pub(crate) fn deserialize_dimension<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let scalar = Option::<Scalar>::deserialize(deserializer)?;
    Ok(normalize_dimension(
        scalar.map(Scalar::into_text).as_deref(),
    ))
}

/// Distinguishes "field absent" (`None`) from "explicitly cleared" (`Some(None)`).
pub(crate) fn deserialize_patch_dimension<'de, D>(
    deserializer: D,
) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_dimension(deserializer).map(Some)
}

pub(crate) fn deserialize_percent<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_number(deserializer)?.map_or(0, clamp_percent))
}

pub(crate) fn deserialize_optional_percent<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_number(deserializer)?.map(clamp_percent))
}

fn clamp_percent(raw: f64) -> u8 {
    raw.round().clamp(0.0, 100.0) as u8
}

/// Zero and null caps both mean "unlimited".
pub(crate) fn deserialize_cap<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = deserialize_number(deserializer)?;
    Ok(raw.filter(|cap| *cap >= 1.0).map(|cap| cap.floor() as u32))
}

pub(crate) fn deserialize_optional_number<'de, D>(
    deserializer: D,
) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_number(deserializer)
}

pub(crate) fn number_or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_number(deserializer)?.unwrap_or(0.0))
}

/// Non-negative whole numbers such as volumes. Fractions are floored.
pub(crate) fn deserialize_optional_count<'de, D>(
    deserializer: D,
) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = deserialize_number(deserializer)?;
    Ok(raw
        .filter(|count| *count >= 0.0)
        .map(|count| count.floor().min(f64::from(u32::MAX)) as u32))
}

pub(crate) fn deserialize_optional_priority<'de, D>(
    deserializer: D,
) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = deserialize_number(deserializer)?;
    Ok(raw.map(|priority| {
        priority
            .round()
            .clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
    }))
}

pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Targeting and decision record as stored in the rule store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    #[serde(default, deserialize_with = "deserialize_dimension")]
    pub affiliate_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_dimension")]
    pub offer_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_dimension")]
    pub sub_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_percent")]
    pub percent_accept: u8,
    #[serde(default, deserialize_with = "deserialize_cap")]
    pub cap_per_day: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub active: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub auto_pilot: bool,
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub target_margin: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_count")]
    pub min_volume: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub min_cpc: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_priority")]
    pub priority: Option<i32>,
    #[serde(default, alias = "date_created")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pilot_log: Option<String>,
}

impl Rule {
    /// Positive daily cap, if the rule has one.
    pub fn daily_cap(&self) -> Option<u32> {
        self.cap_per_day.filter(|cap| *cap > 0)
    }

    /// Human-readable label used in auto-pilot notes.
    pub fn label(&self) -> String {
        let offer = self.offer_id.as_deref().unwrap_or("*");
        match &self.sub_id {
            Some(sub) => format!("Offer {offer} (Sub {sub})"),
            None => format!("Offer {offer}"),
        }
    }
}

fn default_priority() -> i32 {
    100
}

/// Fields accepted when creating a rule through the administration surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDraft {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_dimension")]
    pub affiliate_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_dimension")]
    pub offer_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_dimension")]
    pub sub_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_percent")]
    pub percent_accept: u8,
    #[serde(default, deserialize_with = "deserialize_cap")]
    pub cap_per_day: Option<u32>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub auto_pilot: bool,
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub target_margin: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_count")]
    pub min_volume: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub min_cpc: Option<f64>,
}

/// Partial update. Absent fields are left untouched by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_patch_dimension",
        skip_serializing_if = "Option::is_none"
    )]
    pub affiliate_id: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "deserialize_patch_dimension",
        skip_serializing_if = "Option::is_none"
    )]
    pub offer_id: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "deserialize_patch_dimension",
        skip_serializing_if = "Option::is_none"
    )]
    pub sub_id: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_percent",
        skip_serializing_if = "Option::is_none"
    )]
    pub percent_accept: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap_per_day: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_pilot: Option<bool>,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_margin: Option<f64>,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub min_volume: Option<u32>,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub min_cpc: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pilot_log: Option<String>,
}

impl RulePatch {
    /// Apply the patch to an in-memory copy of a rule.
    pub fn apply_to(&self, rule: &mut Rule) {
        if let Some(description) = &self.description {
            rule.description = Some(description.clone());
        }
        if let Some(affiliate_id) = &self.affiliate_id {
            rule.affiliate_id = affiliate_id.clone();
        }
        if let Some(offer_id) = &self.offer_id {
            rule.offer_id = offer_id.clone();
        }
        if let Some(sub_id) = &self.sub_id {
            rule.sub_id = sub_id.clone();
        }
        if let Some(percent) = self.percent_accept {
            rule.percent_accept = percent.min(100);
        }
        if let Some(cap) = self.cap_per_day {
            rule.cap_per_day = Some(cap).filter(|cap| *cap > 0);
        }
        if let Some(priority) = self.priority {
            rule.priority = Some(priority);
        }
        if let Some(active) = self.active {
            rule.active = active;
        }
        if let Some(auto_pilot) = self.auto_pilot {
            rule.auto_pilot = auto_pilot;
        }
        if let Some(target_margin) = self.target_margin {
            rule.target_margin = Some(target_margin);
        }
        if let Some(min_volume) = self.min_volume {
            rule.min_volume = Some(min_volume);
        }
        if let Some(min_cpc) = self.min_cpc {
            rule.min_cpc = Some(min_cpc);
        }
        if let Some(pilot_log) = &self.pilot_log {
            rule.pilot_log = Some(pilot_log.clone());
        }
    }
}

/// Raw lead payload. Accepts the field aliases used by upstream trackers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LeadSubmission {
    #[serde(default, alias = "id", deserialize_with = "deserialize_dimension")]
    pub lead_id: Option<String>,
    #[serde(default, alias = "aff_id", deserialize_with = "deserialize_dimension")]
    pub affiliate_id: Option<String>,
    #[serde(default, alias = "offer", deserialize_with = "deserialize_dimension")]
    pub offer_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_dimension")]
    pub sub_id: Option<String>,
    #[serde(
        default,
        alias = "clickid",
        alias = "transaction_id",
        deserialize_with = "deserialize_dimension"
    )]
    pub click_id: Option<String>,
}

/// Validated inbound lead. Identifiers are already trimmed and normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lead {
    pub lead_id: String,
    pub affiliate_id: String,
    pub offer_id: String,
    pub sub_id: Option<String>,
    pub click_id: Option<String>,
}

impl Lead {
    pub fn targeting(&self) -> Targeting<'_> {
        Targeting {
            affiliate_id: Some(&self.affiliate_id),
            offer_id: Some(&self.offer_id),
            sub_id: self.sub_id.as_deref(),
        }
    }
}

impl TryFrom<LeadSubmission> for Lead {
    type Error = LeadValidationError;

    fn try_from(submission: LeadSubmission) -> Result<Self, Self::Error> {
        let LeadSubmission {
            lead_id,
            affiliate_id,
            offer_id,
            sub_id,
            click_id,
        } = submission;

        Ok(Self {
            lead_id: lead_id.ok_or(LeadValidationError::MissingField("lead_id"))?,
            affiliate_id: affiliate_id.ok_or(LeadValidationError::MissingField("affiliate_id"))?,
            offer_id: offer_id.ok_or(LeadValidationError::MissingField("offer_id"))?,
            sub_id,
            click_id,
        })
    }
}

/// Lead rejected before any side effect happened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LeadValidationError {
    #[error("lead is missing required field `{0}`")]
    MissingField(&'static str),
}

/// The three dimensions a rule can target, borrowed from a lead or a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Targeting<'a> {
    pub affiliate_id: Option<&'a str>,
    pub offer_id: Option<&'a str>,
    pub sub_id: Option<&'a str>,
}
