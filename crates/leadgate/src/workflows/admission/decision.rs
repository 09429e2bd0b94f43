use serde::{Deserialize, Serialize};

use super::domain::RuleId;
use super::matcher::RuleMatch;

/// Final outcome returned to the lead pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Accept => "accept",
            Decision::Reject => "reject",
        }
    }
}

/// Discriminator that lets reporting tell "rejected by design" from "failed to forward".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionReason {
    NoRule,
    DailyCap,
    RulePercentage,
    PostbackFailed,
    UpstreamError,
    DeadlineExceeded,
}

impl DecisionReason {
    pub fn label(&self) -> &'static str {
        match self {
            DecisionReason::NoRule => "no-rule",
            DecisionReason::DailyCap => "daily-cap",
            DecisionReason::RulePercentage => "rule-percentage",
            DecisionReason::PostbackFailed => "postback-failed",
            DecisionReason::UpstreamError => "upstream-error",
            DecisionReason::DeadlineExceeded => "deadline-exceeded",
        }
    }
}

/// Rule details echoed back for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedRuleView {
    pub id: RuleId,
    pub percent: u8,
    pub score: u8,
}

impl From<&RuleMatch<'_>> for MatchedRuleView {
    fn from(matched: &RuleMatch<'_>) -> Self {
        Self {
            id: matched.rule.id.clone(),
            percent: matched.rule.percent_accept,
            score: matched.score,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision: Decision,
    pub reason: DecisionReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<MatchedRuleView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<u8>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub replayed: bool,
}

impl DecisionRecord {
    pub fn reject(reason: DecisionReason, rule: Option<MatchedRuleView>) -> Self {
        Self {
            decision: Decision::Reject,
            reason,
            rule,
            bucket: None,
            replayed: false,
        }
    }

    pub fn is_accept(&self) -> bool {
        self.decision == Decision::Accept
    }
}
