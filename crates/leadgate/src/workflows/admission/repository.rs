use async_trait::async_trait;

use super::decision::DecisionRecord;
use super::domain::{Rule, RuleDraft, RuleId, RulePatch};

/// Server-side pre-filter for rule listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleFilter {
    /// Active rules whose offer is the given offer or a wildcard.
    ActiveForOffer(String),
    /// Rules the auto-pilot controller may retune.
    AutoPilot,
    /// Everything, ordered by priority, for administration.
    All,
}

impl RuleFilter {
    pub fn admits(&self, rule: &Rule) -> bool {
        match self {
            RuleFilter::ActiveForOffer(offer) => {
                rule.active
                    && rule
                        .offer_id
                        .as_deref()
                        .map_or(true, |candidate| candidate == offer)
            }
            RuleFilter::AutoPilot => rule.auto_pilot,
            RuleFilter::All => true,
        }
    }
}

/// Storage abstraction for targeting rules.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn list(&self, filter: RuleFilter) -> Result<Vec<Rule>, RuleStoreError>;
    async fn create(&self, draft: RuleDraft) -> Result<Rule, RuleStoreError>;
    async fn patch(&self, id: &RuleId, patch: RulePatch) -> Result<Rule, RuleStoreError>;
    async fn delete(&self, id: &RuleId) -> Result<(), RuleStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RuleStoreError {
    #[error("rule not found")]
    NotFound,
    #[error("rule store unavailable: {0}")]
    Unavailable(String),
    #[error("rule store rejected the request with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("rule store returned an unreadable payload: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for RuleStoreError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Unavailable(value.to_string())
        }
    }
}

/// Remembers decisions by `lead_id` so re-delivered leads replay instead of counting twice.
#[async_trait]
pub trait DecisionLedger: Send + Sync {
    async fn lookup(&self, lead_id: &str) -> Result<Option<DecisionRecord>, LedgerError>;
    async fn record(&self, lead_id: &str, record: &DecisionRecord) -> Result<(), LedgerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("decision ledger unavailable: {0}")]
    Unavailable(String),
}
