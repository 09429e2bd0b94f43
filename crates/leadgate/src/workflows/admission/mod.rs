//! Lead admission: rule resolution, daily caps, deterministic bucketing, postbacks and
//! counter bookkeeping.

pub mod bucketing;
pub mod counters;
pub mod decision;
pub mod domain;
pub mod engine;
pub mod matcher;
pub mod postback;
pub mod repository;
pub mod router;

#[cfg(test)]
mod tests;

pub use bucketing::LeadBucketer;
pub use counters::{
    CounterDelta, CounterKey, CounterQuery, CounterRow, CounterStore, CounterStoreError,
    CounterTotals, SubFilter,
};
pub use decision::{Decision, DecisionReason, DecisionRecord, MatchedRuleView};
pub use domain::{
    normalize_dimension, Lead, LeadSubmission, LeadValidationError, Rule, RuleDraft, RuleId,
    RulePatch, Targeting,
};
pub use engine::{AdmissionEngine, AdmissionError, RuleResolution};
pub use matcher::{select_rule, specificity, RuleMatch};
pub use postback::{HttpPostbackForwarder, PostbackGateway, PostbackOutcome, PostbackSetupError};
pub use repository::{DecisionLedger, LedgerError, RuleFilter, RuleStore, RuleStoreError};
pub use router::admission_router;
