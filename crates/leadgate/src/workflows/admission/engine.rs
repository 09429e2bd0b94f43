use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use super::bucketing::{within_percentage, LeadBucketer};
use super::counters::{CounterDelta, CounterKey, CounterStore, CounterStoreError};
use super::decision::{Decision, DecisionReason, DecisionRecord, MatchedRuleView};
use super::domain::{Lead, LeadSubmission, LeadValidationError, Rule, Targeting};
use super::matcher::select_rule;
use super::postback::{PostbackGateway, PostbackOutcome};
use super::repository::{DecisionLedger, LedgerError, RuleFilter, RuleStore, RuleStoreError};
use crate::config::AdmissionConfig;

/// A quarter of the decision deadline stays reserved for bookkeeping after the postback.
const POSTBACK_RESERVE_DIVISOR: u32 = 4;

/// Orchestrates rule resolution, cap enforcement, bucketing, postbacks and counters.
pub struct AdmissionEngine<R: ?Sized, C: ?Sized, P: ?Sized> {
    rules: Arc<R>,
    counters: Arc<C>,
    postback: Arc<P>,
    ledger: Option<Arc<dyn DecisionLedger>>,
    bucketer: LeadBucketer,
    deadline: Duration,
}

impl<R, C, P> AdmissionEngine<R, C, P>
where
    R: RuleStore + ?Sized + 'static,
    C: CounterStore + ?Sized + 'static,
    P: PostbackGateway + ?Sized + 'static,
{
    pub fn new(rules: Arc<R>, counters: Arc<C>, postback: Arc<P>, config: AdmissionConfig) -> Self {
        Self {
            rules,
            counters,
            postback,
            ledger: None,
            bucketer: LeadBucketer::new(config.hash_secret),
            deadline: config.decision_deadline,
        }
    }

    /// Replay earlier decisions for re-delivered `lead_id`s instead of counting them again.
    pub fn with_ledger(mut self, ledger: Arc<dyn DecisionLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Validate a raw submission and decide it. Validation failures touch no counters.
    pub async fn submit(
        &self,
        submission: LeadSubmission,
    ) -> Result<DecisionRecord, AdmissionError> {
        let lead = Lead::try_from(submission)?;
        self.decide(&lead).await
    }

    pub async fn decide(&self, lead: &Lead) -> Result<DecisionRecord, AdmissionError> {
        self.decide_on(lead, Utc::now().date_naive()).await
    }

    /// Decide `lead` against the counters of `today`, bounded by the decision deadline.
    pub async fn decide_on(
        &self,
        lead: &Lead,
        today: NaiveDate,
    ) -> Result<DecisionRecord, AdmissionError> {
        let postback_cutoff = Instant::now() + self.postback_budget();
        let decision = self.run(lead, today, postback_cutoff);
        match tokio::time::timeout(self.deadline, decision).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    lead_id = %lead.lead_id,
                    deadline_ms = self.deadline.as_millis() as u64,
                    "lead decision exceeded its deadline"
                );
                Err(AdmissionError::DeadlineExceeded(self.deadline))
            }
        }
    }

    /// Share of the deadline the postback may use. The rest is kept for the counter write.
    fn postback_budget(&self) -> Duration {
        self.deadline - self.deadline / POSTBACK_RESERVE_DIVISOR
    }

    async fn run(
        &self,
        lead: &Lead,
        today: NaiveDate,
        postback_cutoff: Instant,
    ) -> Result<DecisionRecord, AdmissionError> {
        if let Some(ledger) = &self.ledger {
            if let Some(mut prior) = ledger.lookup(&lead.lead_id).await? {
                info!(
                    lead_id = %lead.lead_id,
                    decision = prior.decision.label(),
                    "replaying recorded decision"
                );
                prior.replayed = true;
                return Ok(prior);
            }
        }

        let candidates = self
            .rules
            .list(RuleFilter::ActiveForOffer(lead.offer_id.clone()))
            .await?;

        let Some(matched) = select_rule(&candidates, &lead.targeting()) else {
            let key = CounterKey::for_lead(today, lead, None);
            self.counters.increment(&key, CounterDelta::Rejected).await?;
            let record = DecisionRecord::reject(DecisionReason::NoRule, None);
            return Ok(self.finish(lead, record).await);
        };

        let rule = matched.rule;
        let view = MatchedRuleView::from(&matched);
        let key = CounterKey::for_lead(today, lead, Some(&rule.id));

        if let Some(cap) = rule.daily_cap() {
            let totals = self.counters.get(&key).await?;
            if totals.accepted >= u64::from(cap) {
                self.counters.increment(&key, CounterDelta::Rejected).await?;
                let record = DecisionRecord::reject(DecisionReason::DailyCap, Some(view));
                return Ok(self.finish(lead, record).await);
            }
        }

        let bucket = self.bucketer.bucket(lead);
        let (decision, reason) = self
            .resolve_outcome(lead, rule, bucket, postback_cutoff)
            .await;

        self.counters
            .increment(&key, CounterDelta::for_decision(decision))
            .await?;

        let record = DecisionRecord {
            decision,
            reason,
            rule: Some(view),
            bucket: Some(bucket),
            replayed: false,
        };
        Ok(self.finish(lead, record).await)
    }

    /// Final outcome once the bucket is known. A failed postback demotes an accept.
    async fn resolve_outcome(
        &self,
        lead: &Lead,
        rule: &Rule,
        bucket: u8,
        postback_cutoff: Instant,
    ) -> (Decision, DecisionReason) {
        if !within_percentage(bucket, rule.percent_accept) {
            return (Decision::Reject, DecisionReason::RulePercentage);
        }

        let Some(click_id) = lead.click_id.as_deref() else {
            return (Decision::Accept, DecisionReason::RulePercentage);
        };

        let forward = self.postback.forward(click_id);
        let outcome = match tokio::time::timeout_at(postback_cutoff, forward).await {
            Ok(outcome) => outcome,
            Err(_) => PostbackOutcome::Failed {
                detail: "postback ran out of decision time".to_string(),
                attempts: 0,
            },
        };
        if outcome.is_success() {
            return (Decision::Accept, DecisionReason::RulePercentage);
        }
        if let PostbackOutcome::Failed { detail, attempts } = &outcome {
            warn!(
                lead_id = %lead.lead_id,
                rule_id = %rule.id,
                attempts,
                %detail,
                "postback failure demoted accept to reject"
            );
        }
        (Decision::Reject, DecisionReason::PostbackFailed)
    }

    /// Counters are already written here, so a ledger failure must not fail the decision.
    async fn finish(&self, lead: &Lead, record: DecisionRecord) -> DecisionRecord {
        if let Some(ledger) = &self.ledger {
            if let Err(err) = ledger.record(&lead.lead_id, &record).await {
                warn!(lead_id = %lead.lead_id, error = %err, "unable to record decision in ledger");
            }
        }

        info!(
            lead_id = %lead.lead_id,
            affiliate_id = %lead.affiliate_id,
            offer_id = %lead.offer_id,
            decision = record.decision.label(),
            reason = record.reason.label(),
            "lead decided"
        );
        record
    }

    /// Debug view of rule resolution for a targeting tuple. No counters are touched.
    pub async fn resolve(&self, target: Targeting<'_>) -> Result<RuleResolution, AdmissionError> {
        let offer = target
            .offer_id
            .ok_or(LeadValidationError::MissingField("offer_id"))?;
        let candidates = self
            .rules
            .list(RuleFilter::ActiveForOffer(offer.to_string()))
            .await?;
        let selected =
            select_rule(&candidates, &target).map(|matched| MatchedRuleView::from(&matched));
        Ok(RuleResolution {
            candidates,
            selected,
        })
    }
}

/// Candidate rules for an offer and the one the matcher would pick.
#[derive(Debug, Clone, Serialize)]
pub struct RuleResolution {
    pub candidates: Vec<Rule>,
    pub selected: Option<MatchedRuleView>,
}

/// Error raised while deciding a lead.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error(transparent)]
    Validation(#[from] LeadValidationError),
    #[error(transparent)]
    Rules(#[from] RuleStoreError),
    #[error(transparent)]
    Counters(#[from] CounterStoreError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("lead decision exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),
}

impl AdmissionError {
    /// Reason reported to the caller when the error is degraded to a reject.
    pub fn reason(&self) -> DecisionReason {
        match self {
            AdmissionError::DeadlineExceeded(_) => DecisionReason::DeadlineExceeded,
            _ => DecisionReason::UpstreamError,
        }
    }
}
