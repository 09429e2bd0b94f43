use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::ladder::{next_percent, AdjustmentReason, LadderInput, LadderStep};
use super::performance::{
    isolated_rows, PerformanceAggregate, PerformanceError, PerformanceRow, PerformanceSource,
};
use super::sync::CounterSync;
use crate::config::AutoPilotConfig;
use crate::workflows::admission::{
    CounterStore, Rule, RuleFilter, RuleId, RulePatch, RuleStore, RuleStoreError,
};

/// A rule the controller retuned during a tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Adjustment {
    pub rule_id: RuleId,
    pub label: String,
    pub before: u8,
    pub after: u8,
    pub reason: AdjustmentReason,
    pub note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub synced: usize,
    pub adjustments: Vec<Adjustment>,
    pub notes: Vec<String>,
}

/// Outcome of evaluating a single rule against today's performance.
#[derive(Debug, Clone, PartialEq)]
enum Evaluation {
    NoData,
    VolumeTooLow { leads: f64 },
    Hold,
    Move { after: u8, reason: AdjustmentReason },
}

/// Step controller that nudges `percent_accept` of auto-pilot rules toward their targets.
pub struct AutoPilotController<R: ?Sized, C: ?Sized, S: ?Sized> {
    rules: Arc<R>,
    sync: CounterSync<C, S>,
    performance: Arc<S>,
    config: AutoPilotConfig,
}

impl<R, C, S> AutoPilotController<R, C, S>
where
    R: RuleStore + ?Sized,
    C: CounterStore + ?Sized,
    S: PerformanceSource + ?Sized,
{
    pub fn new(
        rules: Arc<R>,
        counters: Arc<C>,
        performance: Arc<S>,
        config: AutoPilotConfig,
    ) -> Self {
        Self {
            rules,
            sync: CounterSync::new(counters, performance.clone()),
            performance,
            config,
        }
    }

    pub async fn tick(&self) -> Result<TickReport, AutoPilotError> {
        self.tick_at(Utc::now()).await
    }

    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickReport, AutoPilotError> {
        let today = now.date_naive();
        let mut report = TickReport::default();

        match self.sync.sync_day(today).await {
            Ok(synced) => report.synced = synced,
            Err(err) => {
                warn!(error = %err, "counter sync failed before tick");
                report.notes.push(format!("counter sync failed: {err}"));
            }
        }

        let rules: Vec<Rule> = self
            .rules
            .list(RuleFilter::AutoPilot)
            .await?
            .into_iter()
            .filter(|rule| rule.active && rule.auto_pilot)
            .collect();
        if rules.is_empty() {
            report.notes.push("no auto-pilot rules found".to_string());
            return Ok(report);
        }

        let rows = self.performance.rows_for_day(today).await?;

        for rule in &rules {
            let label = rule.label();
            match self.evaluate(rule, &rules, &rows) {
                Evaluation::NoData => report.notes.push(format!("{label}: no isolated data")),
                Evaluation::VolumeTooLow { leads } => {
                    report
                        .notes
                        .push(format!("{label}: volume too low ({leads:.0} leads)"));
                }
                Evaluation::Hold => {}
                Evaluation::Move { after, reason } => {
                    let before = rule.percent_accept;
                    let note = format!(
                        "{}: {reason}. Accept {before}% -> {after}%",
                        now.format("%Y-%m-%d %H:%M UTC")
                    );
                    let patch = RulePatch {
                        percent_accept: Some(after),
                        pilot_log: Some(note.clone()),
                        ..RulePatch::default()
                    };
                    if let Err(err) = self.rules.patch(&rule.id, patch).await {
                        warn!(
                            rule_id = %rule.id,
                            error = %err,
                            "unable to apply auto-pilot adjustment"
                        );
                        report.notes.push(format!("{label}: update failed: {err}"));
                        continue;
                    }

                    info!(rule_id = %rule.id, before, after, %reason, "auto-pilot adjusted rule");
                    report.notes.push(format!("{label}: adjusted"));
                    report.adjustments.push(Adjustment {
                        rule_id: rule.id.clone(),
                        label,
                        before,
                        after,
                        reason,
                        note,
                    });
                }
            }
        }

        Ok(report)
    }

    fn evaluate(&self, rule: &Rule, rules: &[Rule], rows: &[PerformanceRow]) -> Evaluation {
        let selected = isolated_rows(rule, rules, rows);
        if selected.is_empty() {
            return Evaluation::NoData;
        }

        let aggregate = PerformanceAggregate::from_rows(selected);
        let min_volume = rule
            .min_volume
            .filter(|volume| *volume > 0)
            .unwrap_or(self.config.default_min_volume);
        if aggregate.leads < f64::from(min_volume) {
            return Evaluation::VolumeTooLow {
                leads: aggregate.leads,
            };
        }

        let input = LadderInput {
            percent_accept: rule.percent_accept,
            margin_pct: aggregate.margin_pct(),
            epc: aggregate.epc(),
            target_margin: rule
                .target_margin
                .unwrap_or(self.config.default_target_margin),
            target_epc: rule.min_cpc,
        };
        match next_percent(&self.config, &input) {
            LadderStep::Hold => Evaluation::Hold,
            LadderStep::Move { after, reason } => Evaluation::Move { after, reason },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AutoPilotError {
    #[error(transparent)]
    Rules(#[from] RuleStoreError),
    #[error(transparent)]
    Performance(#[from] PerformanceError),
}
