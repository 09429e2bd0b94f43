use std::fmt;

use serde::Serialize;

use crate::config::AutoPilotConfig;

/// Signals and targets the ladder evaluates for one rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LadderInput {
    pub percent_accept: u8,
    pub margin_pct: f64,
    pub epc: f64,
    pub target_margin: f64,
    /// EPC ceiling. The EPC rungs are skipped unless this is positive.
    pub target_epc: Option<f64>,
}

/// Why the controller moved a rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AdjustmentReason {
    EmergencyBrake { margin_pct: f64 },
    MarginBelowTarget { margin_pct: f64, target: f64 },
    EpcAboveTarget { epc: f64, target: f64 },
    EpcBelowTarget { epc: f64, target: f64, margin_pct: f64 },
}

impl fmt::Display for AdjustmentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdjustmentReason::EmergencyBrake { margin_pct } => {
                write!(f, "EMERGENCY margin {margin_pct:.1}%")
            }
            AdjustmentReason::MarginBelowTarget { margin_pct, target } => {
                write!(f, "margin {margin_pct:.1}% below target {target:.1}%")
            }
            AdjustmentReason::EpcAboveTarget { epc, target } => {
                write!(f, "EPC {epc:.2} above target {target:.2}")
            }
            AdjustmentReason::EpcBelowTarget {
                epc,
                target,
                margin_pct,
            } => write!(
                f,
                "EPC {epc:.2} below target {target:.2} with margin {margin_pct:.1}%"
            ),
        }
    }
}

/// First matching rung of the ladder: loss prevention before yield.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LadderStep {
    Hold,
    Move { after: u8, reason: AdjustmentReason },
}

pub fn next_percent(config: &AutoPilotConfig, input: &LadderInput) -> LadderStep {
    let floor = config.min_accept.min(100);
    let current = input.percent_accept;
    let lowered = current.saturating_sub(config.step).max(floor);
    let raised = current.saturating_add(config.step).clamp(floor, 100);

    let (after, reason) = if input.margin_pct < config.emergency_margin {
        (
            floor,
            AdjustmentReason::EmergencyBrake {
                margin_pct: input.margin_pct,
            },
        )
    } else if input.margin_pct < input.target_margin {
        (
            lowered,
            AdjustmentReason::MarginBelowTarget {
                margin_pct: input.margin_pct,
                target: input.target_margin,
            },
        )
    } else {
        match input.target_epc.filter(|target| *target > 0.0) {
            Some(target) if input.epc > target => (
                lowered,
                AdjustmentReason::EpcAboveTarget {
                    epc: input.epc,
                    target,
                },
            ),
            Some(target)
                if input.epc < target
                    && input.margin_pct > input.target_margin + config.margin_buffer =>
            {
                (
                    raised,
                    AdjustmentReason::EpcBelowTarget {
                        epc: input.epc,
                        target,
                        margin_pct: input.margin_pct,
                    },
                )
            }
            _ => return LadderStep::Hold,
        }
    };

    if after == current {
        LadderStep::Hold
    } else {
        LadderStep::Move { after, reason }
    }
}
