use std::cmp::Ordering;

use super::domain::{Rule, Targeting};

pub const AFFILIATE_WEIGHT: u8 = 1;
pub const OFFER_WEIGHT: u8 = 1;
/// Outweighs affiliate and offer combined, so a sub-level rule always wins.
pub const SUB_WEIGHT: u8 = 5;

/// A rule that matched a lead together with its specificity score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleMatch<'a> {
    pub rule: &'a Rule,
    pub score: u8,
}

/// Specificity of `rule` against `target`, or `None` when any concrete dimension disagrees.
/// Inactive rules never match.
pub fn specificity(rule: &Rule, target: &Targeting<'_>) -> Option<u8> {
    if !rule.active {
        return None;
    }

    let dimensions = [
        (rule.affiliate_id.as_deref(), target.affiliate_id, AFFILIATE_WEIGHT),
        (rule.offer_id.as_deref(), target.offer_id, OFFER_WEIGHT),
        (rule.sub_id.as_deref(), target.sub_id, SUB_WEIGHT),
    ];

    let mut score = 0;
    for (wanted, actual, weight) in dimensions {
        match wanted {
            None => {}
            Some(value) if Some(value) == actual => score += weight,
            Some(_) => return None,
        }
    }
    Some(score)
}

/// Higher score first, then the newest rule, then the lexically smallest id.
fn rank(left: &RuleMatch<'_>, right: &RuleMatch<'_>) -> Ordering {
    left.score
        .cmp(&right.score)
        .then_with(|| left.rule.created_at.cmp(&right.rule.created_at))
        .then_with(|| right.rule.id.cmp(&left.rule.id))
}

/// Pick the single best rule for `target`. The result does not depend on candidate order.
pub fn select_rule<'a>(candidates: &'a [Rule], target: &Targeting<'_>) -> Option<RuleMatch<'a>> {
    candidates
        .iter()
        .filter_map(|rule| specificity(rule, target).map(|score| RuleMatch { rule, score }))
        .max_by(rank)
}
