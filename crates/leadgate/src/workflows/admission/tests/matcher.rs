use super::common::*;

use crate::workflows::admission::{select_rule, specificity, RuleId, Targeting};

fn target<'a>(sub: Option<&'a str>) -> Targeting<'a> {
    Targeting {
        affiliate_id: Some("A1"),
        offer_id: Some("42"),
        sub_id: sub,
    }
}

#[test]
fn wildcard_rule_scores_zero() {
    let wildcard = rule("r-any", None, None, None, 50);
    assert_eq!(specificity(&wildcard, &target(Some("S9"))), Some(0));
}

#[test]
fn sub_weight_outranks_affiliate_and_offer_combined() {
    let broad = rule("r-aff-offer", Some("A1"), Some("42"), None, 10);
    let narrow = rule("r-sub", None, None, Some("S9"), 60);

    assert_eq!(specificity(&broad, &target(Some("S9"))), Some(2));
    assert_eq!(specificity(&narrow, &target(Some("S9"))), Some(5));

    let rules = vec![broad, narrow];
    let selected = select_rule(&rules, &target(Some("S9"))).expect("rule matched");
    assert_eq!(selected.rule.id, RuleId("r-sub".to_string()));
}

#[test]
fn concrete_mismatch_excludes_the_rule() {
    let other_affiliate = rule("r-a2", Some("A2"), Some("42"), None, 50);
    assert_eq!(specificity(&other_affiliate, &target(None)), None);

    let needs_sub = rule("r-sub", None, Some("42"), Some("S9"), 50);
    assert_eq!(specificity(&needs_sub, &target(None)), None);
}

#[test]
fn inactive_rules_never_match() {
    let mut inactive = rule("r-off", Some("A1"), Some("42"), Some("S9"), 90);
    inactive.active = false;
    assert_eq!(specificity(&inactive, &target(Some("S9"))), None);
    assert!(select_rule(&[inactive], &target(Some("S9"))).is_none());
}

#[test]
fn ties_prefer_the_newest_rule() {
    let mut older = rule("r-old", Some("A1"), Some("42"), None, 10);
    older.created_at = created(2);
    let mut newer = rule("r-new", Some("A1"), Some("42"), None, 20);
    newer.created_at = created(9);
    let mut undated = rule("r-undated", Some("A1"), Some("42"), None, 30);
    undated.created_at = None;

    let rules = vec![older, newer, undated];
    let selected = select_rule(&rules, &target(None)).expect("rule matched");
    assert_eq!(selected.rule.id, RuleId("r-new".to_string()));
}

#[test]
fn equal_timestamps_fall_back_to_smallest_id() {
    let first = rule("r-b", None, Some("42"), None, 10);
    let second = rule("r-a", None, Some("42"), None, 20);

    let forward = vec![first.clone(), second.clone()];
    let reversed = vec![second, first];

    let picked_forward = select_rule(&forward, &target(None)).expect("rule matched");
    let picked_reversed = select_rule(&reversed, &target(None)).expect("rule matched");
    assert_eq!(picked_forward.rule.id, RuleId("r-a".to_string()));
    assert_eq!(picked_forward.rule.id, picked_reversed.rule.id);
}

#[test]
fn no_candidates_select_nothing() {
    assert!(select_rule(&[], &target(Some("S9"))).is_none());
}
