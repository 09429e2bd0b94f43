use std::sync::Arc;

use chrono::NaiveDate;

use super::common::*;

use crate::stores::memory::{InMemoryCounterStore, InMemoryPerformanceSource};
use crate::workflows::admission::{CounterDelta, CounterKey, CounterStore, RuleId};
use crate::workflows::autopilot::CounterSync;

fn key(date: NaiveDate, sub: Option<&str>, rule: Option<&str>) -> CounterKey {
    CounterKey {
        date,
        affiliate_id: "A1".to_string(),
        offer_id: "42".to_string(),
        sub_id: sub.map(str::to_string),
        rule_id: rule.map(|id| RuleId(id.to_string())),
    }
}

async fn seed(counters: &InMemoryCounterStore, key: &CounterKey, deltas: &[CounterDelta]) {
    for delta in deltas {
        counters.increment(key, *delta).await.expect("counted");
    }
}

#[tokio::test]
async fn rows_split_by_rule_merge_into_one_traffic_row() {
    let counters = Arc::new(InMemoryCounterStore::default());
    let performance = Arc::new(InMemoryPerformanceSource::default());
    seed(
        &counters,
        &key(today(), Some("S9"), Some("r1")),
        &[CounterDelta::Accepted, CounterDelta::Rejected],
    )
    .await;
    seed(
        &counters,
        &key(today(), Some("S9"), None),
        &[CounterDelta::Rejected],
    )
    .await;
    let sync = CounterSync::new(counters, performance.clone());

    let written = sync.sync_day(today()).await.expect("synced");

    assert_eq!(written, 1);
    let traffic = performance.traffic();
    assert_eq!(traffic[0].total_leads, 3);
    assert_eq!(traffic[0].accepted_leads, 1);
    assert_eq!(traffic[0].sub_id.as_deref(), Some("S9"));
}

#[tokio::test]
async fn empty_day_writes_nothing() {
    let performance = Arc::new(InMemoryPerformanceSource::default());
    let sync = CounterSync::new(Arc::new(InMemoryCounterStore::default()), performance.clone());

    assert_eq!(sync.sync_day(today()).await.expect("synced"), 0);
    assert!(performance.traffic().is_empty());
}

#[tokio::test]
async fn history_walks_back_from_offset() {
    let counters = Arc::new(InMemoryCounterStore::default());
    let performance = Arc::new(InMemoryPerformanceSource::default());
    for back in 0..4 {
        let day = today() - chrono::Days::new(back);
        seed(&counters, &key(day, None, Some("r1")), &[CounterDelta::Accepted]).await;
    }
    let sync = CounterSync::new(counters, performance.clone());

    let written = sync.sync_history(today(), 1, 2).await.expect("synced");

    assert_eq!(written, 2);
    let mut days: Vec<NaiveDate> = performance.traffic().iter().map(|row| row.day).collect();
    days.sort();
    assert_eq!(
        days,
        vec![
            today() - chrono::Days::new(2),
            today() - chrono::Days::new(1)
        ]
    );
}
