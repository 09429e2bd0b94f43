use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use tracing::{debug, info};

use super::performance::{PerformanceError, PerformanceSource, TrafficRow};
use crate::workflows::admission::{CounterQuery, CounterStore, CounterStoreError};

/// Copies per-day counters into the analytics traffic table for joint reporting.
pub struct CounterSync<C: ?Sized, S: ?Sized> {
    counters: Arc<C>,
    performance: Arc<S>,
}

impl<C, S> CounterSync<C, S>
where
    C: CounterStore + ?Sized,
    S: PerformanceSource + ?Sized,
{
    pub fn new(counters: Arc<C>, performance: Arc<S>) -> Self {
        Self {
            counters,
            performance,
        }
    }

    /// Sync one day. Counters split by rule are summed, since the traffic table is keyed
    /// by `(day, offer, sub, affiliate)` only. Returns the number of rows written.
    pub async fn sync_day(&self, day: NaiveDate) -> Result<usize, SyncError> {
        let counters = self.counters.list(&CounterQuery::for_day(day)).await?;
        if counters.is_empty() {
            debug!(%day, "no counters to sync");
            return Ok(0);
        }

        let mut merged: BTreeMap<(String, Option<String>, String), TrafficRow> = BTreeMap::new();
        for row in counters {
            let entry = merged
                .entry((
                    row.offer_id.clone(),
                    row.sub_id.clone(),
                    row.affiliate_id.clone(),
                ))
                .or_insert_with(|| TrafficRow {
                    day,
                    offer_id: row.offer_id,
                    sub_id: row.sub_id,
                    affiliate_id: row.affiliate_id,
                    total_leads: 0,
                    accepted_leads: 0,
                });
            entry.total_leads += row.total_leads;
            entry.accepted_leads += row.accepted_leads;
        }

        let written = self
            .performance
            .upsert_traffic(merged.into_values().collect())
            .await?;
        info!(%day, rows = written, "synced counters to analytics");
        Ok(written)
    }

    /// Sync `limit` days, starting `offset` days before `today` and walking backwards.
    pub async fn sync_history(
        &self,
        today: NaiveDate,
        offset: u32,
        limit: u32,
    ) -> Result<usize, SyncError> {
        let mut total = 0;
        for back in offset..offset.saturating_add(limit) {
            let Some(day) = today.checked_sub_days(Days::new(u64::from(back))) else {
                break;
            };
            total += self.sync_day(day).await?;
        }
        Ok(total)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Counters(#[from] CounterStoreError),
    #[error(transparent)]
    Performance(#[from] PerformanceError),
}
