//! Auto-pilot: a step controller that retunes `percent_accept` of opted-in rules from
//! today's realized margin and earnings per click, plus the counter sync that feeds the
//! analytics store.

pub mod controller;
pub mod ladder;
pub mod performance;
pub mod router;
pub mod sync;

#[cfg(test)]
mod tests;

pub use controller::{Adjustment, AutoPilotController, AutoPilotError, TickReport};
pub use ladder::{next_percent, AdjustmentReason, LadderInput, LadderStep};
pub use performance::{
    isolated_rows, PerformanceAggregate, PerformanceError, PerformanceRow, PerformanceSource,
    TrafficRow,
};
pub use router::autopilot_router;
pub use sync::{CounterSync, SyncError};
