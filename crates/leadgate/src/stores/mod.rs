//! Collaborator implementations: REST clients for the hosted stores and in-memory
//! stand-ins for development and tests.

pub mod memory;
pub mod rest;

pub use memory::{
    InMemoryCounterStore, InMemoryDecisionLedger, InMemoryPerformanceSource, InMemoryRuleStore,
};
pub use rest::{RestCounterStore, RestPerformanceSource, RestRuleStore, RestSetupError};
