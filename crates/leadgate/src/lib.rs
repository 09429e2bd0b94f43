pub mod config;
pub mod error;
pub mod retry;
pub mod stores;
pub mod telemetry;
pub mod workflows;
