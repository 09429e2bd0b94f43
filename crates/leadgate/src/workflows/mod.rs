pub mod admin;
pub mod admission;
pub mod autopilot;
