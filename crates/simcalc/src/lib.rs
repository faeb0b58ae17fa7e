//! simcalc library: application logic for the simulation orchestration demo.

pub mod app;
pub mod config;
pub mod errors;
pub mod version;
