//! # simcalc-core
//!
//! Core types for orchestrating long-running policy simulations: validated
//! requests, cache-resident status records, synthetic progress estimation,
//! and the status cache with its subscribers.

pub mod cache;
pub mod constants;
pub mod error;
pub mod estimator;
pub mod observer;
pub mod observers;
pub mod options;
pub mod progress;
pub mod request;
pub mod status;

// Re-exports
pub use cache::{MemoryStatusCache, StatusCache};
pub use constants::{exit_codes, MAX_SYNTHETIC_PROGRESS};
pub use error::CalcError;
pub use estimator::{estimate, linear_share, Estimate, Phase};
pub use observer::{StatusSubscriber, SubscriberSet};
pub use options::EngineOptions;
pub use progress::CancellationToken;
pub use request::{CalculationFamily, CalculationRequest, PolicyIds, RequestParts, TaskSpec};
pub use status::{
    CalcStatus, ErrorInfo, ProgressOverlay, StatusKind, StatusMetadata, TargetType, TaskOutcome,
};
