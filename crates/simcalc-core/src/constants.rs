//! Constants for progress estimation, tick intervals, and retry timing.

/// Ceiling for any locally estimated progress value.
///
/// The last 5 points are reserved for the terminal write, so a synthetic
/// value can never be mistaken for completion.
pub const MAX_SYNTHETIC_PROGRESS: f64 = 95.0;

/// Progress recorded on a successful terminal status.
pub const COMPLETE_PROGRESS: f64 = 100.0;

/// Default interval (ms) between a task executor's synthetic progress ticks.
pub const DEFAULT_TASK_TICK_MS: u64 = 100;

/// Default interval (ms) between coordinator republish ticks.
pub const DEFAULT_COORDINATOR_TICK_MS: u64 = 500;

/// Default calibration duration (ms) for household calculations.
pub const DEFAULT_HOUSEHOLD_CALIBRATION_MS: u64 = 37_500;

/// Default interval (ms) between economy status polls.
pub const DEFAULT_ECONOMY_POLL_MS: u64 = 1_000;

/// Default backoff (ms) before the single persistence retry.
pub const DEFAULT_PERSISTENCE_BACKOFF_MS: u64 = 1_000;

/// Minimum progress change (percentage points) before a logging subscriber reports.
pub const PROGRESS_LOG_THRESHOLD: f64 = 5.0;

/// Error codes written into terminal error records.
pub mod error_codes {
    /// The remote calculation rejected.
    pub const CALCULATION_FAILED: &str = "calculation_failed";
    /// The task was cancelled before it settled.
    pub const CANCELLED: &str = "cancelled";
    /// The request was malformed.
    pub const INVALID_REQUEST: &str = "invalid_request";
    /// A persistence write failed.
    pub const PERSISTENCE_FAILED: &str = "persistence_failed";
    /// Configuration was unusable.
    pub const CONFIG: &str = "config";
    /// At least one sibling simulation of a report failed.
    pub const SIMULATION_FAILED: &str = "simulation_failed";
}

/// Process exit codes.
pub mod exit_codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// Generic error, including a failed remote calculation.
    pub const ERROR_GENERIC: i32 = 1;
    /// Bookkeeping writes failed after retry.
    pub const ERROR_PERSISTENCE: i32 = 2;
    /// Invalid request or configuration.
    pub const ERROR_CONFIG: i32 = 4;
    /// Cancelled by user (Ctrl+C).
    pub const ERROR_CANCELED: i32 = 130;
}
