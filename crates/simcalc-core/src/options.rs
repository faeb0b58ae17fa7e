//! Engine timing options and their JSON persistence.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_COORDINATOR_TICK_MS, DEFAULT_ECONOMY_POLL_MS, DEFAULT_HOUSEHOLD_CALIBRATION_MS,
    DEFAULT_PERSISTENCE_BACKOFF_MS, DEFAULT_TASK_TICK_MS,
};
use crate::error::CalcError;

/// Timing options for executors, coordinators, pollers, and retries.
///
/// All values are milliseconds so the struct maps directly onto a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Interval between a task executor's synthetic progress ticks.
    pub task_tick_ms: u64,
    /// Interval between coordinator republish ticks.
    pub coordinator_tick_ms: u64,
    /// Typical runtime of one household calculation. Zero is legal and
    /// makes estimates saturate immediately.
    pub household_calibration_ms: u64,
    /// Interval between economy status polls.
    pub economy_poll_ms: u64,
    /// Delay before the single persistence retry.
    pub persistence_backoff_ms: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            task_tick_ms: DEFAULT_TASK_TICK_MS,
            coordinator_tick_ms: DEFAULT_COORDINATOR_TICK_MS,
            household_calibration_ms: DEFAULT_HOUSEHOLD_CALIBRATION_MS,
            economy_poll_ms: DEFAULT_ECONOMY_POLL_MS,
            persistence_backoff_ms: DEFAULT_PERSISTENCE_BACKOFF_MS,
        }
    }
}

impl EngineOptions {
    /// Normalize options, applying defaults where intervals are zero.
    ///
    /// A zero interval would make a ticker spin, so only the calibration
    /// and the backoff keep a zero value.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        if self.task_tick_ms == 0 {
            self.task_tick_ms = DEFAULT_TASK_TICK_MS;
        }
        if self.coordinator_tick_ms == 0 {
            self.coordinator_tick_ms = DEFAULT_COORDINATOR_TICK_MS;
        }
        if self.economy_poll_ms == 0 {
            self.economy_poll_ms = DEFAULT_ECONOMY_POLL_MS;
        }
        self
    }

    #[must_use]
    pub fn task_tick(&self) -> Duration {
        Duration::from_millis(self.task_tick_ms)
    }

    #[must_use]
    pub fn coordinator_tick(&self) -> Duration {
        Duration::from_millis(self.coordinator_tick_ms)
    }

    #[must_use]
    pub fn economy_poll(&self) -> Duration {
        Duration::from_millis(self.economy_poll_ms)
    }

    #[must_use]
    pub fn persistence_backoff(&self) -> Duration {
        Duration::from_millis(self.persistence_backoff_ms)
    }

    /// Calibration duration for household synthetic estimates.
    #[must_use]
    pub fn household_calibration(&self) -> Duration {
        Duration::from_millis(self.household_calibration_ms)
    }

    /// Load options from a JSON file; missing fields take defaults.
    pub fn load_from_path(path: &Path) -> Result<Self, CalcError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CalcError::Config(format!("{}: {e}", path.display())))?;
        let opts: Self = serde_json::from_str(&content)
            .map_err(|e| CalcError::Config(format!("{}: {e}", path.display())))?;
        Ok(opts.normalize())
    }

    /// Save options as pretty-printed JSON.
    pub fn save_to_path(&self, path: &Path) -> std::io::Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let opts = EngineOptions::default();
        assert_eq!(opts.task_tick(), Duration::from_millis(100));
        assert_eq!(opts.coordinator_tick(), Duration::from_millis(500));
        assert_eq!(opts.household_calibration(), Duration::from_millis(37_500));
        assert_eq!(opts.persistence_backoff(), Duration::from_secs(1));
    }

    #[test]
    fn normalize_zero_intervals() {
        let opts = EngineOptions {
            task_tick_ms: 0,
            coordinator_tick_ms: 0,
            economy_poll_ms: 0,
            household_calibration_ms: 0,
            persistence_backoff_ms: 0,
        }
        .normalize();
        assert_eq!(opts.task_tick_ms, DEFAULT_TASK_TICK_MS);
        assert_eq!(opts.coordinator_tick_ms, DEFAULT_COORDINATOR_TICK_MS);
        assert_eq!(opts.economy_poll_ms, DEFAULT_ECONOMY_POLL_MS);
        assert_eq!(opts.household_calibration_ms, 0);
        assert_eq!(opts.persistence_backoff_ms, 0);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        let opts = EngineOptions {
            household_calibration_ms: 5_000,
            ..Default::default()
        };
        opts.save_to_path(&path).unwrap();
        let loaded = EngineOptions::load_from_path(&path).unwrap();
        assert_eq!(loaded, opts);
    }

    #[test]
    fn partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{"persistence_backoff_ms": 250}"#).unwrap();
        let loaded = EngineOptions::load_from_path(&path).unwrap();
        assert_eq!(loaded.persistence_backoff_ms, 250);
        assert_eq!(loaded.task_tick_ms, DEFAULT_TASK_TICK_MS);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = EngineOptions::load_from_path(Path::new("/nonexistent/simcalc.json")).unwrap_err();
        assert!(matches!(err, CalcError::Config(_)));
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            EngineOptions::load_from_path(&path),
            Err(CalcError::Config(_))
        ));
    }
}
