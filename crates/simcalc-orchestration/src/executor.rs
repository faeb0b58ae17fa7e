//! Drives one remote household call while publishing synthetic progress.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use simcalc_core::cache::StatusCache;
use simcalc_core::error::CalcError;
use simcalc_core::estimator::{estimate, Phase};
use simcalc_core::options::EngineOptions;
use simcalc_core::progress::CancellationToken;
use simcalc_core::request::{CalculationRequest, TaskSpec};
use simcalc_core::status::{CalcStatus, ProgressOverlay, StatusMetadata, TargetType, TaskOutcome};

use crate::interfaces::CalculationClient;

/// Writes a terminal `cancelled` error for `key` unless disarmed.
///
/// Owns its cache handle so it can be built before a task is spawned and
/// moved into it; dropping the future, even before its first poll, then
/// never leaves the cache entry in `computing`.
pub(crate) struct SettleOnDrop {
    cache: Arc<dyn StatusCache>,
    key: String,
    armed: bool,
}

impl SettleOnDrop {
    pub(crate) fn new(cache: Arc<dyn StatusCache>, key: impl Into<String>) -> Self {
        Self {
            cache,
            key: key.into(),
            armed: true,
        }
    }

    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for SettleOnDrop {
    fn drop(&mut self) {
        if self.armed && self.cache.settle(&self.key, TaskOutcome::Error(CalcError::Cancelled.to_error_info())) {
            warn!(task_key = %self.key, "Task dropped before settling, marked cancelled");
        }
    }
}

/// Runs exactly one remote calculation per call to [`execute`].
///
/// No retries happen at this layer.
///
/// [`execute`]: TaskExecutor::execute
pub struct TaskExecutor {
    client: Arc<dyn CalculationClient>,
    cache: Arc<dyn StatusCache>,
    tick: Duration,
    calibration: Duration,
}

impl TaskExecutor {
    #[must_use]
    pub fn new(client: Arc<dyn CalculationClient>, cache: Arc<dyn StatusCache>, options: &EngineOptions) -> Self {
        let options = options.clone().normalize();
        Self {
            client,
            cache,
            tick: options.task_tick(),
            calibration: options.household_calibration(),
        }
    }

    #[must_use]
    pub fn calibration(&self) -> Duration {
        self.calibration
    }

    /// Run `task` to a terminal status.
    ///
    /// Resets the task's cache entry to `computing`, overlays estimated
    /// progress every tick while the call is outstanding, then writes `ok`
    /// with the payload or `error` and returns the same outcome.
    pub async fn execute(
        &self,
        job_id: &str,
        request: &CalculationRequest,
        task: &TaskSpec,
        cancel: &CancellationToken,
    ) -> Result<Value, CalcError> {
        let key = task.simulation_id.as_str();
        let metadata = StatusMetadata::now(key, request.family(), TargetType::Simulation, job_id);
        self.cache.set(key, CalcStatus::computing(metadata, Phase::Initializing.label()));
        let mut guard = SettleOnDrop::new(Arc::clone(&self.cache), key);

        info!(job_id, task_key = key, policy_id = %task.policy_id, "Task started");
        let started = Instant::now();
        let result = self.drive(key, request, task, cancel).await;
        let elapsed = started.elapsed();

        guard.disarm();
        match &result {
            Ok(value) => {
                self.cache.settle(key, TaskOutcome::Ok(value.clone()));
                info!(job_id, task_key = key, elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX), "Task complete");
            }
            Err(e) => {
                self.cache.settle(key, TaskOutcome::Error(e.to_error_info()));
                warn!(job_id, task_key = key, error = %e, "Task failed");
            }
        }
        result
    }

    async fn drive(
        &self,
        key: &str,
        request: &CalculationRequest,
        task: &TaskSpec,
        cancel: &CancellationToken,
    ) -> Result<Value, CalcError> {
        cancel.check_cancelled()?;

        let started = Instant::now();
        let call = self
            .client
            .call_household(request.country_id(), request.population_id(), &task.policy_id);
        tokio::pin!(call);

        let mut ticker = tokio::time::interval_at(started + self.tick, self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                result = &mut call => return result,
                () = cancel.cancelled() => return Err(CalcError::Cancelled),
                _ = ticker.tick() => {
                    let e = estimate(started.elapsed(), self.calibration);
                    if self.cache.overlay(key, &ProgressOverlay::new(e.progress, e.phase.label())) {
                        debug!(task_key = key, progress = e.progress, "Task tick");
                    }
                }
            }
        }
    }
}
