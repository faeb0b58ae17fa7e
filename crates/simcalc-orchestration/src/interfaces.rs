//! Orchestration interfaces: external collaborators and job events.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use simcalc_core::error::CalcError;
use simcalc_core::request::CalculationRequest;
use simcalc_core::status::StatusKind;

/// One poll of a server-queued economy calculation.
#[derive(Debug, Clone, PartialEq)]
pub enum EconomyPoll {
    /// Still queued or running.
    Computing {
        queue_position: Option<u32>,
        average_time: Option<Duration>,
    },
    /// Finished with a result.
    Ok(Value),
    /// Finished with an error message.
    Error(String),
}

/// Remote calculation API.
#[async_trait]
pub trait CalculationClient: Send + Sync {
    /// Run one household simulation. Blocks for the full calculation,
    /// typically 30 to 45 seconds.
    async fn call_household(
        &self,
        country_id: &str,
        population_id: &str,
        policy_id: &str,
    ) -> Result<Value, CalcError>;

    /// Submit or poll an economy calculation.
    async fn call_economy(&self, request: &CalculationRequest) -> Result<EconomyPoll, CalcError>;
}

/// Persistence API for simulations and reports.
#[async_trait]
pub trait PersistenceClient: Send + Sync {
    async fn update_simulation_output(
        &self,
        country_id: &str,
        simulation_id: &str,
        output: &Value,
    ) -> Result<(), CalcError>;

    async fn mark_simulation_error(
        &self,
        country_id: &str,
        simulation_id: &str,
    ) -> Result<(), CalcError>;

    async fn mark_report_completed(
        &self,
        country_id: &str,
        report_id: &str,
        output: &Value,
    ) -> Result<(), CalcError>;

    async fn mark_report_error(&self, country_id: &str, report_id: &str) -> Result<(), CalcError>;
}

/// Result of a single simulation task.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub simulation_id: String,
    /// The remote payload or a structured error.
    pub outcome: Result<Value, CalcError>,
    pub duration: Duration,
}

/// Settled state of one job, handed to observers and to whoever awaits
/// the job's handle.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub job_id: String,
    /// `Ok` or `Error`; never `Computing`.
    pub status: StatusKind,
    /// Aggregate output, present on success.
    pub output: Option<Value>,
    /// Simulations that failed, sorted.
    pub failed_simulations: Vec<String>,
    /// Whether the report bookkeeping write eventually succeeded.
    pub persisted: bool,
}

/// Job lifecycle events, replacing completion callbacks.
pub trait JobObserver: Send + Sync {
    /// A job has started its tasks.
    fn on_job_started(&self, job_id: &str, simulation_ids: &[String]);

    /// One task of a job has settled.
    fn on_task_settled(&self, job_id: &str, result: &TaskResult);

    /// The whole job has settled and its bookkeeping is done.
    fn on_job_settled(&self, outcome: &JobOutcome);
}

/// Null job observer (does nothing).
pub struct NullJobObserver;

impl JobObserver for NullJobObserver {
    fn on_job_started(&self, _job_id: &str, _simulation_ids: &[String]) {}
    fn on_task_settled(&self, _job_id: &str, _result: &TaskResult) {}
    fn on_job_settled(&self, _outcome: &JobOutcome) {}
}

/// Job observer that logs every event at debug level.
pub struct LoggingJobObserver;

impl JobObserver for LoggingJobObserver {
    fn on_job_started(&self, job_id: &str, simulation_ids: &[String]) {
        debug!(job_id, simulations = ?simulation_ids, "Job observed starting");
    }

    fn on_task_settled(&self, job_id: &str, result: &TaskResult) {
        debug!(
            job_id,
            simulation_id = %result.simulation_id,
            ok = result.outcome.is_ok(),
            duration_ms = u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
            "Task observed settling"
        );
    }

    fn on_job_settled(&self, outcome: &JobOutcome) {
        debug!(
            job_id = %outcome.job_id,
            status = ?outcome.status,
            persisted = outcome.persisted,
            "Job observed settling"
        );
    }
}
