//! Fan-out/fan-in of one report's simulations, with persistence.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use simcalc_core::cache::StatusCache;
use simcalc_core::constants::error_codes;
use simcalc_core::error::CalcError;
use simcalc_core::options::EngineOptions;
use simcalc_core::progress::CancellationToken;
use simcalc_core::request::{CalculationFamily, CalculationRequest, TaskSpec};
use simcalc_core::status::{
    CalcStatus, ErrorInfo, StatusKind, StatusMetadata, TargetType, TaskOutcome,
};

use crate::coordinator::{CoordinatorTimer, ProgressCoordinator};
use crate::executor::{SettleOnDrop, TaskExecutor};
use crate::interfaces::{
    CalculationClient, JobObserver, JobOutcome, NullJobObserver, PersistenceClient, TaskResult,
};
use crate::retry::with_one_retry;

/// Build the aggregate output: simulation id to result, keys sorted.
///
/// The order results arrive in has no effect on the output.
pub fn aggregate_results(results: impl IntoIterator<Item = (String, Value)>) -> Value {
    let sorted: BTreeMap<String, Value> = results.into_iter().collect();
    let mut map = Map::new();
    for (id, value) in sorted {
        map.insert(id, value);
    }
    Value::Object(map)
}

struct Job {
    simulation_ids: Vec<String>,
    results: HashMap<String, Value>,
    timer: Option<CoordinatorTimer>,
    cancel: CancellationToken,
}

/// Drives household reports: one [`TaskExecutor`] run per simulation,
/// blended progress through a [`ProgressCoordinator`], and a single
/// aggregate persisted once every simulation has settled.
pub struct JobOrchestrator {
    executor: TaskExecutor,
    persistence: Arc<dyn PersistenceClient>,
    cache: Arc<dyn StatusCache>,
    observer: Arc<dyn JobObserver>,
    options: EngineOptions,
    running: Mutex<HashSet<String>>,
    jobs: Mutex<HashMap<String, Job>>,
}

impl JobOrchestrator {
    #[must_use]
    pub fn new(
        client: Arc<dyn CalculationClient>,
        persistence: Arc<dyn PersistenceClient>,
        cache: Arc<dyn StatusCache>,
        options: &EngineOptions,
    ) -> Self {
        let options = options.clone().normalize();
        Self {
            executor: TaskExecutor::new(client, Arc::clone(&cache), &options),
            persistence,
            cache,
            observer: Arc::new(NullJobObserver),
            options,
            running: Mutex::new(HashSet::new()),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Start a household report. See [`start_job_with_cancel`].
    ///
    /// [`start_job_with_cancel`]: JobOrchestrator::start_job_with_cancel
    pub fn start_job(
        self: &Arc<Self>,
        request: CalculationRequest,
    ) -> Result<Option<JoinHandle<JobOutcome>>, CalcError> {
        self.start_job_with_cancel(request, CancellationToken::new())
    }

    /// Start a household report in the background.
    ///
    /// Returns `Ok(None)` without doing anything when the report is
    /// already running, or when every one of its simulations is. Otherwise
    /// simulations already running elsewhere are skipped and the rest fan
    /// out immediately. The handle may be awaited or dropped.
    pub fn start_job_with_cancel(
        self: &Arc<Self>,
        request: CalculationRequest,
        cancel: CancellationToken,
    ) -> Result<Option<JoinHandle<JobOutcome>>, CalcError> {
        if request.family() != CalculationFamily::Household {
            return Err(CalcError::InvalidRequest(format!(
                "{} requests are not orchestrated as household jobs",
                request.family()
            )));
        }
        let job_id = request.report_id().to_string();

        let tasks = {
            let mut jobs = self.jobs.lock();
            if jobs.contains_key(&job_id) {
                info!(job_id = %job_id, "Job already running, ignoring start");
                return Ok(None);
            }
            let tasks: Vec<TaskSpec> = {
                let mut running = self.running.lock();
                // Report and simulation statuses share one cache key space.
                if running.contains(&job_id) {
                    return Err(CalcError::InvalidRequest(format!(
                        "report id {job_id} is a simulation of another running job"
                    )));
                }
                if let Some(id) = request.simulation_ids().iter().find(|id| jobs.contains_key(*id)) {
                    return Err(CalcError::InvalidRequest(format!(
                        "simulation id {id} is the id of another running job"
                    )));
                }
                request
                    .tasks()
                    .into_iter()
                    .filter(|task| {
                        let fresh = running.insert(task.simulation_id.clone());
                        if !fresh {
                            warn!(job_id = %job_id, simulation_id = %task.simulation_id, "Simulation already running, skipping");
                        }
                        fresh
                    })
                    .collect()
            };
            if tasks.is_empty() {
                return Ok(None);
            }
            jobs.insert(
                job_id.clone(),
                Job {
                    simulation_ids: tasks.iter().map(|t| t.simulation_id.clone()).collect(),
                    results: HashMap::new(),
                    timer: None,
                    cancel: cancel.clone(),
                },
            );
            tasks
        };
        let teardown = Teardown {
            orchestrator: Arc::clone(self),
            job_id: job_id.clone(),
        };
        let simulation_ids: Vec<String> = tasks.iter().map(|t| t.simulation_id.clone()).collect();

        let metadata = StatusMetadata::now(&job_id, request.family(), TargetType::Report, &job_id);
        self.cache.set(&job_id, CalcStatus::computing(metadata, "Preparing simulations"));
        let guards = JobGuards {
            report: SettleOnDrop::new(Arc::clone(&self.cache), job_id.clone()),
            teardown,
        };

        let coordinator = Arc::new(ProgressCoordinator::new(
            job_id.clone(),
            simulation_ids.clone(),
            self.executor.calibration(),
            Arc::clone(&self.cache),
        ));
        let timer = coordinator.start_timer(self.options.coordinator_tick());
        if let Some(job) = self.jobs.lock().get_mut(&job_id) {
            job.timer = Some(timer);
        }

        info!(job_id = %job_id, simulations = ?simulation_ids, "Job started");
        self.observer.on_job_started(&job_id, &simulation_ids);

        // The guards move into the task whole, so an abort before its
        // first poll still tears the job down and settles the report.
        let this = Arc::clone(self);
        Ok(Some(tokio::spawn(async move {
            this.run_job(job_id, request, tasks, coordinator, cancel, guards).await
        })))
    }

    async fn run_job(
        self: Arc<Self>,
        job_id: String,
        request: CalculationRequest,
        tasks: Vec<TaskSpec>,
        coordinator: Arc<ProgressCoordinator>,
        cancel: CancellationToken,
        guards: JobGuards,
    ) -> JobOutcome {
        let JobGuards {
            report: mut report_guard,
            teardown,
        } = guards;

        let results = join_all(
            tasks
                .iter()
                .map(|task| self.run_task(&job_id, &request, task, &coordinator, &cancel)),
        )
        .await;

        let mut failed: Vec<String> = results
            .iter()
            .filter(|r| r.outcome.is_err())
            .map(|r| r.simulation_id.clone())
            .collect();
        failed.sort();

        let outcome = if failed.is_empty() {
            self.complete_report(&job_id, &request).await
        } else {
            self.fail_report(&job_id, &request, failed, results.len(), &cancel).await
        };
        report_guard.disarm();

        drop(teardown);
        self.observer.on_job_settled(&outcome);
        outcome
    }

    async fn run_task(
        &self,
        job_id: &str,
        request: &CalculationRequest,
        task: &TaskSpec,
        coordinator: &ProgressCoordinator,
        cancel: &CancellationToken,
    ) -> TaskResult {
        let started = Instant::now();
        let id = task.simulation_id.as_str();
        let country = request.country_id();
        let persistence = self.persistence.as_ref();
        let backoff = self.options.persistence_backoff();

        coordinator.start_task(id);
        let outcome = self.executor.execute(job_id, request, task, cancel).await;
        match &outcome {
            Ok(value) => {
                coordinator.complete_task(id);
                if let Some(job) = self.jobs.lock().get_mut(job_id) {
                    job.results.insert(id.to_string(), value.clone());
                }
                with_one_retry("update_simulation_output", id, backoff, move || {
                    persistence.update_simulation_output(country, id, value)
                })
                .await;
            }
            Err(_) => {
                coordinator.fail_task(id);
                with_one_retry("mark_simulation_error", id, backoff, move || {
                    persistence.mark_simulation_error(country, id)
                })
                .await;
            }
        }

        let result = TaskResult {
            simulation_id: id.to_string(),
            outcome,
            duration: started.elapsed(),
        };
        self.observer.on_task_settled(job_id, &result);
        result
    }

    async fn complete_report(&self, job_id: &str, request: &CalculationRequest) -> JobOutcome {
        let results = self
            .jobs
            .lock()
            .get_mut(job_id)
            .map(|job| std::mem::take(&mut job.results))
            .unwrap_or_default();
        let output = aggregate_results(results);

        let persistence = self.persistence.as_ref();
        let country = request.country_id();
        let output_ref = &output;
        let persisted = with_one_retry(
            "mark_report_completed",
            job_id,
            self.options.persistence_backoff(),
            move || persistence.mark_report_completed(country, job_id, output_ref),
        )
        .await;

        self.cache.settle(job_id, TaskOutcome::Ok(output.clone()));
        info!(job_id, persisted, "Job complete");

        JobOutcome {
            job_id: job_id.to_string(),
            status: StatusKind::Ok,
            output: Some(output),
            failed_simulations: Vec::new(),
            persisted,
        }
    }

    async fn fail_report(
        &self,
        job_id: &str,
        request: &CalculationRequest,
        failed: Vec<String>,
        total: usize,
        cancel: &CancellationToken,
    ) -> JobOutcome {
        let persistence = self.persistence.as_ref();
        let country = request.country_id();
        let persisted = with_one_retry(
            "mark_report_error",
            job_id,
            self.options.persistence_backoff(),
            move || persistence.mark_report_error(country, job_id),
        )
        .await;

        let info = if cancel.is_cancelled() {
            CalcError::Cancelled.to_error_info()
        } else {
            ErrorInfo {
                code: error_codes::SIMULATION_FAILED.to_string(),
                message: format!(
                    "{} of {total} simulations failed: {}",
                    failed.len(),
                    failed.join(", ")
                ),
                retryable: true,
            }
        };
        self.cache.settle(job_id, TaskOutcome::Error(info));
        warn!(job_id, failed = ?failed, persisted, "Job failed");

        JobOutcome {
            job_id: job_id.to_string(),
            status: StatusKind::Error,
            output: None,
            failed_simulations: failed,
            persisted,
        }
    }

    /// Remove a job: stop its coordinator timer, drop its results, and free
    /// its simulations.
    fn teardown(&self, job_id: &str) {
        let job = self.jobs.lock().remove(job_id);
        let Some(job) = job else {
            return;
        };
        {
            let mut running = self.running.lock();
            for id in &job.simulation_ids {
                running.remove(id);
            }
        }
        drop(job.timer);
        debug!(job_id, "Job torn down");
    }

    /// Whether a simulation is currently being calculated.
    #[must_use]
    pub fn is_running(&self, simulation_id: &str) -> bool {
        self.running.lock().contains(simulation_id)
    }

    /// Whether a job with this report id is in flight.
    #[must_use]
    pub fn has_job(&self, job_id: &str) -> bool {
        self.jobs.lock().contains_key(job_id)
    }

    /// Ids of jobs in flight, sorted.
    #[must_use]
    pub fn active_jobs(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.jobs.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Request cooperative cancellation of a running job.
    pub fn cancel_job(&self, job_id: &str) -> bool {
        let cancel = self.jobs.lock().get(job_id).map(|job| job.cancel.clone());
        match cancel {
            Some(cancel) => {
                info!(job_id, "Cancelling job");
                cancel.cancel();
                true
            }
            None => false,
        }
    }
}

/// Tears a job down however `run_job` exits, including abort.
struct Teardown {
    orchestrator: Arc<JobOrchestrator>,
    job_id: String,
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.orchestrator.teardown(&self.job_id);
    }
}

struct JobGuards {
    report: SettleOnDrop,
    teardown: Teardown,
}
