//! Shared helpers for the workspace integration tests.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use simcalc_core::cache::MemoryStatusCache;
use simcalc_core::observer::StatusSubscriber;
use simcalc_core::options::EngineOptions;
use simcalc_core::request::{CalculationFamily, CalculationRequest, PolicyIds, RequestParts};
use simcalc_core::status::{CalcStatus, StatusKind};
use simcalc_orchestration::interfaces::{JobObserver, JobOutcome, TaskResult};
use simcalc_orchestration::orchestrator::JobOrchestrator;
use simcalc_orchestration::simulated::{SimulatedClient, SimulatedPersistence};

/// Household request with one simulation per id. The second id, if any,
/// runs under the reform policy.
#[must_use]
pub fn household_request(report_id: &str, simulation_ids: &[&str]) -> CalculationRequest {
    request(CalculationFamily::Household, report_id, simulation_ids)
}

/// Request of the given family; see [`household_request`].
///
/// # Panics
///
/// Panics when the ids do not form a valid request.
#[must_use]
pub fn request(
    family: CalculationFamily,
    report_id: &str,
    simulation_ids: &[&str],
) -> CalculationRequest {
    CalculationRequest::try_from(RequestParts {
        report_id: report_id.to_string(),
        family,
        country_id: "us".to_string(),
        policy_ids: PolicyIds {
            baseline: "baseline".to_string(),
            reform: (simulation_ids.len() > 1).then(|| "reform".to_string()),
        },
        population_id: "household-1".to_string(),
        simulation_ids: simulation_ids.iter().map(|s| (*s).to_string()).collect(),
        region: None,
    })
    .expect("valid test request")
}

/// Engine options with a calibration of `calibration_ms` and defaults
/// for everything else.
#[must_use]
pub fn options(calibration_ms: u64) -> EngineOptions {
    EngineOptions {
        household_calibration_ms: calibration_ms,
        ..EngineOptions::default()
    }
}

/// Every record written to a cache, in write order across all keys.
#[derive(Default)]
pub struct RecordingSubscriber {
    log: Mutex<Vec<(String, CalcStatus)>>,
}

impl RecordingSubscriber {
    /// Records written to `key`, oldest first.
    #[must_use]
    pub fn history(&self, key: &str) -> Vec<CalcStatus> {
        self.log
            .lock()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, status)| status.clone())
            .collect()
    }

    /// Progress values written to `key` while it was still computing.
    #[must_use]
    pub fn computing_progress(&self, key: &str) -> Vec<f64> {
        self.history(key)
            .iter()
            .filter(|s| s.status() == StatusKind::Computing)
            .map(CalcStatus::progress)
            .collect()
    }

    /// Number of terminal records written to `key`.
    #[must_use]
    pub fn terminal_writes(&self, key: &str) -> usize {
        self.history(key).iter().filter(|s| s.is_terminal()).count()
    }

    /// Position in the global log of the first terminal write to `key`.
    #[must_use]
    pub fn settled_at(&self, key: &str) -> Option<usize> {
        self.log
            .lock()
            .iter()
            .position(|(k, status)| k == key && status.is_terminal())
    }
}

impl StatusSubscriber for RecordingSubscriber {
    fn on_status(&self, key: &str, status: &CalcStatus) {
        self.log.lock().push((key.to_string(), status.clone()));
    }
}

/// Job lifecycle event captured by [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Started { job_id: String, simulation_ids: Vec<String> },
    TaskSettled { job_id: String, simulation_id: String, ok: bool },
    Settled(JobOutcome),
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<JobEvent>>,
}

impl RecordingObserver {
    #[must_use]
    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().clone()
    }
}

impl JobObserver for RecordingObserver {
    fn on_job_started(&self, job_id: &str, simulation_ids: &[String]) {
        self.events.lock().push(JobEvent::Started {
            job_id: job_id.to_string(),
            simulation_ids: simulation_ids.to_vec(),
        });
    }

    fn on_task_settled(&self, job_id: &str, result: &TaskResult) {
        self.events.lock().push(JobEvent::TaskSettled {
            job_id: job_id.to_string(),
            simulation_id: result.simulation_id.clone(),
            ok: result.outcome.is_ok(),
        });
    }

    fn on_job_settled(&self, outcome: &JobOutcome) {
        self.events.lock().push(JobEvent::Settled(outcome.clone()));
    }
}

/// An orchestrator wired to simulated collaborators and a recorded cache.
pub struct Harness {
    pub client: Arc<SimulatedClient>,
    pub persistence: Arc<SimulatedPersistence>,
    pub cache: Arc<MemoryStatusCache>,
    pub recorder: Arc<RecordingSubscriber>,
    pub observer: Arc<RecordingObserver>,
    pub orchestrator: Arc<JobOrchestrator>,
}

impl Harness {
    #[must_use]
    pub fn new(client: SimulatedClient, persistence: SimulatedPersistence, options: &EngineOptions) -> Self {
        let client = Arc::new(client);
        let persistence = Arc::new(persistence);
        let cache = Arc::new(MemoryStatusCache::new());
        let recorder = Arc::new(RecordingSubscriber::default());
        cache.subscribe(recorder.clone());
        let observer = Arc::new(RecordingObserver::default());
        let orchestrator = Arc::new(
            JobOrchestrator::new(client.clone(), persistence.clone(), cache.clone(), options)
                .with_observer(observer.clone()),
        );
        Self {
            client,
            persistence,
            cache,
            recorder,
            observer,
            orchestrator,
        }
    }

    /// Household harness whose unscripted calls take `latency`.
    #[must_use]
    pub fn household(latency: Duration, options: &EngineOptions) -> Self {
        Self::new(SimulatedClient::new(latency), SimulatedPersistence::new(), options)
    }
}
