//! Server-queued economy calculations, polled for real progress.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use simcalc_core::cache::StatusCache;
use simcalc_core::constants::MAX_SYNTHETIC_PROGRESS;
use simcalc_core::error::CalcError;
use simcalc_core::estimator::linear_share;
use simcalc_core::options::EngineOptions;
use simcalc_core::progress::CancellationToken;
use simcalc_core::request::{CalculationFamily, CalculationRequest};
use simcalc_core::status::{
    CalcStatus, ProgressOverlay, StatusKind, StatusMetadata, TargetType, TaskOutcome,
};

use crate::executor::SettleOnDrop;
use crate::interfaces::{
    CalculationClient, EconomyPoll, JobObserver, JobOutcome, NullJobObserver, PersistenceClient,
};
use crate::retry::with_one_retry;

/// Message and progress for a `computing` poll.
///
/// Progress follows the server's average runtime linearly and is only
/// known once the server reports one.
fn describe_poll(
    queue_position: Option<u32>,
    average_time: Option<Duration>,
    elapsed: Duration,
) -> (f64, String) {
    let progress = average_time.map_or(0.0, |avg| linear_share(elapsed, avg, MAX_SYNTHETIC_PROGRESS));
    let message = match (queue_position, average_time) {
        (Some(position), _) if position > 0 => format!("Queued (position {position})"),
        (_, Some(avg)) => {
            let remaining = avg.saturating_sub(elapsed).as_secs();
            format!("Computing (about {remaining}s remaining)")
        }
        _ => "Computing".to_string(),
    };
    (progress, message)
}

/// Runs at most one poll loop per report id.
pub struct EconomyPoller {
    client: Arc<dyn CalculationClient>,
    persistence: Arc<dyn PersistenceClient>,
    cache: Arc<dyn StatusCache>,
    observer: Arc<dyn JobObserver>,
    options: EngineOptions,
    running: Mutex<HashSet<String>>,
}

impl EconomyPoller {
    #[must_use]
    pub fn new(
        client: Arc<dyn CalculationClient>,
        persistence: Arc<dyn PersistenceClient>,
        cache: Arc<dyn StatusCache>,
        options: &EngineOptions,
    ) -> Self {
        Self {
            client,
            persistence,
            cache,
            observer: Arc::new(NullJobObserver),
            options: options.clone().normalize(),
            running: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Start polling an economy report in the background. `Ok(None)` when
    /// the report is already being polled.
    pub fn start(
        self: &Arc<Self>,
        request: CalculationRequest,
        cancel: CancellationToken,
    ) -> Result<Option<JoinHandle<JobOutcome>>, CalcError> {
        if request.family() != CalculationFamily::Economy {
            return Err(CalcError::InvalidRequest(format!(
                "{} requests are not polled as economy reports",
                request.family()
            )));
        }
        let report_id = request.report_id().to_string();
        if !self.running.lock().insert(report_id.clone()) {
            info!(job_id = %report_id, "Economy report already polling, ignoring start");
            return Ok(None);
        }

        let metadata = StatusMetadata::now(&report_id, request.family(), TargetType::Report, &report_id);
        self.cache.set(&report_id, CalcStatus::computing(metadata, "Submitting"));
        self.observer.on_job_started(&report_id, request.simulation_ids());
        info!(job_id = %report_id, "Economy report started");

        // Built before the spawn so an abort ahead of the first poll still
        // frees the id and settles the report.
        let guards = RunGuards {
            release: Release {
                poller: Arc::clone(self),
                report_id: report_id.clone(),
            },
            settle: SettleOnDrop::new(Arc::clone(&self.cache), report_id),
        };
        let this = Arc::clone(self);
        Ok(Some(tokio::spawn(async move { this.run(request, cancel, guards).await })))
    }

    #[must_use]
    pub fn is_running(&self, report_id: &str) -> bool {
        self.running.lock().contains(report_id)
    }

    async fn run(self: Arc<Self>, request: CalculationRequest, cancel: CancellationToken, guards: RunGuards) -> JobOutcome {
        let RunGuards { release, settle: mut guard } = guards;
        let report_id = request.report_id();

        let result = self.poll_until_settled(&request, &cancel).await;

        let country = request.country_id();
        let persistence = self.persistence.as_ref();
        let backoff = self.options.persistence_backoff();
        let outcome = match result {
            Ok(output) => {
                let output_ref = &output;
                let persisted = with_one_retry("mark_report_completed", report_id, backoff, move || {
                    persistence.mark_report_completed(country, report_id, output_ref)
                })
                .await;
                self.cache.settle(report_id, TaskOutcome::Ok(output.clone()));
                info!(job_id = report_id, persisted, "Economy report complete");
                JobOutcome {
                    job_id: report_id.to_string(),
                    status: StatusKind::Ok,
                    output: Some(output),
                    failed_simulations: Vec::new(),
                    persisted,
                }
            }
            Err(e) => {
                let persisted = with_one_retry("mark_report_error", report_id, backoff, move || {
                    persistence.mark_report_error(country, report_id)
                })
                .await;
                self.cache.settle(report_id, TaskOutcome::Error(e.to_error_info()));
                warn!(job_id = report_id, error = %e, persisted, "Economy report failed");
                JobOutcome {
                    job_id: report_id.to_string(),
                    status: StatusKind::Error,
                    output: None,
                    failed_simulations: Vec::new(),
                    persisted,
                }
            }
        };
        guard.disarm();
        drop(release);
        self.observer.on_job_settled(&outcome);
        outcome
    }

    async fn poll_until_settled(
        &self,
        request: &CalculationRequest,
        cancel: &CancellationToken,
    ) -> Result<Value, CalcError> {
        let report_id = request.report_id();
        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.options.economy_poll());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut published = 0.0_f64;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(CalcError::Cancelled),
                _ = ticker.tick() => {}
            }
            let poll = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(CalcError::Cancelled),
                poll = self.client.call_economy(request) => poll?,
            };
            match poll {
                EconomyPoll::Ok(output) => return Ok(output),
                EconomyPoll::Error(message) => return Err(CalcError::remote(message)),
                EconomyPoll::Computing {
                    queue_position,
                    average_time,
                } => {
                    let (progress, message) = describe_poll(queue_position, average_time, started.elapsed());
                    published = published.max(progress);
                    self.cache.overlay(report_id, &ProgressOverlay::new(published, message));
                    debug!(job_id = report_id, ?queue_position, progress = published, "Economy poll");
                }
            }
        }
    }
}

struct RunGuards {
    release: Release,
    settle: SettleOnDrop,
}

/// Frees the report id for another start once the poll loop ends.
struct Release {
    poller: Arc<EconomyPoller>,
    report_id: String,
}

impl Drop for Release {
    fn drop(&mut self) {
        self.poller.running.lock().remove(&self.report_id);
    }
}
