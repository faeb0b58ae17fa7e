//! Job-level progress blended across sibling simulations.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use simcalc_core::cache::StatusCache;
use simcalc_core::constants::MAX_SYNTHETIC_PROGRESS;
use simcalc_core::estimator::linear_share;
use simcalc_core::status::ProgressOverlay;

/// Coordinator-side lifecycle of one simulation.
///
/// `Initializing -> Pending -> {Complete | Error}`; never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationPhase {
    Initializing,
    Pending,
    Complete,
    Error,
}

impl SimulationPhase {
    #[must_use]
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

/// Per-simulation state owned by a [`ProgressCoordinator`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationProgressState {
    pub id: String,
    pub phase: SimulationPhase,
    pub start_time: Option<Instant>,
    pub completion_time: Option<Instant>,
}

impl SimulationProgressState {
    fn new(id: String) -> Self {
        Self {
            id,
            phase: SimulationPhase::Initializing,
            start_time: None,
            completion_time: None,
        }
    }
}

/// Blends the progress of one job's simulations and republishes it.
///
/// Each simulation owns an equal share of a 95-point budget. The remaining
/// points belong to the orchestrator's terminal report write.
pub struct ProgressCoordinator {
    job_id: String,
    states: Mutex<Vec<SimulationProgressState>>,
    calibration: Duration,
    cache: Arc<dyn StatusCache>,
    published: Mutex<f64>,
}

impl ProgressCoordinator {
    #[must_use]
    pub fn new(
        job_id: impl Into<String>,
        simulation_ids: impl IntoIterator<Item = String>,
        calibration: Duration,
        cache: Arc<dyn StatusCache>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            states: Mutex::new(simulation_ids.into_iter().map(SimulationProgressState::new).collect()),
            calibration,
            cache,
            published: Mutex::new(0.0),
        }
    }

    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// The simulation's remote call has begun.
    pub fn start_task(&self, id: &str) -> bool {
        self.transition(id, SimulationPhase::Pending)
    }

    pub fn complete_task(&self, id: &str) -> bool {
        self.transition(id, SimulationPhase::Complete)
    }

    pub fn fail_task(&self, id: &str) -> bool {
        self.transition(id, SimulationPhase::Error)
    }

    fn transition(&self, id: &str, to: SimulationPhase) -> bool {
        let now = Instant::now();
        let mut states = self.states.lock();
        let Some(state) = states.iter_mut().find(|s| s.id == id) else {
            warn!(job_id = %self.job_id, simulation_id = id, "Unknown simulation for coordinator");
            return false;
        };
        let allowed = match (state.phase, to) {
            (SimulationPhase::Initializing, SimulationPhase::Pending) => true,
            (SimulationPhase::Initializing | SimulationPhase::Pending, next) => next.is_settled(),
            _ => false,
        };
        if !allowed {
            return false;
        }
        match to {
            SimulationPhase::Pending => state.start_time = Some(now),
            _ => state.completion_time = Some(now),
        }
        state.phase = to;
        true
    }

    /// Snapshot of every simulation's state, in construction order.
    #[must_use]
    pub fn states(&self) -> Vec<SimulationProgressState> {
        self.states.lock().clone()
    }

    /// Blended progress at `now`, in `0..=95`.
    ///
    /// Pending simulations grow linearly to their share over the
    /// calibration; complete ones count in full; initializing or failed
    /// ones count zero.
    #[must_use]
    pub fn blended_progress_at(&self, now: Instant) -> f64 {
        let states = self.states.lock();
        if states.is_empty() {
            return 0.0;
        }
        if states.iter().all(|s| s.phase == SimulationPhase::Complete) {
            return MAX_SYNTHETIC_PROGRESS;
        }
        #[allow(clippy::cast_precision_loss)]
        let share = MAX_SYNTHETIC_PROGRESS / states.len() as f64;
        let total: f64 = states
            .iter()
            .map(|s| match (s.phase, s.start_time) {
                (SimulationPhase::Pending, Some(start)) => {
                    linear_share(now.saturating_duration_since(start), self.calibration, share)
                }
                (SimulationPhase::Complete, _) => share,
                _ => 0.0,
            })
            .sum();
        total.min(MAX_SYNTHETIC_PROGRESS)
    }

    #[must_use]
    pub fn blended_progress(&self) -> f64 {
        self.blended_progress_at(Instant::now())
    }

    /// Human-facing message for `progress`, escalating as it rises.
    #[must_use]
    pub fn message_for(&self, progress: f64) -> String {
        let states = self.states.lock();
        let total = states.len();
        let done = states.iter().filter(|s| s.phase == SimulationPhase::Complete).count();
        if states.iter().all(|s| s.phase == SimulationPhase::Initializing) {
            "Preparing simulations".to_string()
        } else if states.iter().all(|s| s.phase.is_settled()) {
            "Finalizing report".to_string()
        } else if progress < 30.0 {
            format!("Running simulations ({done}/{total} complete)")
        } else if progress < 70.0 {
            format!("Computing policy impacts ({done}/{total} complete)")
        } else {
            format!("Almost done ({done}/{total} complete)")
        }
    }

    /// Recompute and overlay progress on every simulation key and on the
    /// job's own key. Published progress never decreases, even when a
    /// failed simulation drops out of the blend.
    pub fn tick(&self) -> f64 {
        let blended = self.blended_progress();
        let progress = {
            let mut published = self.published.lock();
            *published = published.max(blended);
            *published
        };
        let overlay = ProgressOverlay::new(progress, self.message_for(progress));
        let ids: Vec<String> = self.states.lock().iter().map(|s| s.id.clone()).collect();
        for id in &ids {
            self.cache.overlay(id, &overlay);
        }
        self.cache.overlay(&self.job_id, &overlay);
        trace!(job_id = %self.job_id, progress, "Coordinator tick");
        progress
    }

    /// Spawn the repeating republish timer. Must run inside a Tokio runtime.
    #[must_use]
    pub fn start_timer(self: &Arc<Self>, every: Duration) -> CoordinatorTimer {
        let coordinator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                coordinator.tick();
            }
        });
        debug!(job_id = %self.job_id, every_ms = u64::try_from(every.as_millis()).unwrap_or(u64::MAX), "Coordinator timer started");
        CoordinatorTimer { handle }
    }

    pub fn stop(&self, timer: CoordinatorTimer) {
        timer.stop();
        debug!(job_id = %self.job_id, "Coordinator timer stopped");
    }
}

/// Owns a coordinator's timer task; aborts it when stopped or dropped.
pub struct CoordinatorTimer {
    handle: JoinHandle<()>,
}

impl CoordinatorTimer {
    pub fn stop(self) {
        drop(self);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for CoordinatorTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
