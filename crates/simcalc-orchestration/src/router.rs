//! Calculation family routing.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use simcalc_core::cache::StatusCache;
use simcalc_core::error::CalcError;
use simcalc_core::options::EngineOptions;
use simcalc_core::progress::CancellationToken;
use simcalc_core::request::{CalculationFamily, CalculationRequest};

use crate::economy::EconomyPoller;
use crate::interfaces::{CalculationClient, JobObserver, JobOutcome, PersistenceClient};
use crate::orchestrator::JobOrchestrator;

/// How a request is driven to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Client-side synthetic progress over parallel simulations.
    Household,
    /// Server-queued, polled for real progress.
    Economy,
}

impl Strategy {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Household => "household",
            Self::Economy => "economy",
        }
    }
}

/// Select the strategy for `request`.
#[must_use]
pub fn route(request: &CalculationRequest) -> Strategy {
    match request.family() {
        CalculationFamily::Household => Strategy::Household,
        CalculationFamily::Economy => Strategy::Economy,
    }
}

/// Dispatches requests to the household orchestrator or the economy poller.
pub struct CalculationRouter {
    orchestrator: Arc<JobOrchestrator>,
    economy: Arc<EconomyPoller>,
}

impl CalculationRouter {
    /// Build both strategies over the same collaborators.
    #[must_use]
    pub fn new(
        client: Arc<dyn CalculationClient>,
        persistence: Arc<dyn PersistenceClient>,
        cache: Arc<dyn StatusCache>,
        options: &EngineOptions,
        observer: Arc<dyn JobObserver>,
    ) -> Self {
        let orchestrator = JobOrchestrator::new(
            Arc::clone(&client),
            Arc::clone(&persistence),
            Arc::clone(&cache),
            options,
        )
        .with_observer(Arc::clone(&observer));
        let economy = EconomyPoller::new(client, persistence, cache, options).with_observer(observer);
        Self::from_parts(Arc::new(orchestrator), Arc::new(economy))
    }

    #[must_use]
    pub fn from_parts(orchestrator: Arc<JobOrchestrator>, economy: Arc<EconomyPoller>) -> Self {
        Self { orchestrator, economy }
    }

    #[must_use]
    pub fn route(&self, request: &CalculationRequest) -> Strategy {
        route(request)
    }

    pub fn dispatch(&self, request: CalculationRequest) -> Result<Option<JoinHandle<JobOutcome>>, CalcError> {
        self.dispatch_with_cancel(request, CancellationToken::new())
    }

    /// Hand `request` to its strategy. `Ok(None)` means it was already
    /// running and nothing new started.
    pub fn dispatch_with_cancel(
        &self,
        request: CalculationRequest,
        cancel: CancellationToken,
    ) -> Result<Option<JoinHandle<JobOutcome>>, CalcError> {
        let strategy = self.route(&request);
        debug!(job_id = %request.report_id(), strategy = strategy.name(), "Dispatching");
        if let Some(key) = self.key_held_by_other_strategy(&request, strategy) {
            return Err(CalcError::InvalidRequest(format!(
                "{key} is already in flight under another calculation family"
            )));
        }
        match strategy {
            Strategy::Household => self.orchestrator.start_job_with_cancel(request, cancel),
            Strategy::Economy => self.economy.start(request, cancel),
        }
    }

    /// A cache key of `request` that the other strategy is currently
    /// writing. Both strategies share the status cache.
    fn key_held_by_other_strategy<'a>(&self, request: &'a CalculationRequest, strategy: Strategy) -> Option<&'a str> {
        let report_id = request.report_id();
        match strategy {
            Strategy::Household => std::iter::once(report_id)
                .chain(request.simulation_ids().iter().map(String::as_str))
                .find(|key| self.economy.is_running(key)),
            Strategy::Economy => (self.orchestrator.has_job(report_id) || self.orchestrator.is_running(report_id))
                .then_some(report_id),
        }
    }

    /// Whether `id` (a household simulation or an economy report) is in
    /// flight. Dispatch keeps the two id sets disjoint.
    #[must_use]
    pub fn is_running(&self, id: &str) -> bool {
        self.orchestrator.is_running(id) || self.economy.is_running(id)
    }

    #[must_use]
    pub fn orchestrator(&self) -> &Arc<JobOrchestrator> {
        &self.orchestrator
    }

    #[must_use]
    pub fn economy(&self) -> &Arc<EconomyPoller> {
        &self.economy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use simcalc_core::cache::MemoryStatusCache;
    use simcalc_core::request::{PolicyIds, RequestParts};
    use simcalc_core::status::StatusKind;

    use crate::interfaces::NullJobObserver;
    use crate::simulated::{SimulatedClient, SimulatedPersistence};

    fn request(family: CalculationFamily) -> CalculationRequest {
        CalculationRequest::try_from(RequestParts {
            report_id: "r".into(),
            family,
            country_id: "uk".into(),
            policy_ids: PolicyIds {
                baseline: "base".into(),
                reform: None,
            },
            population_id: "hh".into(),
            simulation_ids: vec!["s".into()],
            region: None,
        })
        .unwrap()
    }

    fn router(client: Arc<SimulatedClient>) -> CalculationRouter {
        CalculationRouter::new(
            client,
            Arc::new(SimulatedPersistence::new()),
            Arc::new(MemoryStatusCache::new()),
            &EngineOptions::default(),
            Arc::new(NullJobObserver),
        )
    }

    #[test]
    fn route_by_family() {
        assert_eq!(route(&request(CalculationFamily::Household)), Strategy::Household);
        assert_eq!(route(&request(CalculationFamily::Economy)), Strategy::Economy);
        assert_eq!(Strategy::Economy.name(), "economy");
    }

    #[tokio::test(start_paused = true)]
    async fn household_dispatch_uses_orchestrator() {
        let client = Arc::new(SimulatedClient::new(Duration::from_secs(2)));
        let router = router(client.clone());
        let handle = router.dispatch(request(CalculationFamily::Household)).unwrap().unwrap();
        assert!(router.is_running("s"));

        let outcome = handle.await.unwrap();
        assert_eq!(outcome.status, StatusKind::Ok);
        assert_eq!(client.household_calls().len(), 1);
        assert_eq!(client.economy_calls(), 0);
        assert!(!router.is_running("s"));
    }

    #[tokio::test(start_paused = true)]
    async fn economy_dispatch_uses_poller() {
        let client = Arc::new(SimulatedClient::new(Duration::from_secs(2)));
        let router = router(client.clone());
        let handle = router.dispatch(request(CalculationFamily::Economy)).unwrap().unwrap();
        assert!(router.is_running("r"));

        let outcome = handle.await.unwrap();
        assert_eq!(outcome.status, StatusKind::Ok);
        assert!(client.household_calls().is_empty());
        assert_eq!(client.economy_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn families_cannot_share_an_in_flight_key() {
        let client = Arc::new(SimulatedClient::new(Duration::from_secs(2)));
        let router = router(client.clone());
        let household = router.dispatch(request(CalculationFamily::Household)).unwrap().unwrap();

        // The economy report "r" would overwrite the household report "r".
        let err = router.dispatch(request(CalculationFamily::Economy)).unwrap_err();
        assert!(matches!(err, CalcError::InvalidRequest(_)));
        assert_eq!(client.economy_calls(), 0);
        household.await.unwrap();

        let economy = router.dispatch(request(CalculationFamily::Economy)).unwrap().unwrap();
        let err = router.dispatch(request(CalculationFamily::Household)).unwrap_err();
        assert!(matches!(err, CalcError::InvalidRequest(_)));
        assert_eq!(economy.await.unwrap().status, StatusKind::Ok);
        assert_eq!(client.household_calls().len(), 1);
    }
}
