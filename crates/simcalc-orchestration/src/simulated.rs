//! In-process collaborators with scripted latency and failures.
//!
//! Used by the demo binary and by tests; neither talks to a real server.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::time::Instant;

use simcalc_core::error::CalcError;
use simcalc_core::request::CalculationRequest;

use crate::interfaces::{CalculationClient, EconomyPoll, PersistenceClient};

#[derive(Debug, Clone)]
struct HouseholdScript {
    delay: Duration,
    outcome: Result<Value, CalcError>,
}

/// Calculation client answering from per-policy scripts.
///
/// Policies without a script answer after the default latency with a
/// payload echoing the policy and population ids.
pub struct SimulatedClient {
    latency: Duration,
    household: Mutex<HashMap<String, HouseholdScript>>,
    economy: Mutex<VecDeque<EconomyPoll>>,
    household_calls: Mutex<Vec<String>>,
    economy_calls: Mutex<usize>,
}

impl SimulatedClient {
    #[must_use]
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            household: Mutex::new(HashMap::new()),
            economy: Mutex::new(VecDeque::new()),
            household_calls: Mutex::new(Vec::new()),
            economy_calls: Mutex::new(0),
        }
    }

    /// Answer household calls for `policy_id` with `outcome` after `delay`.
    #[must_use]
    pub fn with_household(
        self,
        policy_id: &str,
        delay: Duration,
        outcome: Result<Value, CalcError>,
    ) -> Self {
        self.household
            .lock()
            .insert(policy_id.to_string(), HouseholdScript { delay, outcome });
        self
    }

    /// Make household calls for `policy_id` fail after the default latency.
    #[must_use]
    pub fn failing_policy(self, policy_id: &str, message: &str) -> Self {
        let latency = self.latency;
        self.with_household(policy_id, latency, Err(CalcError::remote(message)))
    }

    /// Queue economy poll answers. The last one repeats once the queue is
    /// drained.
    #[must_use]
    pub fn with_economy_polls(self, polls: impl IntoIterator<Item = EconomyPoll>) -> Self {
        self.economy.lock().extend(polls);
        self
    }

    /// Policy ids of every household call received, in call order.
    #[must_use]
    pub fn household_calls(&self) -> Vec<String> {
        self.household_calls.lock().clone()
    }

    #[must_use]
    pub fn economy_calls(&self) -> usize {
        *self.economy_calls.lock()
    }
}

#[async_trait]
impl CalculationClient for SimulatedClient {
    async fn call_household(
        &self,
        country_id: &str,
        population_id: &str,
        policy_id: &str,
    ) -> Result<Value, CalcError> {
        self.household_calls.lock().push(policy_id.to_string());
        let script = self.household.lock().get(policy_id).cloned();
        let script = script.unwrap_or_else(|| HouseholdScript {
            delay: self.latency,
            outcome: Ok(json!({
                "country": country_id,
                "population": population_id,
                "policy": policy_id,
            })),
        });
        tokio::time::sleep(script.delay).await;
        script.outcome
    }

    async fn call_economy(&self, request: &CalculationRequest) -> Result<EconomyPoll, CalcError> {
        *self.economy_calls.lock() += 1;
        let poll = {
            let mut polls = self.economy.lock();
            if polls.len() > 1 {
                polls.pop_front()
            } else {
                polls.front().cloned()
            }
        };
        Ok(poll.unwrap_or_else(|| {
            EconomyPoll::Ok(json!({
                "country": request.country_id(),
                "region": request.region(),
            }))
        }))
    }
}

/// Persistence operation kinds, for failure injection and inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersistenceOp {
    SimulationOutput,
    SimulationError,
    ReportCompleted,
    ReportError,
}

/// One persistence call as seen by [`SimulatedPersistence`].
#[derive(Debug, Clone)]
pub struct PersistenceAttempt {
    pub op: PersistenceOp,
    /// Simulation or report id.
    pub entity_id: String,
    pub output: Option<Value>,
    pub at: Instant,
    pub succeeded: bool,
}

/// Persistence client that records every attempt and fails on demand.
#[derive(Default)]
pub struct SimulatedPersistence {
    failures: Mutex<HashMap<PersistenceOp, usize>>,
    attempts: Mutex<Vec<PersistenceAttempt>>,
}

impl SimulatedPersistence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` calls of `op`.
    #[must_use]
    pub fn failing(self, op: PersistenceOp, times: usize) -> Self {
        *self.failures.lock().entry(op).or_insert(0) += times;
        self
    }

    #[must_use]
    pub fn attempts(&self) -> Vec<PersistenceAttempt> {
        self.attempts.lock().clone()
    }

    /// Attempts of one kind, in call order.
    #[must_use]
    pub fn attempts_for(&self, op: PersistenceOp) -> Vec<PersistenceAttempt> {
        self.attempts
            .lock()
            .iter()
            .filter(|a| a.op == op)
            .cloned()
            .collect()
    }

    fn record(&self, op: PersistenceOp, entity_id: &str, output: Option<&Value>) -> Result<(), CalcError> {
        let fail = {
            let mut failures = self.failures.lock();
            match failures.get_mut(&op) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        self.attempts.lock().push(PersistenceAttempt {
            op,
            entity_id: entity_id.to_string(),
            output: output.cloned(),
            at: Instant::now(),
            succeeded: !fail,
        });
        if fail {
            Err(CalcError::Persistence(format!("{op:?} unavailable for {entity_id}")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PersistenceClient for SimulatedPersistence {
    async fn update_simulation_output(
        &self,
        _country_id: &str,
        simulation_id: &str,
        output: &Value,
    ) -> Result<(), CalcError> {
        self.record(PersistenceOp::SimulationOutput, simulation_id, Some(output))
    }

    async fn mark_simulation_error(&self, _country_id: &str, simulation_id: &str) -> Result<(), CalcError> {
        self.record(PersistenceOp::SimulationError, simulation_id, None)
    }

    async fn mark_report_completed(
        &self,
        _country_id: &str,
        report_id: &str,
        output: &Value,
    ) -> Result<(), CalcError> {
        self.record(PersistenceOp::ReportCompleted, report_id, Some(output))
    }

    async fn mark_report_error(&self, _country_id: &str, report_id: &str) -> Result<(), CalcError> {
        self.record(PersistenceOp::ReportError, report_id, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simcalc_core::request::{CalculationFamily, PolicyIds, RequestParts};

    fn economy_request() -> CalculationRequest {
        CalculationRequest::try_from(RequestParts {
            report_id: "r".into(),
            family: CalculationFamily::Economy,
            country_id: "us".into(),
            policy_ids: PolicyIds {
                baseline: "1".into(),
                reform: None,
            },
            population_id: "us".into(),
            simulation_ids: vec!["s".into()],
            region: None,
        })
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn unscripted_policy_echoes_ids_after_latency() {
        let client = SimulatedClient::new(Duration::from_secs(2));
        let start = Instant::now();
        let value = client.call_household("uk", "hh-1", "p-1").await.unwrap();
        assert_eq!(value["policy"], "p-1");
        assert_eq!(value["population"], "hh-1");
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(client.household_calls(), vec!["p-1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_policy_rejects() {
        let client = SimulatedClient::new(Duration::from_millis(10)).failing_policy("p-2", "boom");
        let err = client.call_household("uk", "hh", "p-2").await.unwrap_err();
        assert_eq!(err, CalcError::remote("boom"));
    }

    #[tokio::test]
    async fn economy_polls_drain_then_repeat_last() {
        let client = SimulatedClient::new(Duration::ZERO).with_economy_polls([
            EconomyPoll::Computing {
                queue_position: Some(2),
                average_time: None,
            },
            EconomyPoll::Ok(json!({"budget": 1})),
        ]);
        let request = economy_request();
        assert!(matches!(
            client.call_economy(&request).await.unwrap(),
            EconomyPoll::Computing { .. }
        ));
        assert_eq!(client.call_economy(&request).await.unwrap(), EconomyPoll::Ok(json!({"budget": 1})));
        assert_eq!(client.call_economy(&request).await.unwrap(), EconomyPoll::Ok(json!({"budget": 1})));
        assert_eq!(client.economy_calls(), 3);
    }

    #[tokio::test]
    async fn persistence_fails_requested_times_per_op() {
        let persistence = SimulatedPersistence::new().failing(PersistenceOp::ReportCompleted, 1);
        assert!(persistence
            .update_simulation_output("uk", "s", &json!(1))
            .await
            .is_ok());
        assert!(persistence
            .mark_report_completed("uk", "r", &json!({}))
            .await
            .is_err());
        assert!(persistence
            .mark_report_completed("uk", "r", &json!({}))
            .await
            .is_ok());

        let reports = persistence.attempts_for(PersistenceOp::ReportCompleted);
        assert_eq!(reports.len(), 2);
        assert!(!reports[0].succeeded);
        assert!(reports[1].succeeded);
        assert_eq!(persistence.attempts().len(), 3);
    }
}
