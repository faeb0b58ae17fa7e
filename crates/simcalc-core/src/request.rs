//! Calculation requests and the tasks derived from them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CalcError;

/// Calculation family, which decides the execution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalculationFamily {
    /// Single blocking remote call per simulation, progress is synthesized locally.
    Household,
    /// Server-queued calculation polled for real status.
    Economy,
}

impl CalculationFamily {
    /// Lower-case name used in cache metadata and on the command line.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Household => "household",
            Self::Economy => "economy",
        }
    }
}

impl fmt::Display for CalculationFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CalculationFamily {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "household" => Ok(Self::Household),
            "economy" | "society" => Ok(Self::Economy),
            other => Err(CalcError::Config(format!("unknown calculation family: {other}"))),
        }
    }
}

/// Baseline and optional reform policy ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyIds {
    /// Policy the first simulation runs under.
    pub baseline: String,
    /// Policy the second simulation runs under, if any.
    #[serde(default)]
    pub reform: Option<String>,
}

/// Unvalidated request fields, as read from a caller or a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestParts {
    pub report_id: String,
    pub family: CalculationFamily,
    pub country_id: String,
    pub policy_ids: PolicyIds,
    pub population_id: String,
    pub simulation_ids: Vec<String>,
    #[serde(default)]
    pub region: Option<String>,
}

/// A validated, immutable calculation request for one report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationRequest {
    report_id: String,
    family: CalculationFamily,
    country_id: String,
    policy_ids: PolicyIds,
    population_id: String,
    simulation_ids: Vec<String>,
    region: Option<String>,
}

/// One simulation's share of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    /// Simulation id, also the status cache key for the task.
    pub simulation_id: String,
    /// Policy the simulation runs under.
    pub policy_id: String,
}

fn require(field: &str, value: &str) -> Result<(), CalcError> {
    if value.trim().is_empty() {
        return Err(CalcError::InvalidRequest(format!("{field} is required")));
    }
    Ok(())
}

impl TryFrom<RequestParts> for CalculationRequest {
    type Error = CalcError;

    fn try_from(parts: RequestParts) -> Result<Self, Self::Error> {
        require("reportId", &parts.report_id)?;
        require("countryId", &parts.country_id)?;
        require("populationId", &parts.population_id)?;
        require("policyIds.baseline", &parts.policy_ids.baseline)?;
        if let Some(reform) = &parts.policy_ids.reform {
            require("policyIds.reform", reform)?;
        }

        match parts.simulation_ids.len() {
            1 | 2 => {}
            n => {
                return Err(CalcError::InvalidRequest(format!(
                    "expected 1 or 2 simulation ids, got {n}"
                )))
            }
        }
        for id in &parts.simulation_ids {
            require("simulationIds[]", id)?;
            // Report and simulation statuses share one cache key space.
            if *id == parts.report_id {
                return Err(CalcError::InvalidRequest(format!(
                    "simulation id {id} is also the report id"
                )));
            }
        }
        if parts.simulation_ids.len() == 2 {
            if parts.simulation_ids[0] == parts.simulation_ids[1] {
                return Err(CalcError::InvalidRequest(format!(
                    "duplicate simulation id: {}",
                    parts.simulation_ids[0]
                )));
            }
            if parts.policy_ids.reform.is_none() {
                return Err(CalcError::InvalidRequest(
                    "a second simulation requires policyIds.reform".into(),
                ));
            }
        }

        Ok(Self {
            report_id: parts.report_id,
            family: parts.family,
            country_id: parts.country_id,
            policy_ids: parts.policy_ids,
            population_id: parts.population_id,
            simulation_ids: parts.simulation_ids,
            region: parts.region.filter(|r| !r.trim().is_empty()),
        })
    }
}

impl CalculationRequest {
    /// Report id; doubles as the job id and the report's cache key.
    #[must_use]
    pub fn report_id(&self) -> &str {
        &self.report_id
    }

    #[must_use]
    pub fn family(&self) -> CalculationFamily {
        self.family
    }

    #[must_use]
    pub fn country_id(&self) -> &str {
        &self.country_id
    }

    #[must_use]
    pub fn policy_ids(&self) -> &PolicyIds {
        &self.policy_ids
    }

    #[must_use]
    pub fn population_id(&self) -> &str {
        &self.population_id
    }

    /// Simulation ids in request order.
    #[must_use]
    pub fn simulation_ids(&self) -> &[String] {
        &self.simulation_ids
    }

    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Pair each simulation with its policy: the first runs the baseline,
    /// the second the reform.
    #[must_use]
    pub fn tasks(&self) -> Vec<TaskSpec> {
        self.simulation_ids
            .iter()
            .enumerate()
            .map(|(i, simulation_id)| {
                let policy_id = match (i, &self.policy_ids.reform) {
                    (1, Some(reform)) => reform.clone(),
                    _ => self.policy_ids.baseline.clone(),
                };
                TaskSpec {
                    simulation_id: simulation_id.clone(),
                    policy_id,
                }
            })
            .collect()
    }
}
