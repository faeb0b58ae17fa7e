//! Application configuration from CLI flags and environment.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use simcalc_core::error::CalcError;
use simcalc_core::options::EngineOptions;
use simcalc_core::request::{CalculationFamily, CalculationRequest, PolicyIds, RequestParts};

/// simcalc: run a policy simulation report against simulated services and
/// watch its progress.
#[derive(Parser, Debug)]
#[command(name = "simcalc", version, about)]
pub struct AppConfig {
    /// Calculation family: household or economy.
    #[arg(long, default_value = "household", env = "SIMCALC_FAMILY")]
    pub family: CalculationFamily,

    /// Country id.
    #[arg(long, default_value = "uk", env = "SIMCALC_COUNTRY")]
    pub country: String,

    /// Baseline policy id.
    #[arg(long, default_value = "current-law")]
    pub baseline: String,

    /// Reform policy id. Adds a second simulation when no ids are given.
    #[arg(long)]
    pub reform: Option<String>,

    /// Population id (household or geography).
    #[arg(long, default_value = "household-1")]
    pub population: String,

    /// Simulation id; repeat for a baseline/reform pair.
    #[arg(short = 's', long = "simulation")]
    pub simulations: Vec<String>,

    /// Region within the country.
    #[arg(long)]
    pub region: Option<String>,

    /// Report id, also the job id.
    #[arg(long, default_value = "report-1")]
    pub report_id: String,

    /// Engine options JSON file.
    #[arg(long, env = "SIMCALC_OPTIONS")]
    pub options: Option<PathBuf>,

    /// Override the household calibration in milliseconds.
    #[arg(long)]
    pub calibration_ms: Option<u64>,

    /// Simulated remote latency (e.g. "500ms", "3s", "1m").
    #[arg(long, default_value = "3s")]
    pub latency: String,

    /// Make this simulation's remote call fail.
    #[arg(long)]
    pub fail_simulation: Vec<String>,

    /// Number of report persistence writes that fail before succeeding.
    #[arg(long, default_value = "0")]
    pub fail_persistence: usize,

    /// Number of queued polls before an economy report completes.
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u32).range(0..=1000))]
    pub economy_polls: u32,

    /// Write the aggregate output to this file.
    #[arg(short, long)]
    pub output: Option<String>,

    /// Verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet mode (only output the aggregate).
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate shell completion.
    #[arg(long, value_enum)]
    pub completion: Option<clap_complete::Shell>,
}

impl AppConfig {
    /// Parse CLI arguments.
    #[must_use]
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Parse simulated latency into a Duration.
    pub fn latency_duration(&self) -> Result<Duration, CalcError> {
        parse_duration(&self.latency)
            .ok_or_else(|| CalcError::Config(format!("invalid latency: {}", self.latency)))
    }

    /// Simulation ids, defaulting to one per policy.
    #[must_use]
    pub fn simulation_ids(&self) -> Vec<String> {
        if !self.simulations.is_empty() {
            return self.simulations.clone();
        }
        let mut ids = vec![format!("{}-baseline", self.report_id)];
        if self.reform.is_some() {
            ids.push(format!("{}-reform", self.report_id));
        }
        ids
    }

    /// Build and validate the request.
    pub fn request(&self) -> Result<CalculationRequest, CalcError> {
        CalculationRequest::try_from(RequestParts {
            report_id: self.report_id.clone(),
            family: self.family,
            country_id: self.country.clone(),
            policy_ids: PolicyIds {
                baseline: self.baseline.clone(),
                reform: self.reform.clone(),
            },
            population_id: self.population.clone(),
            simulation_ids: self.simulation_ids(),
            region: self.region.clone(),
        })
    }

    /// Engine options from the options file, then flag overrides.
    pub fn engine_options(&self) -> Result<EngineOptions, CalcError> {
        let mut options = match &self.options {
            Some(path) => EngineOptions::load_from_path(path)?,
            None => EngineOptions::default(),
        };
        if let Some(ms) = self.calibration_ms {
            options.household_calibration_ms = ms;
        }
        Ok(options.normalize())
    }
}

/// Parse a duration string like "5m", "1h", "30s", "250ms".
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        let n: u64 = ms.parse().ok()?;
        Some(Duration::from_millis(n))
    } else if let Some(mins) = s.strip_suffix('m') {
        let n: u64 = mins.parse().ok()?;
        Some(Duration::from_secs(n * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        let n: u64 = hours.parse().ok()?;
        Some(Duration::from_secs(n * 3600))
    } else if let Some(secs) = s.strip_suffix('s') {
        let n: u64 = secs.parse().ok()?;
        Some(Duration::from_secs(n))
    } else {
        let n: u64 = s.parse().ok()?;
        Some(Duration::from_secs(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(args: &[&str]) -> AppConfig {
        AppConfig::try_parse_from(std::iter::once("simcalc").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn parse_duration_formats() {
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn defaults_build_single_simulation_request() {
        let cfg = config(&[]);
        let request = cfg.request().unwrap();
        assert_eq!(request.family(), CalculationFamily::Household);
        assert_eq!(request.simulation_ids(), ["report-1-baseline".to_string()]);
        assert_eq!(cfg.latency_duration().unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn reform_adds_second_simulation() {
        let cfg = config(&["--reform", "r-7"]);
        let request = cfg.request().unwrap();
        assert_eq!(request.simulation_ids().len(), 2);
        assert_eq!(request.tasks()[1].policy_id, "r-7");
    }

    #[test]
    fn explicit_simulations_and_economy_family() {
        let cfg = config(&["--family", "economy", "-s", "a", "-s", "b", "--reform", "x"]);
        let request = cfg.request().unwrap();
        assert_eq!(request.family(), CalculationFamily::Economy);
        assert_eq!(request.simulation_ids(), ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn second_simulation_without_reform_is_invalid() {
        let cfg = config(&["-s", "a", "-s", "b"]);
        assert!(matches!(cfg.request(), Err(CalcError::InvalidRequest(_))));
    }

    #[test]
    fn unknown_family_is_rejected_by_parser() {
        assert!(AppConfig::try_parse_from(["simcalc", "--family", "galaxy"]).is_err());
    }

    #[test]
    fn economy_polls_are_bounded() {
        assert_eq!(config(&["--economy-polls", "1000"]).economy_polls, 1000);
        assert!(AppConfig::try_parse_from(["simcalc", "--economy-polls", "1001"]).is_err());
        assert!(AppConfig::try_parse_from(["simcalc", "--economy-polls", "4294967295"]).is_err());
    }

    #[test]
    fn bad_latency_is_config_error() {
        let cfg = config(&["--latency", "fast"]);
        assert!(matches!(cfg.latency_duration(), Err(CalcError::Config(_))));
    }

    #[test]
    fn options_file_and_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"coordinator_tick_ms": 250, "household_calibration_ms": 9000}"#).unwrap();

        let cfg = config(&["--options", path.to_str().unwrap(), "--calibration-ms", "0"]);
        let options = cfg.engine_options().unwrap();
        assert_eq!(options.coordinator_tick_ms, 250);
        assert_eq!(options.household_calibration_ms, 0);
    }
}
