//! Application entry point and dispatch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use serde_json::json;
use tracing::info;

use simcalc_cli::output::write_to_file;
use simcalc_cli::presenter::CliPresenter;
use simcalc_cli::progress::ProgressDisplay;
use simcalc_cli::ui::print_header;
use simcalc_core::cache::{MemoryStatusCache, StatusCache};
use simcalc_core::constants::exit_codes;
use simcalc_core::observers::{ChannelSubscriber, LoggingSubscriber};
use simcalc_core::options::EngineOptions;
use simcalc_core::progress::CancellationToken;
use simcalc_core::request::{CalculationFamily, CalculationRequest};
use simcalc_orchestration::interfaces::{EconomyPoll, JobOutcome, LoggingJobObserver};
use simcalc_orchestration::router::CalculationRouter;
use simcalc_orchestration::simulated::{PersistenceOp, SimulatedClient, SimulatedPersistence};

use crate::config::AppConfig;
use crate::errors::exit_code_for_outcome;
use crate::version::full_version;

/// Status events buffered between the cache and the progress display.
const EVENT_CHANNEL_CAPACITY: usize = 1_024;

/// Run the application and return the process exit code.
pub fn run(config: &AppConfig) -> Result<i32> {
    // Handle shell completion
    if let Some(shell) = config.completion {
        let mut cmd = <AppConfig as clap::CommandFactory>::command();
        simcalc_cli::completion::generate_completion(&mut cmd, shell, &mut std::io::stdout());
        return Ok(exit_codes::SUCCESS);
    }

    let request = config.request()?;
    let options = config.engine_options()?;
    let latency = config.latency_duration()?;

    let cancel = CancellationToken::new();
    ctrlc_handler(cancel.clone())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    run_report(config, &request, &options, latency, &cancel, &runtime)
}

fn run_report(
    config: &AppConfig,
    request: &CalculationRequest,
    options: &EngineOptions,
    latency: Duration,
    cancel: &CancellationToken,
    runtime: &tokio::runtime::Runtime,
) -> Result<i32> {
    if config.verbose && !config.quiet {
        print_header(&full_version());
    }

    let cache = Arc::new(MemoryStatusCache::new());
    let (tx, rx) = crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY);
    cache.subscribe(Arc::new(ChannelSubscriber::new(tx)));
    cache.subscribe(Arc::new(LoggingSubscriber::new(Duration::from_secs(1))));

    let visible = !config.quiet;
    let display = std::thread::spawn(move || ProgressDisplay::new(visible).run(&rx));

    let client = Arc::new(simulated_client(config, request, options, latency));
    let persistence = Arc::new(
        SimulatedPersistence::new()
            .failing(PersistenceOp::ReportCompleted, config.fail_persistence)
            .failing(PersistenceOp::ReportError, config.fail_persistence),
    );
    let router = CalculationRouter::new(
        client,
        persistence,
        cache.clone(),
        options,
        Arc::new(LoggingJobObserver),
    );

    info!(
        job_id = %request.report_id(),
        strategy = router.route(request).name(),
        "Dispatching report"
    );
    let started = Instant::now();
    let outcome: Result<JobOutcome> = runtime.block_on(async {
        let Some(handle) = router.dispatch_with_cancel(request.clone(), cancel.clone())? else {
            bail!("report {} is already running", request.report_id());
        };
        handle.await.map_err(|e| anyhow!("report task failed: {e}"))
    });
    let elapsed = started.elapsed();

    // Closing the channel ends the display thread.
    cache.clear_subscribers();
    let display = display
        .join()
        .map_err(|_| anyhow!("progress display thread panicked"))?;
    display.finish();
    let outcome = outcome?;

    let presenter = CliPresenter::new(config.verbose, config.quiet);
    presenter.present_outcome(&outcome, elapsed);
    if let Some(error) = cache.get(request.report_id()).and_then(|s| s.error().cloned()) {
        presenter.present_error(&error.message);
    }
    let statuses: Vec<_> = request
        .simulation_ids()
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(request.report_id()))
        .filter_map(|key| cache.get(key).map(|status| (key.to_string(), status)))
        .collect();
    presenter.present_statuses(&statuses);

    if let (Some(path), Some(output)) = (&config.output, &outcome.output) {
        write_to_file(path, output)?;
    }

    Ok(exit_code_for_outcome(&outcome, cancel.is_cancelled()))
}

/// Build the simulated remote service, injecting the requested failures.
fn simulated_client(
    config: &AppConfig,
    request: &CalculationRequest,
    options: &EngineOptions,
    latency: Duration,
) -> SimulatedClient {
    let mut client = SimulatedClient::new(latency);
    let failing: Vec<_> = request
        .tasks()
        .into_iter()
        .filter(|task| config.fail_simulation.contains(&task.simulation_id))
        .collect();
    for task in &failing {
        client = client.failing_policy(
            &task.policy_id,
            &format!("simulation {} failed on the server", task.simulation_id),
        );
    }

    if request.family() == CalculationFamily::Economy {
        let polls = config.economy_polls;
        let average = options
            .economy_poll()
            .checked_mul(polls.max(1))
            .unwrap_or(Duration::MAX);
        let queued = polls / 2;
        let mut script: Vec<EconomyPoll> = (0..polls)
            .map(|i| EconomyPoll::Computing {
                queue_position: (i < queued).then(|| queued - i),
                average_time: Some(average),
            })
            .collect();
        script.push(if failing.is_empty() {
            EconomyPoll::Ok(json!({
                "country": request.country_id(),
                "region": request.region(),
                "budget": {"change": -1_250_000_000_i64},
            }))
        } else {
            EconomyPoll::Error("economy calculation failed on the server".to_string())
        });
        client = client.with_economy_polls(script);
    }
    client
}

fn ctrlc_handler(cancel: CancellationToken) -> Result<()> {
    ctrlc::set_handler(move || {
        cancel.cancel();
    })?;
    Ok(())
}
