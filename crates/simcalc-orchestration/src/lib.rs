//! # simcalc-orchestration
//!
//! Task execution, progress coordination, report fan-out/fan-in, and
//! calculation family routing.

pub mod coordinator;
pub mod economy;
pub mod executor;
pub mod interfaces;
pub mod orchestrator;
pub mod retry;
pub mod router;
pub mod simulated;

pub use coordinator::{CoordinatorTimer, ProgressCoordinator, SimulationPhase, SimulationProgressState};
pub use economy::EconomyPoller;
pub use executor::TaskExecutor;
pub use interfaces::{
    CalculationClient, EconomyPoll, JobObserver, JobOutcome, LoggingJobObserver, NullJobObserver,
    PersistenceClient, TaskResult,
};
pub use orchestrator::{aggregate_results, JobOrchestrator};
pub use router::{route, CalculationRouter, Strategy};
