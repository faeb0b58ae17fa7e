//! simcalc: policy simulation orchestration with live progress.

use simcalc_lib::{app, config, errors};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

fn main() {
    let config = config::AppConfig::parse();

    // Initialize tracing; logs go to stderr so stdout stays parseable.
    let default_level = if config.verbose {
        LevelFilter::INFO
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .init();

    let code = match app::run(&config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            errors::exit_code_for_error(&e)
        }
    };
    std::process::exit(code);
}
