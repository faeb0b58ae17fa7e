//! CLI result presenter.

use std::time::Duration;

use simcalc_core::status::{CalcStatus, StatusKind};
use simcalc_orchestration::interfaces::JobOutcome;

use crate::output::{format_duration, format_json, format_progress};
use crate::ui::{print_error, status_label};

/// Render one status line: key, state, progress, message.
#[must_use]
pub fn render_status(key: &str, status: &CalcStatus) -> String {
    format!(
        "  {key:<20} {} {:>6}  {}",
        status_label(status.status()),
        format_progress(status.progress()),
        status.message()
    )
}

/// Prints the settled report.
pub struct CliPresenter {
    verbose: bool,
    quiet: bool,
}

impl CliPresenter {
    #[must_use]
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self { verbose, quiet }
    }

    /// Lines describing `outcome`. Quiet mode prints only the aggregate.
    #[must_use]
    pub fn render_outcome(&self, outcome: &JobOutcome, elapsed: Duration) -> Vec<String> {
        if self.quiet {
            return outcome
                .output
                .iter()
                .map(|output| output.to_string())
                .collect();
        }

        let mut lines = vec![
            format!("Report: {}", outcome.job_id),
            format!("Duration: {}", format_duration(elapsed)),
        ];
        match outcome.status {
            StatusKind::Ok => lines.push("Status: complete".to_string()),
            _ => lines.push(format!(
                "Status: failed ({})",
                if outcome.failed_simulations.is_empty() {
                    "report error".to_string()
                } else {
                    outcome.failed_simulations.join(", ")
                }
            )),
        }
        if !outcome.persisted {
            lines.push("Warning: report state was not persisted".to_string());
        }
        if let Some(output) = &outcome.output {
            lines.push(format!("Output: {}", format_json(output, self.verbose)));
        }
        lines
    }

    /// Lines listing the final status of every key, in the given order.
    #[must_use]
    pub fn render_statuses(&self, statuses: &[(String, CalcStatus)]) -> Vec<String> {
        if self.quiet {
            return Vec::new();
        }
        let mut lines = vec!["\nFinal statuses:".to_string(), format!("{:-<60}", "")];
        lines.extend(statuses.iter().map(|(key, status)| render_status(key, status)));
        lines
    }

    pub fn present_outcome(&self, outcome: &JobOutcome, elapsed: Duration) {
        for line in self.render_outcome(outcome, elapsed) {
            println!("{line}");
        }
    }

    pub fn present_statuses(&self, statuses: &[(String, CalcStatus)]) {
        for line in self.render_statuses(statuses) {
            println!("{line}");
        }
    }

    pub fn present_error(&self, error: &str) {
        print_error(error);
    }
}
