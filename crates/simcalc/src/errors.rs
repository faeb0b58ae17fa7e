//! Error handling and exit codes.

use simcalc_core::constants::exit_codes;
use simcalc_core::error::CalcError;
use simcalc_core::status::StatusKind;
use simcalc_orchestration::interfaces::JobOutcome;

/// Handle a calculation error and return the appropriate exit code.
pub fn handle_error(err: &CalcError) -> i32 {
    match err {
        CalcError::RemoteCalculation { .. } => exit_codes::ERROR_GENERIC,
        CalcError::Persistence(_) => exit_codes::ERROR_PERSISTENCE,
        CalcError::InvalidRequest(_) | CalcError::Config(_) => exit_codes::ERROR_CONFIG,
        CalcError::Cancelled => exit_codes::ERROR_CANCELED,
    }
}

/// Exit code for a top-level error, looking through `anyhow` context.
pub fn exit_code_for_error(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<CalcError>()
        .map_or(exit_codes::ERROR_GENERIC, handle_error)
}

/// Exit code for a settled report.
///
/// A complete report whose bookkeeping write failed still exits non-zero
/// so scripts can tell the stored state is stale.
pub fn exit_code_for_outcome(outcome: &JobOutcome, cancelled: bool) -> i32 {
    match outcome.status {
        StatusKind::Ok if outcome.persisted => exit_codes::SUCCESS,
        StatusKind::Ok => exit_codes::ERROR_PERSISTENCE,
        _ if cancelled => exit_codes::ERROR_CANCELED,
        _ => exit_codes::ERROR_GENERIC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: StatusKind, persisted: bool) -> JobOutcome {
        JobOutcome {
            job_id: "r".into(),
            status,
            output: None,
            failed_simulations: Vec::new(),
            persisted,
        }
    }

    #[test]
    fn error_codes() {
        assert_eq!(handle_error(&CalcError::Cancelled), 130);
        assert_eq!(handle_error(&CalcError::Persistence("down".into())), 2);
        assert_eq!(handle_error(&CalcError::Config("bad".into())), 4);
        assert_eq!(handle_error(&CalcError::InvalidRequest("bad".into())), 4);
        assert_eq!(handle_error(&CalcError::remote("boom")), 1);
    }

    #[test]
    fn anyhow_errors_are_downcast() {
        let err = anyhow::Error::new(CalcError::Config("x".into()));
        assert_eq!(exit_code_for_error(&err), 4);
        assert_eq!(exit_code_for_error(&anyhow::anyhow!("other")), 1);
    }

    #[test]
    fn outcome_codes() {
        assert_eq!(exit_code_for_outcome(&outcome(StatusKind::Ok, true), false), 0);
        assert_eq!(exit_code_for_outcome(&outcome(StatusKind::Ok, false), false), 2);
        assert_eq!(exit_code_for_outcome(&outcome(StatusKind::Error, true), false), 1);
        assert_eq!(exit_code_for_outcome(&outcome(StatusKind::Error, true), true), 130);
    }
}
