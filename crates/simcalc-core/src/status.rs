//! Cache-resident status records and the two partial writes applied to them.
//!
//! A [`CalcStatus`] has two writers with disjoint fields. The task executor
//! owns `status`, `result` and `error` and changes them only through
//! [`CalcStatus::settle`]. Progress publishers own `progress` and `message`
//! and change them only through [`CalcStatus::apply_overlay`]. Neither path
//! can touch the other's fields, and once a record is terminal both are
//! refused.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::COMPLETE_PROGRESS;
use crate::request::CalculationFamily;

/// Lifecycle state of one task: `computing -> {ok | error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Computing,
    Ok,
    Error,
}

impl StatusKind {
    /// `ok` and `error` admit no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Computing)
    }
}

/// What a status record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Simulation,
    Report,
}

/// Error details carried by a terminal `error` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

/// Identifies the task and job a record belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMetadata {
    pub task_id: String,
    pub family: CalculationFamily,
    pub target_type: TargetType,
    pub started_at: DateTime<Utc>,
    pub job_id: String,
}

impl StatusMetadata {
    /// Metadata stamped with the current wall-clock time.
    #[must_use]
    pub fn now(
        task_id: impl Into<String>,
        family: CalculationFamily,
        target_type: TargetType,
        job_id: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            family,
            target_type,
            started_at: Utc::now(),
            job_id: job_id.into(),
        }
    }
}

/// Progress fields written by progress publishers.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressOverlay {
    pub progress: f64,
    pub message: String,
}

impl ProgressOverlay {
    #[must_use]
    pub fn new(progress: f64, message: impl Into<String>) -> Self {
        Self {
            progress: progress.clamp(0.0, COMPLETE_PROGRESS),
            message: message.into(),
        }
    }
}

/// Terminal outcome written by the owner of a task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Ok(Value),
    Error(ErrorInfo),
}

/// Latest status of one task, as stored in the status cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalcStatus {
    status: StatusKind,
    progress: f64,
    message: String,
    result: Option<Value>,
    error: Option<ErrorInfo>,
    metadata: StatusMetadata,
}

impl CalcStatus {
    /// Fresh `computing` record at 0%.
    #[must_use]
    pub fn computing(metadata: StatusMetadata, message: impl Into<String>) -> Self {
        Self {
            status: StatusKind::Computing,
            progress: 0.0,
            message: message.into(),
            result: None,
            error: None,
            metadata,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusKind {
        self.status
    }

    /// Progress in `0..=100`.
    #[must_use]
    pub fn progress(&self) -> f64 {
        self.progress
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn metadata(&self) -> &StatusMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Overwrite `progress` and `message`. Refused once terminal.
    pub fn apply_overlay(&mut self, overlay: &ProgressOverlay) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.progress = overlay.progress;
        self.message.clone_from(&overlay.message);
        true
    }

    /// Move to a terminal state. Refused if already terminal.
    ///
    /// Success pins progress at 100; failure freezes it where it was.
    pub fn settle(&mut self, outcome: TaskOutcome) -> bool {
        if self.is_terminal() {
            return false;
        }
        match outcome {
            TaskOutcome::Ok(result) => {
                self.status = StatusKind::Ok;
                self.progress = COMPLETE_PROGRESS;
                self.message = "Calculation complete".to_string();
                self.result = Some(result);
            }
            TaskOutcome::Error(info) => {
                self.status = StatusKind::Error;
                self.message.clone_from(&info.message);
                self.error = Some(info);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> CalcStatus {
        CalcStatus::computing(
            StatusMetadata::now("sim-1", CalculationFamily::Household, TargetType::Simulation, "r1"),
            "Starting",
        )
    }

    fn failure() -> ErrorInfo {
        ErrorInfo {
            code: "calculation_failed".into(),
            message: "boom".into(),
            retryable: true,
        }
    }

    #[test]
    fn computing_starts_at_zero() {
        let s = record();
        assert_eq!(s.status(), StatusKind::Computing);
        assert!(s.progress().abs() < f64::EPSILON);
        assert!(s.result().is_none());
        assert!(!s.is_terminal());
    }

    #[test]
    fn overlay_touches_only_progress_fields() {
        let mut s = record();
        assert!(s.apply_overlay(&ProgressOverlay::new(42.0, "Running")));
        assert!((s.progress() - 42.0).abs() < f64::EPSILON);
        assert_eq!(s.message(), "Running");
        assert_eq!(s.status(), StatusKind::Computing);
    }

    #[test]
    fn overlay_clamps() {
        let o = ProgressOverlay::new(140.0, "x");
        assert!((o.progress - 100.0).abs() < f64::EPSILON);
        let o = ProgressOverlay::new(-3.0, "x");
        assert!(o.progress.abs() < f64::EPSILON);
    }

    #[test]
    fn success_pins_progress_at_100() {
        let mut s = record();
        s.apply_overlay(&ProgressOverlay::new(95.0, "Finalizing"));
        assert!(s.settle(TaskOutcome::Ok(json!({"x": 1}))));
        assert_eq!(s.status(), StatusKind::Ok);
        assert!((s.progress() - 100.0).abs() < f64::EPSILON);
        assert_eq!(s.result(), Some(&json!({"x": 1})));
    }

    #[test]
    fn failure_freezes_progress() {
        let mut s = record();
        s.apply_overlay(&ProgressOverlay::new(30.0, "Running"));
        assert!(s.settle(TaskOutcome::Error(failure())));
        assert_eq!(s.status(), StatusKind::Error);
        assert!((s.progress() - 30.0).abs() < f64::EPSILON);
        assert_eq!(s.message(), "boom");
        assert!(s.error().unwrap().retryable);
    }

    #[test]
    fn terminal_records_are_immutable() {
        let mut s = record();
        s.settle(TaskOutcome::Ok(json!(1)));
        assert!(!s.apply_overlay(&ProgressOverlay::new(50.0, "late tick")));
        assert!(!s.settle(TaskOutcome::Error(failure())));
        assert_eq!(s.status(), StatusKind::Ok);
        assert!((s.progress() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn serializes_for_readers() {
        let s = record();
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["status"], "computing");
        assert_eq!(v["metadata"]["taskId"], "sim-1");
        assert_eq!(v["metadata"]["targetType"], "simulation");
        assert_eq!(v["metadata"]["family"], "household");
    }
}
