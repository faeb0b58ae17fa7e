//! Error type shared by every orchestration layer.

use crate::constants::error_codes;
use crate::status::ErrorInfo;

/// Error type for calculation orchestration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalcError {
    /// The request violates a construction-time invariant.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The remote calculation collaborator rejected.
    #[error("remote calculation failed: {message}")]
    RemoteCalculation {
        /// Machine-readable code reported by the collaborator.
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// A persistence write failed.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// The task was cancelled before it settled.
    #[error("calculation cancelled")]
    Cancelled,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl CalcError {
    /// Shorthand for a remote failure with the generic code.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::RemoteCalculation {
            code: error_codes::CALCULATION_FAILED.to_string(),
            message: message.into(),
        }
    }

    /// Machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            Self::RemoteCalculation { code, .. } => code,
            Self::Persistence(_) => error_codes::PERSISTENCE_FAILED,
            Self::Cancelled => error_codes::CANCELLED,
            Self::Config(_) => error_codes::CONFIG,
        }
    }

    /// Whether re-running the calculation may succeed.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::RemoteCalculation { .. } | Self::Cancelled)
    }

    /// Convert into the cache-resident error record.
    #[must_use]
    pub fn to_error_info(&self) -> ErrorInfo {
        let message = match self {
            Self::RemoteCalculation { message, .. } => message.clone(),
            other => other.to_string(),
        };
        ErrorInfo {
            code: self.code().to_string(),
            message,
            retryable: self.retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calc_error_display() {
        let err = CalcError::InvalidRequest("missing population".into());
        assert_eq!(err.to_string(), "invalid request: missing population");

        let err = CalcError::Cancelled;
        assert_eq!(err.to_string(), "calculation cancelled");
    }

    #[test]
    fn remote_failures_are_retryable() {
        let err = CalcError::remote("upstream 502");
        assert!(err.retryable());
        assert_eq!(err.code(), error_codes::CALCULATION_FAILED);
        assert!(!CalcError::Persistence("disk".into()).retryable());
        assert!(!CalcError::InvalidRequest("x".into()).retryable());
    }

    #[test]
    fn error_info_keeps_remote_message() {
        let info = CalcError::remote("upstream 502").to_error_info();
        assert_eq!(info.message, "upstream 502");
        assert_eq!(info.code, "calculation_failed");
        assert!(info.retryable);
    }

    #[test]
    fn error_info_for_cancellation() {
        let info = CalcError::Cancelled.to_error_info();
        assert_eq!(info.code, "cancelled");
        assert_eq!(info.message, "calculation cancelled");
        assert!(info.retryable);
    }
}
