//! Synthetic progress estimation from wall-clock time.
//!
//! The remote household call reports nothing until it settles, so progress
//! is estimated from elapsed time against a calibration duration (the
//! typical runtime). Estimates never exceed [`MAX_SYNTHETIC_PROGRESS`].

use std::fmt;
use std::time::Duration;

use crate::constants::MAX_SYNTHETIC_PROGRESS;

/// Human-facing phase, a step function of progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Initializing,
    Running,
    ComputingImpacts,
    Finalizing,
}

impl Phase {
    /// Phase for a progress percentage.
    #[must_use]
    pub fn for_progress(progress: f64) -> Self {
        if progress < 20.0 {
            Self::Initializing
        } else if progress < 50.0 {
            Self::Running
        } else if progress < 80.0 {
            Self::ComputingImpacts
        } else {
            Self::Finalizing
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Initializing => "Initializing calculation",
            Self::Running => "Running simulation",
            Self::ComputingImpacts => "Computing impacts",
            Self::Finalizing => "Finalizing results",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One estimate: a percentage and its phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    /// Progress in `0..=95`.
    pub progress: f64,
    pub phase: Phase,
}

/// Elapsed time as a fraction of the calibration, clamped to `[0, 1]`.
///
/// A zero calibration counts as already elapsed.
#[must_use]
pub fn elapsed_fraction(elapsed: Duration, calibration: Duration) -> f64 {
    if calibration.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f64() / calibration.as_secs_f64()).clamp(0.0, 1.0)
}

/// Asymptotic estimate: fast at first, decelerating, capped at 95.
///
/// Uses the ease-out curve `100 * (1 - (1 - t)^2)` with `t` the elapsed
/// fraction, which reaches the cap at roughly 78% of the calibration.
#[must_use]
pub fn estimate(elapsed: Duration, calibration: Duration) -> Estimate {
    let t = elapsed_fraction(elapsed, calibration);
    let remaining = 1.0 - t;
    let progress = (100.0 * (1.0 - remaining * remaining)).min(MAX_SYNTHETIC_PROGRESS);
    Estimate {
        progress,
        phase: Phase::for_progress(progress),
    }
}

/// Linear growth towards a hard ceiling: `ceiling * t`.
///
/// Used for a single task's share of a blended job total, where the share
/// must be exactly zero at start and exactly `ceiling` once elapsed reaches
/// the calibration.
#[must_use]
pub fn linear_share(elapsed: Duration, calibration: Duration, ceiling: f64) -> f64 {
    ceiling.max(0.0) * elapsed_fraction(elapsed, calibration)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAL: Duration = Duration::from_millis(37_500);

    #[test]
    fn starts_at_zero() {
        let e = estimate(Duration::ZERO, CAL);
        assert!(e.progress.abs() < f64::EPSILON);
        assert_eq!(e.phase, Phase::Initializing);
    }

    #[test]
    fn zero_calibration_saturates() {
        let e = estimate(Duration::ZERO, Duration::ZERO);
        assert!((e.progress - 95.0).abs() < f64::EPSILON);
        assert_eq!(e.phase, Phase::Finalizing);
    }

    #[test]
    fn saturates_before_calibration_ends() {
        let e = estimate(Duration::from_secs(30), CAL);
        assert!((e.progress - 95.0).abs() < f64::EPSILON);
        let e = estimate(Duration::from_secs(40), CAL);
        assert!((e.progress - 95.0).abs() < f64::EPSILON);
    }

    #[test]
    fn decelerates() {
        let first = estimate(Duration::from_secs(5), CAL).progress;
        let second = estimate(Duration::from_secs(10), CAL).progress - first;
        assert!(first > second);
    }

    #[test]
    fn phase_thresholds() {
        assert_eq!(Phase::for_progress(0.0), Phase::Initializing);
        assert_eq!(Phase::for_progress(19.9), Phase::Initializing);
        assert_eq!(Phase::for_progress(20.0), Phase::Running);
        assert_eq!(Phase::for_progress(50.0), Phase::ComputingImpacts);
        assert_eq!(Phase::for_progress(80.0), Phase::Finalizing);
        assert_eq!(Phase::for_progress(95.0), Phase::Finalizing);
    }

    #[test]
    fn phase_display() {
        assert_eq!(Phase::Running.to_string(), "Running simulation");
    }

    #[test]
    fn linear_share_bounds() {
        assert!(linear_share(Duration::ZERO, CAL, 47.5).abs() < f64::EPSILON);
        assert!((linear_share(CAL, CAL, 47.5) - 47.5).abs() < f64::EPSILON);
        assert!((linear_share(CAL * 3, CAL, 47.5) - 47.5).abs() < f64::EPSILON);
        let half = linear_share(CAL / 2, CAL, 47.5);
        assert!((half - 23.75).abs() < 1e-9);
    }

    #[test]
    fn linear_share_zero_calibration() {
        assert!((linear_share(Duration::ZERO, Duration::ZERO, 95.0) - 95.0).abs() < f64::EPSILON);
    }
}
