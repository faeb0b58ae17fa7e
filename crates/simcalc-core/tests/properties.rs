//! Property-based tests for progress estimation.

use std::time::Duration;

use proptest::prelude::*;

use simcalc_core::estimator::{estimate, linear_share, Phase};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Estimates never decrease as time passes.
    #[test]
    fn estimate_is_monotonic(a in 0u64..120_000, b in 0u64..120_000, cal in 0u64..90_000) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let cal = Duration::from_millis(cal);
        let p_lo = estimate(Duration::from_millis(lo), cal).progress;
        let p_hi = estimate(Duration::from_millis(hi), cal).progress;
        prop_assert!(p_lo <= p_hi, "{} > {} for {}ms..{}ms", p_lo, p_hi, lo, hi);
    }

    /// Estimates stay within 0..=95 whatever the inputs.
    #[test]
    fn estimate_is_bounded(elapsed in 0u64..1_000_000, cal in 0u64..1_000_000) {
        let e = estimate(Duration::from_millis(elapsed), Duration::from_millis(cal));
        prop_assert!((0.0..=95.0).contains(&e.progress));
    }

    /// The phase never moves backwards as progress rises.
    #[test]
    fn phase_is_monotonic(a in 0.0f64..100.0, b in 0.0f64..100.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(Phase::for_progress(lo) <= Phase::for_progress(hi));
    }

    /// A linear share never exceeds its ceiling.
    #[test]
    fn linear_share_respects_ceiling(elapsed in 0u64..200_000, cal in 0u64..100_000, n in 1usize..=2) {
        #[allow(clippy::cast_precision_loss)]
        let ceiling = 95.0 / n as f64;
        let share = linear_share(Duration::from_millis(elapsed), Duration::from_millis(cal), ceiling);
        prop_assert!(share >= 0.0);
        prop_assert!(share <= ceiling + 1e-9);
    }
}
