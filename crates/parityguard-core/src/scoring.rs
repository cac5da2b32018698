//! Tolerance-aware accuracy scoring.

use crate::result::ValidationStatus;

/// Slack applied at status boundaries so that `accuracy == 1 - t` passes
/// despite floating-point rounding.
const BOUNDARY_EPSILON: f64 = 1e-9;

/// Relative agreement between two values in `[0, 1]`.
///
/// `1 - |a - b| / mean(|a|, |b|)`, with `1.0` when both values are zero and
/// `0.0` when exactly one is zero.
pub fn accuracy(a: f64, b: f64) -> f64 {
    if a == 0.0 && b == 0.0 {
        return 1.0;
    }
    if a == 0.0 || b == 0.0 {
        return 0.0;
    }
    if !a.is_finite() || !b.is_finite() {
        return if a == b { 1.0 } else { 0.0 };
    }

    let diff = (a - b).abs();
    let mean = (a.abs() + b.abs()) / 2.0;
    (1.0 - diff / mean).max(0.0)
}

/// Map an accuracy onto a status for the given tolerance.
pub fn determine_status(accuracy: f64, tolerance: f64) -> ValidationStatus {
    if accuracy + BOUNDARY_EPSILON >= 1.0 - tolerance {
        ValidationStatus::Passed
    } else if accuracy + BOUNDARY_EPSILON >= 1.0 - 2.0 * tolerance {
        ValidationStatus::Warning
    } else {
        ValidationStatus::Failed
    }
}

/// `min / max` of two counts; `1.0` when both are zero.
pub fn ratio(left: usize, right: usize) -> f64 {
    let max = left.max(right);
    if max == 0 {
        return 1.0;
    }
    left.min(right) as f64 / max as f64
}
