//!
//! Bisection over a monotone predicate.
//!
//! Both the Frank-Wolfe line search (root of the directional derivative) and the
//! constrained step repair (boundary of the feasible region) reduce to it.
//!
use crate::error::{AssignmentError, Result};

/// hard cap on halvings, reached only if `tolerance` is below float resolution
const MAX_HALVINGS: usize = 200;

///
/// Narrow `[low, high]` to width `tolerance` around the point where `is_low(x)` switches
/// from `true` (left) to `false` (right). `is_low` is assumed true at `low` and false at
/// `high`; neither endpoint is evaluated.
///
/// Returns the final `(low, high)`.
///
pub fn bisect<P>(mut low: f64, mut high: f64, tolerance: f64, mut is_low: P) -> (f64, f64)
where
    P: FnMut(f64) -> bool,
{
    let mut halvings = 0;
    while high - low > tolerance && halvings < MAX_HALVINGS {
        let mid = (low + high) / 2.0;
        if is_low(mid) {
            low = mid;
        } else {
            high = mid;
        }
        halvings += 1;
    }
    (low, high)
}

///
/// Root of a nondecreasing `f` on `[low, high]`.
/// `f(low) < 0 < f(high)` is required, anything else is `RootNotBracketed`.
///
pub fn find_root<F>(mut f: F, low: f64, high: f64, tolerance: f64) -> Result<f64>
where
    F: FnMut(f64) -> f64,
{
    let d_low = f(low);
    let d_high = f(high);
    if !(d_low < 0.0 && d_high > 0.0) {
        return Err(AssignmentError::RootNotBracketed {
            low,
            high,
            d_low,
            d_high,
        });
    }
    let (a, b) = bisect(low, high, tolerance, |x| f(x) < 0.0);
    Ok((a + b) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bisect_finds_threshold() {
        let (low, high) = bisect(0.0, 1.0, 1e-6, |x| x <= 0.3);
        assert!(high - low <= 1e-6);
        assert!(low <= 0.3 && 0.3 <= high);
    }

    #[test]
    fn bisect_all_false_collapses_to_low() {
        let (low, high) = bisect(0.0, 0.8, 1e-6, |_| false);
        assert_eq!(low, 0.0);
        assert!(high <= 1e-6);
    }

    #[test]
    fn bisect_terminates_with_zero_tolerance() {
        let (low, high) = bisect(0.0, 1.0, 0.0, |x| x < 0.5);
        assert!(low <= 0.5 && high >= 0.5);
    }

    #[test]
    fn find_root_of_increasing_function() {
        let root = find_root(|x| x * x * x - 0.125, 0.0, 1.0, 1e-12).unwrap();
        assert!((root - 0.5).abs() < 1e-9);
    }

    #[test]
    fn find_root_not_bracketed() {
        // decreasing
        assert!(matches!(
            find_root(|x| 0.5 - x, 0.0, 1.0, 1e-9),
            Err(AssignmentError::RootNotBracketed { .. })
        ));
        // NaN
        assert!(find_root(|_| f64::NAN, 0.0, 1.0, 1e-9).is_err());
    }
}
