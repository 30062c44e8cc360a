//! Normalized cross-correlation of 1-D sequences.
//!
//! Lag `L` pairs `a[i]` with `b[i - L]`. Non-finite samples are missing
//! and drop out of the pair set.

use super::pearson::PearsonAccumulator;
use crate::error::CorrelationError;

/// Minimum number of overlapping finite pairs for a lag to count.
pub const DEFAULT_MIN_OVERLAP: usize = 2;

/// Best lag of a 1-D correlation.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Lag1d {
    pub lag: isize,
    pub coefficient: f64,
    /// Finite pairs used at this lag.
    pub overlap: usize,
}

/// Keep `cand` over `best` when it scores higher, or equal with smaller |lag|.
fn better(cand: &Lag1d, best: Option<&Lag1d>) -> bool {
    match best {
        None => true,
        Some(b) => {
            cand.coefficient > b.coefficient
                || (cand.coefficient == b.coefficient && cand.lag.unsigned_abs() < b.lag.unsigned_abs())
        }
    }
}

/// Linear (non-periodic) correlation over every lag with at least
/// `min_overlap` finite pairs. Sequences may differ in length.
pub fn correlate_1d(a: &[f64], b: &[f64], min_overlap: usize) -> Result<Lag1d, CorrelationError> {
    let mismatch = || CorrelationError::ShapeMismatch {
        left: [1, a.len()],
        right: [1, b.len()],
    };
    if a.is_empty() || b.is_empty() {
        return Err(mismatch());
    }
    let min_overlap = min_overlap.max(2);
    let (na, nb) = (a.len() as isize, b.len() as isize);

    let mut best: Option<Lag1d> = None;
    for lag in -(nb - 1)..na {
        let lo = lag.max(0);
        let hi = na.min(nb + lag);
        let mut acc = PearsonAccumulator::default();
        for i in lo..hi {
            acc.push_finite(a[i as usize], b[(i - lag) as usize]);
        }
        if acc.count() < min_overlap {
            continue;
        }
        if let Some(coefficient) = acc.coefficient() {
            let cand = Lag1d {
                lag,
                coefficient,
                overlap: acc.count(),
            };
            if better(&cand, best.as_ref()) {
                best = Some(cand);
            }
        }
    }
    best.ok_or_else(mismatch)
}

/// Periodic correlation of equal-length sequences over lags in
/// `[-max_lag, max_lag]`, with `max_lag` capped at half the length.
pub fn circular_correlate_1d(a: &[f64], b: &[f64], max_lag: usize) -> Result<Lag1d, CorrelationError> {
    if a.len() != b.len() {
        return Err(CorrelationError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    let n = a.len();
    let max_lag = max_lag.min(n / 2) as isize;

    let mut best: Option<Lag1d> = None;
    for lag in -max_lag..=max_lag {
        let mut acc = PearsonAccumulator::default();
        for (i, &x) in a.iter().enumerate() {
            let k = (i as isize - lag).rem_euclid(n as isize) as usize;
            acc.push_finite(x, b[k]);
        }
        if acc.count() < DEFAULT_MIN_OVERLAP {
            continue;
        }
        if let Some(coefficient) = acc.coefficient() {
            let cand = Lag1d {
                lag,
                coefficient,
                overlap: acc.count(),
            };
            if better(&cand, best.as_ref()) {
                best = Some(cand);
            }
        }
    }
    best.ok_or(CorrelationError::ShapeMismatch {
        left: [1, n],
        right: [1, n],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn bump(n: usize, center: f64) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let d = i as f64 - center;
                (-d * d / 8.0).exp()
            })
            .collect()
    }

    #[test]
    fn recovers_lag_between_sequences_of_different_length() {
        let a = bump(40, 25.0);
        let b = bump(30, 18.0);
        let best = correlate_1d(&a, &b, 10).unwrap();
        assert_eq!(best.lag, 7);
        assert_abs_diff_eq!(best.coefficient, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn missing_samples_are_skipped() {
        let mut a = bump(32, 12.0);
        a[3] = f64::NAN;
        a[20] = f64::NAN;
        let b = bump(32, 10.0);
        let best = correlate_1d(&a, &b, 10).unwrap();
        assert_eq!(best.lag, 2);
    }

    #[test]
    fn no_overlap_is_shape_mismatch() {
        assert!(matches!(
            correlate_1d(&[], &[1.0, 2.0], 2),
            Err(CorrelationError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            correlate_1d(&[1.0], &[2.0], 2),
            Err(CorrelationError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn circular_lag_wraps_and_requires_equal_length() {
        let a: Vec<f64> = (0..36).map(|i| (i as f64 * 10f64.to_radians()).sin()).collect();
        // b[i] = a[i + 3] so a[i] pairs with b[i - 3].
        let b: Vec<f64> = (0..36).map(|i| a[(i + 3) % 36]).collect();
        let best = circular_correlate_1d(&a, &b, 10).unwrap();
        assert_eq!(best.lag, 3);
        assert_eq!(best.overlap, 36);
        assert!(matches!(
            circular_correlate_1d(&a, &b[..30], 10),
            Err(CorrelationError::LengthMismatch { left: 36, right: 30 })
        ));
    }
}
