//! Normalized cross-correlation of unwrapped iris bands.
//!
//! - [`correlate_1d`] / [`circular_correlate_1d`]: 1-D sequences (radial or
//!   angular profiles).
//! - [`correlation_surface`] + [`resolve_peak`]: the 2-D angular search
//!   over masked polar images, split so surfaces can be computed in
//!   parallel while peak selection stays sequential.
//! - [`correlate`]: both steps in one call.
//!
//! Offsets are in columns; positive offsets mean the target is rotated
//! counter-clockwise relative to the reference.

mod pearson;
mod spline;
mod surface;
mod xcorr1d;
mod xcorr2d;

pub use spline::NaturalCubicSpline;
pub use surface::{CorrelationSurface, SurfaceCell};
pub use xcorr1d::{circular_correlate_1d, correlate_1d, Lag1d, DEFAULT_MIN_OVERLAP};
pub use xcorr2d::{correlation_surface, resolve_peak, MIN_INTERP_POINTS};

use crate::error::{FailureReason, ParameterError};
use crate::geometry::AngularRange;
use crate::occlusion::MaskedPolar;

/// Angular search and refinement parameters.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Search half-range in degrees. Must not exceed half a turn of the
    /// polar image.
    pub max_angle_deg: f64,
    /// Radial shift half-range in rows (0 disables the radial search).
    pub radial_window: usize,
    /// Sub-column grid step of the refinement, in columns, `(0, 1]`.
    pub upsample_resolution: f64,
    /// Minimum coefficient for an accepted peak, in `[-1, 1]`.
    pub min_coefficient: f64,
    /// Valid pairs required per offset, as a fraction of the reference's
    /// usable samples.
    pub min_valid_fraction: f32,
    /// Offsets on each side of the coarse peak available to the spline.
    pub refine_halfwidth: usize,
    /// Local maxima this close to the global maximum are ambiguous and
    /// resolved by temporal continuity.
    pub tie_tolerance: f64,
    /// Run a 1-D circular correlation of angular profiles first and report
    /// it alongside the peak.
    pub coarse_prealign: bool,
    /// Restrict the reference to columns whose angle falls in this range.
    /// Target columns are not restricted, so shifts may carry the window
    /// onto any part of the target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_window: Option<AngularRange>,
}

impl SearchConfig {
    pub const DEFAULT_MAX_ANGLE_DEG: f64 = 25.0;
    pub const DEFAULT_UPSAMPLE_RESOLUTION: f64 = 0.01;
    pub const DEFAULT_MIN_COEFFICIENT: f64 = 0.3;
    pub const DEFAULT_MIN_VALID_FRACTION: f32 = 0.1;
    pub const DEFAULT_REFINE_HALFWIDTH: usize = 4;
    pub const DEFAULT_TIE_TOLERANCE: f64 = 0.01;

    /// Validate against a `[n_radius, n_theta]` polar shape and return the
    /// angular half-range in columns.
    pub fn validate_for(&self, shape: [usize; 2]) -> Result<usize, ParameterError> {
        let [n_r, n_t] = shape;
        if !(self.max_angle_deg.is_finite() && self.max_angle_deg > 0.0) {
            return Err(ParameterError::new("max_angle_deg", "must be finite and positive"));
        }
        if self.max_angle_deg > 180.0 {
            return Err(ParameterError::new(
                "max_angle_deg",
                format!("must not exceed 180 deg, got {}", self.max_angle_deg),
            ));
        }
        let k_max = (self.max_angle_deg * n_t as f64 / 360.0).floor() as usize;
        if k_max > n_t / 2 {
            return Err(ParameterError::new(
                "max_angle_deg",
                format!(
                    "{} deg spans {} columns, more than half of {}",
                    self.max_angle_deg, k_max, n_t
                ),
            ));
        }
        if self.radial_window >= n_r.max(1) {
            return Err(ParameterError::new(
                "radial_window",
                format!("must be below the radius resolution {}", n_r),
            ));
        }
        if !(self.upsample_resolution > 0.0 && self.upsample_resolution <= 1.0) {
            return Err(ParameterError::new(
                "upsample_resolution",
                format!("must be in (0, 1], got {}", self.upsample_resolution),
            ));
        }
        if !(-1.0..=1.0).contains(&self.min_coefficient) {
            return Err(ParameterError::new(
                "min_coefficient",
                format!("must be in [-1, 1], got {}", self.min_coefficient),
            ));
        }
        if !(0.0..=1.0).contains(&self.tie_tolerance) {
            return Err(ParameterError::new(
                "tie_tolerance",
                format!("must be in [0, 1], got {}", self.tie_tolerance),
            ));
        }
        if !(self.min_valid_fraction > 0.0 && self.min_valid_fraction <= 1.0) {
            return Err(ParameterError::new("min_valid_fraction", "must be in (0, 1]"));
        }
        if let Some(window) = &self.reference_window {
            if window.validate().is_err() || window.span_deg() <= 0.0 {
                return Err(ParameterError::new(
                    "reference_window",
                    format!(
                        "must be a finite non-empty range, got [{}, {}]",
                        window.start_deg, window.end_deg
                    ),
                ));
            }
        }
        if self.refine_halfwidth < MIN_INTERP_POINTS / 2 {
            return Err(ParameterError::new(
                "refine_halfwidth",
                format!("must be at least {}", MIN_INTERP_POINTS / 2),
            ));
        }
        Ok(k_max)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_angle_deg: Self::DEFAULT_MAX_ANGLE_DEG,
            radial_window: 0,
            upsample_resolution: Self::DEFAULT_UPSAMPLE_RESOLUTION,
            min_coefficient: Self::DEFAULT_MIN_COEFFICIENT,
            min_valid_fraction: Self::DEFAULT_MIN_VALID_FRACTION,
            refine_halfwidth: Self::DEFAULT_REFINE_HALFWIDTH,
            tie_tolerance: Self::DEFAULT_TIE_TOLERANCE,
            coarse_prealign: false,
            reference_window: None,
        }
    }
}

/// Sub-column refined correlation peak.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RefinedPeak {
    /// Refined angular offset in columns.
    pub offset_columns: f64,
    /// Refined angular offset in degrees (counter-clockwise positive).
    pub angle_deg: f64,
    /// Interpolated coefficient at the refined offset, in `[-1, 1]`.
    pub confidence: f64,
    pub coarse_offset: isize,
    pub coarse_coefficient: f64,
    /// Radial shift (rows) of the best cell at the coarse offset.
    pub radial_shift: isize,
    /// Valid pairs behind the coarse coefficient.
    pub pairs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prealign: Option<Lag1d>,
}

/// Why a correlation produced no estimate.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    ShapeMismatch { reference: [usize; 2], target: [usize; 2] },
    CorrelationBelowThreshold { best: f64, threshold: f64 },
    LackingInterpPoints { found: usize, needed: usize },
}

impl Rejection {
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::ShapeMismatch { .. } => FailureReason::ShapeMismatch,
            Self::CorrelationBelowThreshold { .. } => FailureReason::CorrelationBelowThreshold,
            Self::LackingInterpPoints { .. } => FailureReason::LackingInterpPoints,
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShapeMismatch { reference, target } => write!(
                f,
                "reference {}x{} and target {}x{} differ in shape",
                reference[0], reference[1], target[0], target[1]
            ),
            Self::CorrelationBelowThreshold { best, threshold } => {
                write!(f, "best coefficient {:.3} below threshold {:.3}", best, threshold)
            }
            Self::LackingInterpPoints { found, needed } => {
                write!(f, "{} usable points around the peak, need {}", found, needed)
            }
        }
    }
}

/// Result of one reference/target correlation.
#[derive(Debug, Clone, PartialEq)]
pub enum TorsionOutcome {
    Accepted(RefinedPeak),
    Rejected(Rejection),
}

impl TorsionOutcome {
    pub fn peak(&self) -> Option<&RefinedPeak> {
        match self {
            Self::Accepted(p) => Some(p),
            Self::Rejected(_) => None,
        }
    }
}

/// Correlate `target` against `reference` and resolve a refined peak.
///
/// Only invalid parameters are raised; every other failure is a
/// [`TorsionOutcome::Rejected`].
pub fn correlate(
    reference: &MaskedPolar,
    target: &MaskedPolar,
    config: &SearchConfig,
    prior_deg: Option<f64>,
) -> Result<TorsionOutcome, ParameterError> {
    let k_max = config.validate_for(reference.shape())?;
    if reference.shape() != target.shape() {
        return Ok(TorsionOutcome::Rejected(Rejection::ShapeMismatch {
            reference: reference.shape(),
            target: target.shape(),
        }));
    }
    let surface = xcorr2d::compute_surface(reference, target, config, k_max);
    Ok(resolve_peak(&surface, config, prior_deg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{AngularRange, EyelidBoundary};
    use crate::occlusion::{mask_occlusion, OcclusionConfig};
    use crate::test_utils::{smooth_polar, textured_polar, IrisTexture};
    use crate::unwrap::PolarImage;
    use approx::assert_abs_diff_eq;

    fn accepted(outcome: TorsionOutcome) -> RefinedPeak {
        match outcome {
            TorsionOutcome::Accepted(p) => p,
            TorsionOutcome::Rejected(r) => panic!("rejected: {}", r),
        }
    }

    #[test]
    fn self_correlation_peaks_at_zero() {
        let p = MaskedPolar::unmasked(textured_polar(16, 360, 1));
        let peak = accepted(correlate(&p, &p, &SearchConfig::default(), None).unwrap());
        assert_eq!(peak.coarse_offset, 0);
        assert_abs_diff_eq!(peak.angle_deg, 0.0, epsilon = 0.011);
        assert_abs_diff_eq!(peak.confidence, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn recovers_integer_shift() {
        let base = textured_polar(16, 360, 2);
        let reference = MaskedPolar::unmasked(base.clone());
        for shift in [-12isize, -3, 5, 17] {
            let target = MaskedPolar::unmasked(base.shifted(shift));
            let peak = accepted(correlate(&reference, &target, &SearchConfig::default(), None).unwrap());
            assert_eq!(peak.coarse_offset, shift);
            assert_abs_diff_eq!(peak.angle_deg, shift as f64, epsilon = 0.05);
        }
    }

    #[test]
    fn max_angle_is_capped_at_half_a_turn() {
        let cfg = |deg| SearchConfig {
            max_angle_deg: deg,
            ..Default::default()
        };
        assert_eq!(cfg(180.0).validate_for([16, 360]), Ok(180));
        let err = cfg(180.9).validate_for([16, 360]).unwrap_err();
        assert_eq!(err.param, "max_angle_deg");
    }

    #[test]
    fn reference_window_recovers_shift() {
        let base = textured_polar(16, 360, 2);
        let reference = MaskedPolar::unmasked(base.clone());
        let target = MaskedPolar::unmasked(base.shifted(5));
        let cfg = SearchConfig {
            reference_window: Some(AngularRange::new(100.0, 149.0)),
            ..Default::default()
        };
        let surface = correlation_surface(&reference, &target, &cfg).unwrap();
        let pairs = surface.angular_profile()[surface.k_max()].map(|(_, c)| c.pairs);
        assert_eq!(pairs, Some(50 * 16));

        let peak = accepted(correlate(&reference, &target, &cfg, None).unwrap());
        assert_eq!(peak.coarse_offset, 5);
        assert_abs_diff_eq!(peak.angle_deg, 5.0, epsilon = 0.05);
        assert_abs_diff_eq!(peak.confidence, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn recovers_sub_column_shift() {
        let tex = IrisTexture::new(4, 24);
        let render = |rot: f64| {
            PolarImage::from_fn(16, 360, |i, j| tex.value(i as f64 / 16.0, j as f64 - rot) as f32)
        };
        let reference = MaskedPolar::unmasked(render(0.0));
        let target = MaskedPolar::unmasked(render(2.5));
        let peak = accepted(correlate(&reference, &target, &SearchConfig::default(), None).unwrap());
        assert_abs_diff_eq!(peak.angle_deg, 2.5, epsilon = 0.1);
        assert!(peak.confidence > 0.9);
    }

    #[test]
    fn shift_beyond_window_is_boundary_limited() {
        let base = smooth_polar(8, 360, 3);
        let reference = MaskedPolar::unmasked(base.clone());
        let target = MaskedPolar::unmasked(base.shifted(30));
        let cfg = SearchConfig {
            max_angle_deg: 10.0,
            ..Default::default()
        };
        let peak = accepted(correlate(&reference, &target, &cfg, None).unwrap());
        assert_eq!(peak.coarse_offset, 10);
        assert!(peak.angle_deg <= 10.0 + 1e-9);
        assert!(peak.angle_deg >= 9.0);
    }

    #[test]
    fn occluded_columns_do_not_bias_the_estimate() {
        let base = textured_polar(16, 360, 6);
        let reference = MaskedPolar::unmasked(base.clone());
        let lids = EyelidBoundary::new(
            Some(AngularRange::new(60.0, 120.0)),
            Some(AngularRange::new(240.0, 300.0)),
        );
        // Blank out the lid regions entirely, then mask them.
        let mut shifted = base.shifted(7);
        for j in (60..=120).chain(240..=300) {
            shifted.set_column(j, &vec![Some(0.0); 16]);
        }
        let target = mask_occlusion(&shifted, &lids, &OcclusionConfig::default()).unwrap();
        let peak = accepted(correlate(&reference, &target, &SearchConfig::default(), None).unwrap());
        assert_eq!(peak.coarse_offset, 7);
        assert_abs_diff_eq!(peak.angle_deg, 7.0, epsilon = 0.05);
    }

    #[test]
    fn radial_shift_is_found_when_searched() {
        let base = textured_polar(16, 360, 8);
        let reference = MaskedPolar::unmasked(base.clone());
        let moved = PolarImage::from_fn(16, 360, |i, j| {
            if i < 2 {
                f32::NAN
            } else {
                base.get(i - 2, j).unwrap_or(f32::NAN)
            }
        });
        let target = MaskedPolar::unmasked(moved);
        let cfg = SearchConfig {
            radial_window: 3,
            ..Default::default()
        };
        let peak = accepted(correlate(&reference, &target, &cfg, None).unwrap());
        assert_eq!(peak.radial_shift, 2);
        assert_eq!(peak.coarse_offset, 0);
    }

    #[test]
    fn full_turn_shift_equals_no_shift() {
        let base = textured_polar(8, 180, 9);
        let reference = MaskedPolar::unmasked(base.clone());
        let a = correlate(&reference, &MaskedPolar::unmasked(base.shifted(4)), &SearchConfig::default(), None);
        let b = correlate(&reference, &MaskedPolar::unmasked(base.shifted(184)), &SearchConfig::default(), None);
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[test]
    fn shape_mismatch_is_rejected_without_coefficient() {
        let a = MaskedPolar::unmasked(textured_polar(16, 360, 1));
        let b = MaskedPolar::unmasked(textured_polar(16, 180, 1));
        let outcome = correlate(&a, &b, &SearchConfig::default(), None).unwrap();
        assert!(matches!(
            outcome,
            TorsionOutcome::Rejected(Rejection::ShapeMismatch { .. })
        ));
        assert!(outcome.peak().is_none());
        assert!(correlation_surface(&a, &b, &SearchConfig::default()).is_err());
    }

    #[test]
    fn invalid_search_parameters_are_raised() {
        let p = MaskedPolar::unmasked(textured_polar(16, 360, 1));
        let bad = [
            SearchConfig {
                max_angle_deg: 200.0,
                ..Default::default()
            },
            SearchConfig {
                upsample_resolution: 0.0,
                ..Default::default()
            },
            SearchConfig {
                radial_window: 16,
                ..Default::default()
            },
            SearchConfig {
                min_coefficient: 1.5,
                ..Default::default()
            },
            SearchConfig {
                max_angle_deg: 180.9,
                ..Default::default()
            },
            SearchConfig {
                reference_window: Some(AngularRange::new(f64::NAN, 10.0)),
                ..Default::default()
            },
            SearchConfig {
                reference_window: Some(AngularRange::new(50.0, 50.0)),
                ..Default::default()
            },
        ];
        for cfg in &bad {
            assert!(correlate(&p, &p, cfg, None).is_err(), "{:?}", cfg);
        }
    }

    #[test]
    fn prealign_reports_profile_lag() {
        let base = textured_polar(16, 360, 2);
        let reference = MaskedPolar::unmasked(base.clone());
        let target = MaskedPolar::unmasked(base.shifted(6));
        let cfg = SearchConfig {
            coarse_prealign: true,
            ..Default::default()
        };
        let peak = accepted(correlate(&reference, &target, &cfg, None).unwrap());
        assert_eq!(peak.prealign.map(|l| l.lag), Some(6));
        assert_eq!(peak.coarse_offset, 6);
    }

    #[test]
    fn radial_profiles_align_with_linear_lag() {
        let tex = IrisTexture::new(12, 6);
        let a: Vec<f64> = (0..40).map(|i| tex.value(i as f64 / 20.0, 0.0)).collect();
        let b: Vec<f64> = (0..30).map(|i| tex.value((i + 5) as f64 / 20.0, 0.0)).collect();
        // b[i] = a[i + 5], so a[i] pairs with b[i - 5].
        let best = correlate_1d(&a, &b, 10).unwrap();
        assert_eq!(best.lag, 5);
    }
}
