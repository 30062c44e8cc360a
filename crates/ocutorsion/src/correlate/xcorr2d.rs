//! 2-D angular/radial correlation of masked polar images and peak
//! resolution.

use super::pearson::PearsonAccumulator;
use super::spline::NaturalCubicSpline;
use super::surface::{CorrelationSurface, SurfaceCell};
use super::xcorr1d::circular_correlate_1d;
use super::{RefinedPeak, Rejection, SearchConfig, TorsionOutcome};
use crate::error::{CorrelationError, TorsionError};
use crate::occlusion::MaskedPolar;

/// Knots required for spline refinement.
pub const MIN_INTERP_POINTS: usize = 4;

/// Compute the correlation surface of `target` against `reference`.
///
/// Reference sample `(i, j)` pairs with target sample `(i + d, j + k)`
/// (columns wrap), so a positive offset means the target is rotated
/// counter-clockwise. Only pairs where both samples are usable count.
pub fn correlation_surface(
    reference: &MaskedPolar,
    target: &MaskedPolar,
    config: &SearchConfig,
) -> Result<CorrelationSurface, TorsionError> {
    let k_max = config.validate_for(reference.shape())?;
    if reference.shape() != target.shape() {
        return Err(CorrelationError::ShapeMismatch {
            left: reference.shape(),
            right: target.shape(),
        }
        .into());
    }
    Ok(compute_surface(reference, target, config, k_max))
}

pub(super) fn compute_surface(
    reference: &MaskedPolar,
    target: &MaskedPolar,
    config: &SearchConfig,
    k_max: usize,
) -> CorrelationSurface {
    let [n_r, n_t] = reference.shape();
    let d_max = config.radial_window;
    let mut ref_s = reference.usable_samples();
    let tgt_s = target.usable_samples();
    if let Some(window) = &config.reference_window {
        let image = reference.image();
        let outside: Vec<usize> = (0..n_t)
            .filter(|&j| !window.contains(image.theta_of_col(j)))
            .collect();
        for row in ref_s.chunks_mut(n_t.max(1)) {
            for &j in &outside {
                row[j] = f32::NAN;
            }
        }
        tracing::trace!(
            "reference window [{}, {}] keeps {} of {} columns",
            window.start_deg,
            window.end_deg,
            n_t - outside.len(),
            n_t
        );
    }

    let ref_usable = ref_s.iter().filter(|v| !v.is_nan()).count();
    let required = ((config.min_valid_fraction as f64 * ref_usable as f64).ceil() as usize).max(2);

    let (k, d) = (k_max as isize, d_max as isize);
    let mut cells = Vec::with_capacity((2 * k_max + 1) * (2 * d_max + 1));
    for dd in -d..=d {
        for kk in -k..=k {
            let mut acc = PearsonAccumulator::default();
            for i in 0..n_r as isize {
                let ti = i + dd;
                if ti < 0 || ti >= n_r as isize {
                    continue;
                }
                let r_row = &ref_s[i as usize * n_t..(i as usize + 1) * n_t];
                let t_row = &tgt_s[ti as usize * n_t..(ti as usize + 1) * n_t];
                for (j, &x) in r_row.iter().enumerate() {
                    let tj = (j as isize + kk).rem_euclid(n_t as isize) as usize;
                    acc.push_finite(x as f64, t_row[tj] as f64);
                }
            }
            let pairs = acc.count();
            let coefficient = if pairs >= required { acc.coefficient() } else { None };
            cells.push(SurfaceCell { coefficient, pairs });
        }
    }

    let mut surface = CorrelationSurface::new(n_t, k_max, d_max, cells);
    if config.coarse_prealign {
        let to_f64 = |p: Vec<Option<f32>>| -> Vec<f64> {
            p.into_iter().map(|v| v.map_or(f64::NAN, f64::from)).collect()
        };
        let a = to_f64(target.usable_angular_profile());
        let b = to_f64(reference.usable_angular_profile());
        match circular_correlate_1d(&a, &b, k_max) {
            Ok(lag) => {
                tracing::debug!(
                    "coarse pre-alignment: {} columns (r={:.3})",
                    lag.lag,
                    lag.coefficient
                );
                surface.prealign = Some(lag);
            }
            Err(e) => tracing::debug!("coarse pre-alignment unavailable: {}", e),
        }
    }
    surface
}

/// Local maxima of the angular profile; the first and last defined
/// offsets count as maxima when they dominate their only neighbour.
fn local_maxima(profile: &[Option<f64>]) -> Vec<usize> {
    let n = profile.len();
    (0..n)
        .filter(|&i| {
            let Some(c) = profile[i] else { return false };
            let left = i.checked_sub(1).and_then(|l| profile[l]);
            let right = profile.get(i + 1).copied().flatten();
            left.map_or(true, |l| c >= l) && right.map_or(true, |r| c >= r)
        })
        .collect()
}

/// Pick the coarse peak and refine it with a cubic spline.
///
/// `prior_deg` is the previous accepted angle; among local maxima within
/// `tie_tolerance` of the surface maximum the one nearest to it wins.
pub fn resolve_peak(
    surface: &CorrelationSurface,
    config: &SearchConfig,
    prior_deg: Option<f64>,
) -> TorsionOutcome {
    let profile = surface.angular_profile();
    let coefs: Vec<Option<f64>> = profile
        .iter()
        .map(|p| p.and_then(|(_, cell)| cell.coefficient))
        .collect();
    let k_max = surface.k_max() as isize;
    let offset_of = |idx: usize| idx as isize - k_max;
    let deg = surface.deg_per_col();

    let Some(best) = coefs.iter().flatten().copied().reduce(f64::max) else {
        return TorsionOutcome::Rejected(Rejection::LackingInterpPoints {
            found: 0,
            needed: MIN_INTERP_POINTS,
        });
    };
    if best < config.min_coefficient {
        return TorsionOutcome::Rejected(Rejection::CorrelationBelowThreshold {
            best,
            threshold: config.min_coefficient,
        });
    }

    let candidates: Vec<usize> = local_maxima(&coefs)
        .into_iter()
        .filter(|&i| {
            coefs[i].is_some_and(|c| c >= best - config.tie_tolerance && c >= config.min_coefficient)
        })
        .collect();
    let strict = || {
        candidates
            .iter()
            .copied()
            .filter(|&i| coefs[i] == Some(best))
            .min_by_key(|&i| offset_of(i).unsigned_abs())
    };
    let chosen = match prior_deg {
        Some(prior) => candidates.iter().copied().min_by(|&a, &b| {
            let da = (offset_of(a) as f64 * deg - prior).abs();
            let db = (offset_of(b) as f64 * deg - prior).abs();
            da.total_cmp(&db)
                .then_with(|| coefs[b].partial_cmp(&coefs[a]).unwrap_or(std::cmp::Ordering::Equal))
        }),
        None => strict(),
    };
    let Some(peak) = chosen else {
        return TorsionOutcome::Rejected(Rejection::LackingInterpPoints {
            found: 0,
            needed: MIN_INTERP_POINTS,
        });
    };
    if candidates.len() > 1 {
        tracing::trace!(
            "{} candidate peaks within {:.3}; chose offset {}",
            candidates.len(),
            config.tie_tolerance,
            offset_of(peak)
        );
    }

    // Contiguous above-threshold run around the peak, within the halfwidth.
    let above = |i: usize| coefs[i].is_some_and(|c| c >= config.min_coefficient);
    let hw = config.refine_halfwidth;
    let mut lo = peak;
    while lo > 0 && peak - (lo - 1) <= hw && above(lo - 1) {
        lo -= 1;
    }
    let mut hi = peak;
    while hi + 1 < coefs.len() && (hi + 1) - peak <= hw && above(hi + 1) {
        hi += 1;
    }
    let found = hi - lo + 1;
    if found < MIN_INTERP_POINTS {
        return TorsionOutcome::Rejected(Rejection::LackingInterpPoints {
            found,
            needed: MIN_INTERP_POINTS,
        });
    }

    let xs: Vec<f64> = (lo..=hi).map(|i| offset_of(i) as f64).collect();
    let ys: Vec<f64> = (lo..=hi).map(|i| coefs[i].unwrap_or(0.0)).collect();
    let Some(spline) = NaturalCubicSpline::fit(&xs, &ys) else {
        return TorsionOutcome::Rejected(Rejection::LackingInterpPoints {
            found,
            needed: MIN_INTERP_POINTS,
        });
    };
    let (offset, value) = spline.grid_maximum(config.upsample_resolution);

    let (radial_shift, cell) = profile[peak].map_or((0, None), |(d, c)| (d, Some(c)));
    TorsionOutcome::Accepted(RefinedPeak {
        offset_columns: offset,
        angle_deg: offset * deg,
        confidence: value.clamp(-1.0, 1.0),
        coarse_offset: offset_of(peak),
        coarse_coefficient: coefs[peak].unwrap_or(best),
        radial_shift,
        pairs: cell.map_or(0, |c| c.pairs),
        prealign: surface.prealign().copied(),
    })
}
