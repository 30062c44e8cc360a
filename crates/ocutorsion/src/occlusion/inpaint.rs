//! Mirrored azimuthal replication for occluded column runs.
//!
//! The half of a run nearer its left edge reflects the unoccluded columns
//! to its left, the other half reflects those to its right, so both run
//! boundaries are continuous. Only the internal seam can jump; it is
//! cross-faded until the introduced step is within tolerance.

use crate::unwrap::PolarImage;

type Column = Vec<Option<f32>>;

/// Mean absolute difference over rows where both columns are valid.
fn mean_abs_diff(a: &[Option<f32>], b: &[Option<f32>]) -> f32 {
    let (sum, n) = a
        .iter()
        .zip(b)
        .filter_map(|(x, y)| Some((x.as_ref()? - y.as_ref()?).abs()))
        .fold((0.0f32, 0usize), |(s, n), d| (s + d, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f32
    }
}

fn blend(a: &[Option<f32>], b: &[Option<f32>], w: f32) -> Column {
    a.iter()
        .zip(b)
        .map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) => Some((1.0 - w) * x + w * y),
            (Some(x), None) => Some(*x),
            (None, Some(y)) => Some(*y),
            (None, None) => None,
        })
        .collect()
}

/// Fill the occluded run `[start, start + len)` of `dst` from `src`.
///
/// `usable_cols` lists the unoccluded columns in ascending order. Returns
/// the step left at the seam between the two mirrored halves.
pub(super) fn mirror_fill(
    src: &PolarImage,
    dst: &mut PolarImage,
    usable_cols: &[usize],
    start: usize,
    len: usize,
    max_step: f32,
) -> f32 {
    let n = src.n_theta();
    let u = usable_cols.len();
    if u == 0 || len == 0 {
        return 0.0;
    }
    let left_edge = (start + n - 1) % n;
    let right_edge = (start + len) % n;
    let p_left = usable_cols
        .binary_search(&left_edge)
        .unwrap_or_else(|p| p.min(u - 1));
    let p_right = usable_cols
        .binary_search(&right_edge)
        .unwrap_or_else(|p| p % u);

    // Column offsets are relative to `start`; `t == len` is the right edge.
    let left = |t: usize| -> Column {
        let k = (p_left as isize - t as isize).rem_euclid(u as isize) as usize;
        src.column(usable_cols[k])
    };
    let right = |t: usize| -> Column {
        if t >= len {
            src.column(right_edge)
        } else {
            src.column(usable_cols[(p_right + (len - 1 - t)) % u])
        }
    };

    let half = (len + 1) / 2;
    for t in 0..len {
        let col = if t < half { left(t) } else { right(t) };
        dst.set_column(start + t, &col);
    }

    let raw_step = mean_abs_diff(&left(half - 1), &right(half));
    if raw_step <= max_step {
        return raw_step;
    }

    // Widen a cross-fade window centred on the seam until each blended
    // column moves by at most `max_step`.
    let mut width = ((raw_step / max_step).ceil() as usize).clamp(1, len);
    let (t0, residual) = loop {
        let t0 = half.saturating_sub(width / 2).min(len - width);
        let d_max = (t0..t0 + width)
            .map(|t| mean_abs_diff(&left(t), &right(t)))
            .fold(raw_step, f32::max);
        let residual = d_max / (width + 1) as f32;
        if residual <= max_step || width == len {
            break (t0, residual);
        }
        width = (width + 1).max((d_max / max_step).ceil() as usize).min(len);
    };

    for t in t0..t0 + width {
        let w = (t - t0 + 1) as f32 / (width + 1) as f32;
        dst.set_column(start + t, &blend(&left(t), &right(t), w));
    }

    if residual > max_step {
        tracing::warn!(
            "seam step {:.3} exceeds tolerance {:.3} for {}-column gap at {}",
            residual,
            max_step,
            len,
            start
        );
    }
    residual
}
