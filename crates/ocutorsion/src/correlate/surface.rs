//! Correlation coefficients over candidate (angular, radial) offsets.

use super::xcorr1d::Lag1d;

/// One candidate offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceCell {
    /// Pearson coefficient, absent when too few valid pairs were available.
    pub coefficient: Option<f64>,
    /// Valid pairs that entered the coefficient.
    pub pairs: usize,
}

/// Coefficients indexed by angular offset `k ∈ [-k_max, k_max]` (columns)
/// and radial shift `d ∈ [-d_max, d_max]` (rows).
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationSurface {
    n_theta: usize,
    k_max: usize,
    d_max: usize,
    /// Row-major: one row per radial shift, one column per angular offset.
    cells: Vec<SurfaceCell>,
    pub(crate) prealign: Option<Lag1d>,
}

impl CorrelationSurface {
    pub(crate) fn new(n_theta: usize, k_max: usize, d_max: usize, cells: Vec<SurfaceCell>) -> Self {
        debug_assert_eq!(cells.len(), (2 * k_max + 1) * (2 * d_max + 1));
        Self {
            n_theta,
            k_max,
            d_max,
            cells,
            prealign: None,
        }
    }

    /// Surface without radial search, built directly from coefficients.
    #[cfg(test)]
    pub(crate) fn from_coefficients(n_theta: usize, coefficients: &[Option<f64>]) -> Self {
        let k_max = coefficients.len() / 2;
        let cells = coefficients
            .iter()
            .map(|c| SurfaceCell {
                coefficient: *c,
                pairs: if c.is_some() { 100 } else { 0 },
            })
            .collect();
        Self::new(n_theta, k_max, 0, cells)
    }

    pub fn n_theta(&self) -> usize {
        self.n_theta
    }

    pub fn k_max(&self) -> usize {
        self.k_max
    }

    pub fn d_max(&self) -> usize {
        self.d_max
    }

    /// Angular pitch of one offset step, degrees.
    pub fn deg_per_col(&self) -> f64 {
        360.0 / self.n_theta as f64
    }

    /// Cell at angular offset `k` and radial shift `d`.
    pub fn cell(&self, k: isize, d: isize) -> Option<&SurfaceCell> {
        if k.unsigned_abs() > self.k_max || d.unsigned_abs() > self.d_max {
            return None;
        }
        let row = (d + self.d_max as isize) as usize;
        let col = (k + self.k_max as isize) as usize;
        self.cells.get(row * (2 * self.k_max + 1) + col)
    }

    /// Angular offsets covered, in ascending order.
    pub fn offsets(&self) -> impl Iterator<Item = isize> {
        let k = self.k_max as isize;
        -k..=k
    }

    /// Best radial shift per angular offset: `(d, cell)` with the highest
    /// coefficient, ties towards the smaller `|d|`.
    pub fn angular_profile(&self) -> Vec<Option<(isize, SurfaceCell)>> {
        let d = self.d_max as isize;
        self.offsets()
            .map(|k| {
                let mut best: Option<(isize, SurfaceCell)> = None;
                for dd in -d..=d {
                    let Some(cell) = self.cell(k, dd) else { continue };
                    let Some(c) = cell.coefficient else { continue };
                    let replace = match best {
                        None => true,
                        Some((bd, b)) => {
                            let bc = b.coefficient.unwrap_or(f64::NEG_INFINITY);
                            c > bc || (c == bc && dd.unsigned_abs() < bd.unsigned_abs())
                        }
                    };
                    if replace {
                        best = Some((dd, *cell));
                    }
                }
                best
            })
            .collect()
    }

    /// Coarse pre-alignment from angular profiles, when it was requested.
    pub fn prealign(&self) -> Option<&Lag1d> {
        self.prealign.as_ref()
    }
}
