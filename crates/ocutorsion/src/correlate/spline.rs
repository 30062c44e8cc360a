//! Natural cubic spline used for sub-column peak refinement.

use nalgebra::{DMatrix, DVector};

/// Interpolating cubic spline with zero curvature at both ends.
#[derive(Debug, Clone)]
pub struct NaturalCubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivatives at the knots.
    m: Vec<f64>,
}

impl NaturalCubicSpline {
    /// Fit through `(xs[i], ys[i])`; `xs` must be strictly increasing.
    ///
    /// Returns `None` for fewer than two knots, unordered knots, or a
    /// singular system.
    pub fn fit(xs: &[f64], ys: &[f64]) -> Option<Self> {
        let n = xs.len();
        if n < 2 || ys.len() != n || xs.windows(2).any(|w| !(w[1] > w[0])) {
            return None;
        }

        let mut a = DMatrix::<f64>::zeros(n, n);
        let mut rhs = DVector::<f64>::zeros(n);
        a[(0, 0)] = 1.0;
        a[(n - 1, n - 1)] = 1.0;
        for i in 1..n - 1 {
            let h0 = xs[i] - xs[i - 1];
            let h1 = xs[i + 1] - xs[i];
            a[(i, i - 1)] = h0;
            a[(i, i)] = 2.0 * (h0 + h1);
            a[(i, i + 1)] = h1;
            rhs[i] = 6.0 * ((ys[i + 1] - ys[i]) / h1 - (ys[i] - ys[i - 1]) / h0);
        }
        let m = a.lu().solve(&rhs)?;

        Some(Self {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
            m: m.iter().copied().collect(),
        })
    }

    /// Knot range `[first, last]`.
    pub fn domain(&self) -> [f64; 2] {
        [self.xs[0], self.xs[self.xs.len() - 1]]
    }

    /// Evaluate at `x`, clamped to the knot range.
    pub fn eval(&self, x: f64) -> f64 {
        let [lo, hi] = self.domain();
        let x = x.clamp(lo, hi);
        let k = match self.xs.partition_point(|&v| v <= x) {
            0 => 0,
            p => (p - 1).min(self.xs.len() - 2),
        };
        let (x0, x1) = (self.xs[k], self.xs[k + 1]);
        let (y0, y1) = (self.ys[k], self.ys[k + 1]);
        let (m0, m1) = (self.m[k], self.m[k + 1]);
        let h = x1 - x0;
        let a = x1 - x;
        let b = x - x0;
        m0 * a * a * a / (6.0 * h)
            + m1 * b * b * b / (6.0 * h)
            + (y0 / h - m0 * h / 6.0) * a
            + (y1 / h - m1 * h / 6.0) * b
    }

    /// Maximum over a uniform grid of spacing `step` across the domain.
    ///
    /// Returns `(x, value)`; ties keep the smallest `|x|`.
    pub fn grid_maximum(&self, step: f64) -> (f64, f64) {
        let [lo, hi] = self.domain();
        let steps = ((hi - lo) / step).floor() as usize;
        let mut best = (lo, self.eval(lo));
        for s in 1..=steps + 1 {
            let x = (lo + s as f64 * step).min(hi);
            let v = self.eval(x);
            if v > best.1 || (v == best.1 && x.abs() < best.0.abs()) {
                best = (x, v);
            }
        }
        best
    }
}
