//! Streaming Pearson correlation over sample pairs.

/// Running sums for a Pearson coefficient.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PearsonAccumulator {
    n: usize,
    sx: f64,
    sy: f64,
    sxx: f64,
    syy: f64,
    sxy: f64,
}

impl PearsonAccumulator {
    #[inline]
    pub(crate) fn push(&mut self, x: f64, y: f64) {
        self.n += 1;
        self.sx += x;
        self.sy += y;
        self.sxx += x * x;
        self.syy += y * y;
        self.sxy += x * y;
    }

    /// Push a pair only when both values are finite.
    #[inline]
    pub(crate) fn push_finite(&mut self, x: f64, y: f64) {
        if x.is_finite() && y.is_finite() {
            self.push(x, y);
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.n
    }

    /// Coefficient in [-1, 1], or `None` with fewer than two pairs.
    ///
    /// A constant series has no defined correlation; it scores 0.
    pub(crate) fn coefficient(&self) -> Option<f64> {
        if self.n < 2 {
            return None;
        }
        let n = self.n as f64;
        let cov = self.sxy - self.sx * self.sy / n;
        let vx = self.sxx - self.sx * self.sx / n;
        let vy = self.syy - self.sy * self.sy / n;
        let denom = (vx * vy).sqrt();
        if !(denom > 1e-12 * n) {
            return Some(0.0);
        }
        Some((cov / denom).clamp(-1.0, 1.0))
    }
}
