//! Rectangular radius × angle image produced by the unwrap.

use image::{GrayImage, Luma};

/// Unwrapped iris band.
///
/// Row `i` is a radius bin, column `j` an angle bin. Columns are periodic:
/// column `n_theta` is column `0`. Every sample carries a validity flag;
/// invalid samples hold `0.0` and must never take part in statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct PolarImage {
    n_radius: usize,
    n_theta: usize,
    data: Vec<f32>,
    valid: Vec<bool>,
    inner_radius: f64,
    outer_radius: f64,
    theta_origin_deg: f64,
}

impl PolarImage {
    pub(crate) fn from_parts(
        n_radius: usize,
        n_theta: usize,
        data: Vec<f32>,
        valid: Vec<bool>,
        radii: [f64; 2],
        theta_origin_deg: f64,
    ) -> Self {
        debug_assert_eq!(data.len(), n_radius * n_theta);
        debug_assert_eq!(valid.len(), n_radius * n_theta);
        Self {
            n_radius,
            n_theta,
            data,
            valid,
            inner_radius: radii[0],
            outer_radius: radii[1],
            theta_origin_deg,
        }
    }

    /// Build a fully valid image from a sample function `f(row, col)`.
    ///
    /// Non-finite values are stored as invalid samples.
    pub fn from_fn(n_radius: usize, n_theta: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(n_radius * n_theta);
        let mut valid = Vec::with_capacity(n_radius * n_theta);
        for i in 0..n_radius {
            for j in 0..n_theta {
                let v = f(i, j);
                let ok = v.is_finite();
                data.push(if ok { v } else { 0.0 });
                valid.push(ok);
            }
        }
        Self::from_parts(n_radius, n_theta, data, valid, [0.0, n_radius as f64], 0.0)
    }

    /// `[n_radius, n_theta]`.
    pub fn shape(&self) -> [usize; 2] {
        [self.n_radius, self.n_theta]
    }

    pub fn n_radius(&self) -> usize {
        self.n_radius
    }

    pub fn n_theta(&self) -> usize {
        self.n_theta
    }

    pub fn inner_radius(&self) -> f64 {
        self.inner_radius
    }

    pub fn outer_radius(&self) -> f64 {
        self.outer_radius
    }

    /// Sampling radius of row `i`.
    pub fn radius_of_row(&self, i: usize) -> f64 {
        self.inner_radius + i as f64 * (self.outer_radius - self.inner_radius) / self.n_radius as f64
    }

    /// Angle (degrees) of column `j`.
    pub fn theta_of_col(&self, j: usize) -> f64 {
        self.theta_origin_deg + j as f64 * self.deg_per_col()
    }

    /// Angular pitch of one column, degrees.
    pub fn deg_per_col(&self) -> f64 {
        360.0 / self.n_theta as f64
    }

    #[inline]
    fn idx(&self, i: usize, j: usize) -> usize {
        i * self.n_theta + j % self.n_theta
    }

    /// Sample at (row, col) or `None` when invalid. Columns wrap.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> Option<f32> {
        let k = self.idx(i, j);
        self.valid[k].then_some(self.data[k])
    }

    #[inline]
    pub fn is_valid(&self, i: usize, j: usize) -> bool {
        self.valid[self.idx(i, j)]
    }

    pub fn column_has_valid(&self, j: usize) -> bool {
        (0..self.n_radius).any(|i| self.is_valid(i, j))
    }

    /// Fraction of valid samples.
    pub fn valid_fraction(&self) -> f32 {
        let n = self.valid.iter().filter(|v| **v).count();
        n as f32 / self.valid.len().max(1) as f32
    }

    pub(crate) fn column(&self, j: usize) -> Vec<Option<f32>> {
        (0..self.n_radius).map(|i| self.get(i, j)).collect()
    }

    pub(crate) fn set_column(&mut self, j: usize, values: &[Option<f32>]) {
        for (i, v) in values.iter().enumerate() {
            let k = self.idx(i, j);
            self.data[k] = v.unwrap_or(0.0);
            self.valid[k] = v.is_some();
        }
    }

    /// Mean of valid samples.
    pub fn mean(&self) -> Option<f32> {
        let (sum, n) = self
            .data
            .iter()
            .zip(&self.valid)
            .filter(|(_, v)| **v)
            .fold((0.0f64, 0usize), |(s, n), (d, _)| (s + *d as f64, n + 1));
        (n > 0).then(|| (sum / n as f64) as f32)
    }

    /// Per-column mean of valid samples (intensity as a function of angle).
    pub fn angular_profile(&self) -> Vec<Option<f32>> {
        (0..self.n_theta)
            .map(|j| mean_of((0..self.n_radius).filter_map(|i| self.get(i, j))))
            .collect()
    }

    /// Per-row mean of valid samples (intensity as a function of radius).
    pub fn radial_profile(&self) -> Vec<Option<f32>> {
        (0..self.n_radius)
            .map(|i| mean_of((0..self.n_theta).filter_map(|j| self.get(i, j))))
            .collect()
    }

    /// Circularly shift content by `k` columns: `out[j] = self[j - k]`.
    ///
    /// Positive `k` rotates the pattern towards larger angles.
    pub fn shifted(&self, k: isize) -> Self {
        let n = self.n_theta as isize;
        let mut data = vec![0.0f32; self.data.len()];
        let mut valid = vec![false; self.valid.len()];
        for i in 0..self.n_radius {
            for j in 0..self.n_theta {
                let src = (j as isize - k).rem_euclid(n) as usize;
                let s = self.idx(i, src);
                let d = self.idx(i, j);
                data[d] = self.data[s];
                valid[d] = self.valid[s];
            }
        }
        Self {
            data,
            valid,
            ..self.clone()
        }
    }

    /// 8-bit rendering for inspection; invalid samples are black.
    pub fn to_gray_image(&self) -> GrayImage {
        let mut out = GrayImage::new(self.n_theta as u32, self.n_radius as u32);
        for i in 0..self.n_radius {
            for j in 0..self.n_theta {
                let v = self.get(i, j).unwrap_or(0.0).clamp(0.0, 1.0);
                out.put_pixel(j as u32, i as u32, Luma([(v * 255.0).round() as u8]));
            }
        }
        out
    }
}

fn mean_of(values: impl Iterator<Item = f32>) -> Option<f32> {
    let (sum, n) = values.fold((0.0f64, 0usize), |(s, n), v| (s + v as f64, n + 1));
    (n > 0).then(|| (sum / n as f64) as f32)
}
