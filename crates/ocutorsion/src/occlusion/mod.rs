//! Eyelid occlusion masking and azimuthal inpainting.
//!
//! Occluded columns are excluded from correlation by the mask, and their
//! intensities are replaced with texture borrowed from neighbouring
//! unoccluded columns so the band keeps realistic local statistics.

mod inpaint;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{CorrelationError, OcclusionError, ParameterError, TorsionError};
use crate::geometry::EyelidBoundary;
use crate::unwrap::PolarImage;

/// How occluded columns are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FillMode {
    /// Mirror the nearest unoccluded columns into the gap.
    #[default]
    Mirror,
    /// Uniform noise around the band's mean intensity (seeded).
    Noise { seed: u64 },
}

/// Configuration for occlusion masking.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OcclusionConfig {
    /// Minimum unoccluded fraction of the full circle.
    pub min_usable_fraction: f32,
    /// Maximum mean intensity step (in [0, 1] units) introduced where two
    /// mirrored halves of a gap meet.
    pub max_seam_step: f32,
    /// Fill strategy for occluded columns.
    pub fill: FillMode,
}

impl OcclusionConfig {
    pub const DEFAULT_MIN_USABLE_FRACTION: f32 = 0.2;
    pub const DEFAULT_MAX_SEAM_STEP: f32 = 0.05;

    pub fn validate(&self) -> Result<(), ParameterError> {
        if !(self.min_usable_fraction > 0.0 && self.min_usable_fraction <= 1.0) {
            return Err(ParameterError::new(
                "min_usable_fraction",
                format!("must be in (0, 1], got {}", self.min_usable_fraction),
            ));
        }
        if !(self.max_seam_step.is_finite() && self.max_seam_step > 0.0) {
            return Err(ParameterError::new("max_seam_step", "must be finite and positive"));
        }
        Ok(())
    }
}

impl Default for OcclusionConfig {
    fn default() -> Self {
        Self {
            min_usable_fraction: Self::DEFAULT_MIN_USABLE_FRACTION,
            max_seam_step: Self::DEFAULT_MAX_SEAM_STEP,
            fill: FillMode::Mirror,
        }
    }
}

/// Per-column validity over the angle axis of a [`PolarImage`].
#[derive(Debug, Clone, PartialEq)]
pub struct OcclusionMask {
    occluded: Vec<bool>,
    synthesized: Vec<bool>,
    max_seam_step: f32,
}

impl OcclusionMask {
    /// Mask with every column usable.
    pub fn clear(n_theta: usize) -> Self {
        Self {
            occluded: vec![false; n_theta],
            synthesized: vec![false; n_theta],
            max_seam_step: 0.0,
        }
    }

    /// Mark columns whose angle falls into an eyelid range, or that carry
    /// no valid sample at all.
    pub fn from_eyelids(polar: &PolarImage, eyelid: &EyelidBoundary) -> Result<Self, OcclusionError> {
        eyelid.validate()?;
        let occluded = (0..polar.n_theta())
            .map(|j| eyelid.is_occluded(polar.theta_of_col(j)) || !polar.column_has_valid(j))
            .collect();
        Ok(Self {
            occluded,
            synthesized: vec![false; polar.n_theta()],
            max_seam_step: 0.0,
        })
    }

    pub fn len(&self) -> usize {
        self.occluded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occluded.is_empty()
    }

    /// Whether column `j` (wrapping) is excluded from correlation.
    #[inline]
    pub fn is_occluded(&self, j: usize) -> bool {
        self.occluded[j % self.occluded.len()]
    }

    /// Whether column `j` holds inpainted rather than observed intensities.
    pub fn is_synthesized(&self, j: usize) -> bool {
        self.synthesized[j % self.synthesized.len()]
    }

    pub fn occluded_count(&self) -> usize {
        self.occluded.iter().filter(|o| **o).count()
    }

    /// Unoccluded fraction of the full circle.
    pub fn usable_fraction(&self) -> f32 {
        1.0 - self.occluded_count() as f32 / self.occluded.len().max(1) as f32
    }

    /// Largest seam step left by inpainting (mirror fill only).
    pub fn max_seam_step(&self) -> f32 {
        self.max_seam_step
    }

    /// Maximal circular runs of occluded columns as `(start, len)`.
    pub fn occluded_runs(&self) -> Vec<(usize, usize)> {
        let n = self.occluded.len();
        let Some(anchor) = self.occluded.iter().position(|o| !o) else {
            return if n > 0 { vec![(0, n)] } else { Vec::new() };
        };
        let mut runs = Vec::new();
        let mut k = 1;
        while k <= n {
            let j = (anchor + k) % n;
            if self.occluded[j] {
                let start = j;
                let mut len = 0;
                while self.occluded[(start + len) % n] {
                    len += 1;
                }
                runs.push((start, len));
                k += len;
            } else {
                k += 1;
            }
        }
        runs
    }
}

/// Polar image paired with its occlusion mask.
///
/// The mask always has one entry per image column.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedPolar {
    image: PolarImage,
    mask: OcclusionMask,
}

impl MaskedPolar {
    /// Pair an image with a mask of matching column count.
    pub fn new(image: PolarImage, mask: OcclusionMask) -> Result<Self, CorrelationError> {
        if mask.len() != image.n_theta() {
            return Err(CorrelationError::LengthMismatch {
                left: image.n_theta(),
                right: mask.len(),
            });
        }
        Ok(Self { image, mask })
    }

    pub fn image(&self) -> &PolarImage {
        &self.image
    }

    pub fn mask(&self) -> &OcclusionMask {
        &self.mask
    }

    /// Wrap an image with an all-clear mask.
    pub fn unmasked(image: PolarImage) -> Self {
        let mask = OcclusionMask::clear(image.n_theta());
        Self { image, mask }
    }

    pub fn shape(&self) -> [usize; 2] {
        self.image.shape()
    }

    /// Sample at (row, col) when both the sample and its column are usable.
    #[inline]
    pub fn usable(&self, i: usize, j: usize) -> Option<f32> {
        if self.mask.is_occluded(j) {
            None
        } else {
            self.image.get(i, j)
        }
    }

    /// Flattened row-major samples with NaN for unusable entries.
    pub(crate) fn usable_samples(&self) -> Vec<f32> {
        let [n_r, n_t] = self.shape();
        let mut out = Vec::with_capacity(n_r * n_t);
        for i in 0..n_r {
            for j in 0..n_t {
                out.push(self.usable(i, j).unwrap_or(f32::NAN));
            }
        }
        out
    }

    /// Angular profile restricted to usable samples.
    pub fn usable_angular_profile(&self) -> Vec<Option<f32>> {
        let [n_r, n_t] = self.shape();
        (0..n_t)
            .map(|j| {
                let vals: Vec<f32> = (0..n_r).filter_map(|i| self.usable(i, j)).collect();
                (!vals.is_empty()).then(|| vals.iter().sum::<f32>() / vals.len() as f32)
            })
            .collect()
    }
}

/// Mask eyelid occlusion in `polar` and inpaint the occluded columns.
///
/// Fails with `FullyOccluded` when the usable span is below
/// `config.min_usable_fraction`.
pub fn mask_occlusion(
    polar: &PolarImage,
    eyelid: &EyelidBoundary,
    config: &OcclusionConfig,
) -> Result<MaskedPolar, TorsionError> {
    config.validate()?;
    let mut mask = OcclusionMask::from_eyelids(polar, eyelid)?;

    let usable = mask.usable_fraction();
    if usable < config.min_usable_fraction {
        return Err(OcclusionError::FullyOccluded {
            usable_fraction: usable,
            min_fraction: config.min_usable_fraction,
        }
        .into());
    }

    let runs = mask.occluded_runs();
    if runs.is_empty() {
        return Ok(MaskedPolar {
            image: polar.clone(),
            mask,
        });
    }

    let mut image = polar.clone();
    match config.fill {
        FillMode::Mirror => {
            let usable_cols: Vec<usize> = (0..polar.n_theta()).filter(|&j| !mask.is_occluded(j)).collect();
            for &(start, len) in &runs {
                let step = inpaint::mirror_fill(
                    polar,
                    &mut image,
                    &usable_cols,
                    start,
                    len,
                    config.max_seam_step,
                );
                mask.max_seam_step = mask.max_seam_step.max(step);
            }
        }
        FillMode::Noise { seed } => {
            let mean = polar.mean().unwrap_or(0.5);
            let mut rng = StdRng::seed_from_u64(seed);
            let hi = (2.0 * mean).min(1.0);
            for &(start, len) in &runs {
                for t in 0..len {
                    let col: Vec<Option<f32>> = (0..polar.n_radius())
                        .map(|_| Some(rng.gen::<f32>() * hi))
                        .collect();
                    image.set_column(start + t, &col);
                }
            }
        }
    }

    for &(start, len) in &runs {
        for t in 0..len {
            let j = (start + t) % polar.n_theta();
            mask.synthesized[j] = true;
        }
    }

    tracing::debug!(
        "masked {} occluded columns in {} runs (usable {:.1}%, seam step {:.3})",
        mask.occluded_count(),
        runs.len(),
        usable * 100.0,
        mask.max_seam_step
    );
    Ok(MaskedPolar { image, mask })
}
