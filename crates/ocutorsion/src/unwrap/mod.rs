//! Polar unwrap of the iris annulus.
//!
//! Resamples the ring between the pupil boundary and the iris boundary into
//! a [`PolarImage`]: row `i` sits at radius
//! `inner + i·(outer − inner)/radius_resolution`, column `j` at angle
//! `origin + j·360/theta_resolution`.

mod polar;
mod sampling;

use std::borrow::Cow;

use image::GrayImage;

use crate::error::{GeometryError, ParameterError, TorsionError};
use crate::geometry::PupilEstimate;

pub use polar::PolarImage;
pub use sampling::{BorderMode, FrameSampler, Interpolation};

/// Configuration for the polar unwrap.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct UnwrapConfig {
    /// Number of angle bins over the full circle.
    pub theta_resolution: usize,
    /// Number of radius bins between the inner and outer radius.
    pub radius_resolution: usize,
    /// Gap (pixels) between the pupil boundary and the first sampled radius.
    pub inner_radius_buffer: f64,
    /// Radial thickness (pixels) of the band when the pupil estimate carries
    /// no iris radius.
    pub iris_thickness: f64,
    /// Angle (degrees) of column 0.
    pub theta_origin_deg: f64,
    /// Resampling kernel.
    pub interpolation: Interpolation,
    /// Out-of-frame handling. Anything but `Invalid` is an explicit
    /// extension mode.
    pub border: BorderMode,
    /// Scale sampling radii by the pupil ellipse's radial function.
    pub follow_ellipse: bool,
    /// Gaussian sigma applied to the frame before resampling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presmooth_sigma: Option<f32>,
}

impl UnwrapConfig {
    pub const DEFAULT_THETA_RESOLUTION: usize = 720;
    pub const DEFAULT_RADIUS_RESOLUTION: usize = 24;
    pub const DEFAULT_INNER_RADIUS_BUFFER: f64 = 5.0;
    pub const DEFAULT_IRIS_THICKNESS: f64 = 30.0;

    pub fn validate(&self) -> Result<(), ParameterError> {
        if self.theta_resolution < 8 {
            return Err(ParameterError::new(
                "theta_resolution",
                format!("must be at least 8, got {}", self.theta_resolution),
            ));
        }
        if self.radius_resolution == 0 {
            return Err(ParameterError::new("radius_resolution", "must be positive"));
        }
        if !self.inner_radius_buffer.is_finite() || self.inner_radius_buffer < 0.0 {
            return Err(ParameterError::new(
                "inner_radius_buffer",
                "must be finite and non-negative",
            ));
        }
        if !self.iris_thickness.is_finite() || self.iris_thickness <= 0.0 {
            return Err(ParameterError::new("iris_thickness", "must be finite and positive"));
        }
        if !self.theta_origin_deg.is_finite() {
            return Err(ParameterError::new("theta_origin_deg", "must be finite"));
        }
        if let BorderMode::Constant(v) = self.border {
            if !(0.0..=1.0).contains(&v) {
                return Err(ParameterError::new(
                    "border",
                    format!("constant fill must be in [0, 1], got {}", v),
                ));
            }
        }
        if let Some(s) = self.presmooth_sigma {
            if !s.is_finite() || s <= 0.0 {
                return Err(ParameterError::new("presmooth_sigma", "must be positive"));
            }
        }
        Ok(())
    }

    /// `[inner, outer]` sampling radii for a pupil estimate.
    pub fn radii_for(&self, pupil: &PupilEstimate) -> [f64; 2] {
        let inner = pupil.mean_radius() + self.inner_radius_buffer;
        let outer = pupil.iris_radius.unwrap_or(inner + self.iris_thickness);
        [inner, outer]
    }
}

impl Default for UnwrapConfig {
    fn default() -> Self {
        Self {
            theta_resolution: Self::DEFAULT_THETA_RESOLUTION,
            radius_resolution: Self::DEFAULT_RADIUS_RESOLUTION,
            inner_radius_buffer: Self::DEFAULT_INNER_RADIUS_BUFFER,
            iris_thickness: Self::DEFAULT_IRIS_THICKNESS,
            theta_origin_deg: 0.0,
            interpolation: Interpolation::Bilinear,
            border: BorderMode::Invalid,
            follow_ellipse: false,
            presmooth_sigma: None,
        }
    }
}

/// Check that the annulus is non-degenerate and touches the frame.
fn check_annulus(frame: &GrayImage, pupil: &PupilEstimate, radii: [f64; 2]) -> Result<(), GeometryError> {
    pupil.validate()?;
    let [inner, outer] = radii;
    if !inner.is_finite() || !outer.is_finite() || outer <= inner {
        return Err(GeometryError::DegenerateAnnulus { inner, outer });
    }
    let (w, h) = frame.dimensions();
    let [cx, cy] = pupil.center;
    // Distance from the center to the nearest pixel of the frame rectangle.
    let disjoint = w == 0 || h == 0 || {
        let nx = cx.clamp(0.0, w as f64 - 1.0);
        let ny = cy.clamp(0.0, h as f64 - 1.0);
        (cx - nx).hypot(cy - ny) > outer
    };
    if disjoint {
        return Err(GeometryError::OutsideFrame {
            center: pupil.center,
            outer,
            width: w,
            height: h,
        });
    }
    Ok(())
}

/// Unwrap the iris annulus of `frame` around `pupil` into a polar image.
///
/// Samples outside the frame are marked invalid unless `config.border` is
/// an extension mode.
pub fn unwrap_iris(
    frame: &GrayImage,
    pupil: &PupilEstimate,
    config: &UnwrapConfig,
) -> Result<PolarImage, TorsionError> {
    config.validate()?;
    let radii = config.radii_for(pupil);
    check_annulus(frame, pupil, radii)?;

    let source: Cow<'_, GrayImage> = match config.presmooth_sigma {
        Some(sigma) => Cow::Owned(imageproc::filter::gaussian_blur_f32(frame, sigma)),
        None => Cow::Borrowed(frame),
    };
    let sampler = FrameSampler::new(&source, config.interpolation, config.border);
    if config.border.is_extension() {
        tracing::trace!("out-of-frame samples use {:?}", config.border);
    }

    let n_r = config.radius_resolution;
    let n_t = config.theta_resolution;
    let [inner, outer] = radii;
    let r_step = (outer - inner) / n_r as f64;
    let deg_step = 360.0 / n_t as f64;
    let mean_radius = pupil.mean_radius();

    // Per-column direction and radial scale.
    let columns: Vec<(f64, f64, f64)> = (0..n_t)
        .map(|j| {
            let theta = config.theta_origin_deg + j as f64 * deg_step;
            let scale = if config.follow_ellipse && pupil.ellipse.is_some() {
                pupil.boundary_radius_at(theta) / mean_radius
            } else {
                1.0
            };
            let t = theta.to_radians();
            (t.cos(), t.sin(), scale)
        })
        .collect();

    let mut data = Vec::with_capacity(n_r * n_t);
    let mut valid = Vec::with_capacity(n_r * n_t);
    let [cx, cy] = pupil.center;
    for i in 0..n_r {
        let r = inner + i as f64 * r_step;
        for &(c, s, scale) in &columns {
            let rr = r * scale;
            match sampler.sample(cx + rr * c, cy - rr * s) {
                Some(v) => {
                    data.push(v);
                    valid.push(true);
                }
                None => {
                    data.push(0.0);
                    valid.push(false);
                }
            }
        }
    }

    let polar = PolarImage::from_parts(n_r, n_t, data, valid, radii, config.theta_origin_deg);
    tracing::trace!(
        "unwrapped {}x{} band r=[{:.1}, {:.1}] valid={:.3}",
        n_r,
        n_t,
        inner,
        outer,
        polar.valid_fraction()
    );
    Ok(polar)
}
