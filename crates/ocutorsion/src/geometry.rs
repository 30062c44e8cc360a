//! Pupil and eyelid inputs supplied by upstream detectors.
//!
//! Angles follow the eye-tracking convention used throughout the crate:
//! degrees, zero along image +x, increasing counter-clockwise as seen on
//! screen (image y points down, so "up" is +90°). A point at radius `r`
//! and angle `θ` about center `(cx, cy)` sits at
//! `(cx + r cos θ, cy − r sin θ)` in pixel coordinates.

use nalgebra::{Rotation2, Vector2};

use crate::error::{GeometryError, OcclusionError};

/// Wrap an angle in degrees into `[0, 360)`.
#[inline]
pub fn wrap_deg(theta: f64) -> f64 {
    let w = theta.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs.
    if w >= 360.0 {
        0.0
    } else {
        w
    }
}

/// Signed angular difference `a - b` wrapped into `(-180, 180]`.
#[inline]
pub fn angle_diff_deg(a: f64, b: f64) -> f64 {
    let d = wrap_deg(a - b);
    if d > 180.0 {
        d - 360.0
    } else {
        d
    }
}

/// Pupil ellipse reported by an ellipse-fitting detector.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PupilEllipse {
    /// Semi-axes [a, b] in pixels.
    pub semi_axes: [f64; 2],
    /// Rotation of semi-axis `a` from image +x, radians, in pixel coordinates.
    pub angle: f64,
}

/// Pupil location for one frame.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PupilEstimate {
    /// Center (x, y) in pixels.
    pub center: [f64; 2],
    /// Pupil radius in pixels. Must be strictly positive.
    pub radius: f64,
    /// Optional fitted ellipse; used when the unwrap follows the pupil shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ellipse: Option<PupilEllipse>,
    /// Optional iris/sclera boundary radius in pixels.
    ///
    /// When absent the outer unwrap radius is derived from the configured
    /// iris thickness.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iris_radius: Option<f64>,
}

impl PupilEstimate {
    /// Circular pupil without ellipse or iris boundary.
    pub fn circle(cx: f64, cy: f64, radius: f64) -> Self {
        Self {
            center: [cx, cy],
            radius,
            ellipse: None,
            iris_radius: None,
        }
    }

    pub fn with_iris_radius(mut self, iris_radius: f64) -> Self {
        self.iris_radius = Some(iris_radius);
        self
    }

    pub fn with_ellipse(mut self, ellipse: PupilEllipse) -> Self {
        self.ellipse = Some(ellipse);
        self
    }

    /// Check the `radius > 0` and finite-center invariants.
    pub fn validate(&self) -> Result<(), GeometryError> {
        let ok = self.center[0].is_finite()
            && self.center[1].is_finite()
            && self.radius.is_finite()
            && self.radius > 0.0
            && self.ellipse.map_or(true, |e| {
                e.angle.is_finite()
                    && e.semi_axes.iter().all(|a| a.is_finite() && *a > 0.0)
            });
        if ok {
            Ok(())
        } else {
            Err(GeometryError::InvalidPupil {
                center: self.center,
                radius: self.radius,
            })
        }
    }

    /// Polar coordinates `(r, θ°)` of a pixel position about the pupil center.
    ///
    /// `θ` is in `[0, 360)`.
    pub fn polar_of(&self, xy: [f64; 2]) -> (f64, f64) {
        let dx = xy[0] - self.center[0];
        let dy = -(xy[1] - self.center[1]);
        let r = (dx * dx + dy * dy).sqrt();
        (r, wrap_deg(dy.atan2(dx).to_degrees()))
    }

    /// Pixel position of polar coordinates `(r, θ°)` about the pupil center.
    pub fn cartesian_of(&self, r: f64, theta_deg: f64) -> [f64; 2] {
        let t = theta_deg.to_radians();
        [self.center[0] + r * t.cos(), self.center[1] - r * t.sin()]
    }

    /// Pupil boundary radius along direction `θ°`.
    ///
    /// Equals `radius` for a circular pupil; follows the ellipse otherwise.
    pub fn boundary_radius_at(&self, theta_deg: f64) -> f64 {
        let Some(e) = self.ellipse else {
            return self.radius;
        };
        let t = theta_deg.to_radians();
        // Direction in pixel coordinates, rotated into the ellipse frame.
        let dir = Rotation2::new(-e.angle) * Vector2::new(t.cos(), -t.sin());
        let (a, b) = (e.semi_axes[0], e.semi_axes[1]);
        let q = (dir.x / a).powi(2) + (dir.y / b).powi(2);
        if q > 0.0 {
            1.0 / q.sqrt()
        } else {
            self.radius
        }
    }

    /// Mean ellipse radius, or `radius` for circles.
    pub fn mean_radius(&self) -> f64 {
        self.ellipse
            .map_or(self.radius, |e| 0.5 * (e.semi_axes[0] + e.semi_axes[1]))
    }
}

/// Counter-clockwise angular interval `[start_deg, end_deg]`.
///
/// Wraps through 0°/360° when `end_deg < start_deg` after normalization.
/// A span of 360° or more covers the full circle.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AngularRange {
    pub start_deg: f64,
    pub end_deg: f64,
}

impl AngularRange {
    pub fn new(start_deg: f64, end_deg: f64) -> Self {
        Self { start_deg, end_deg }
    }

    /// Range of half-width `half_width_deg` centred on `center_deg`.
    pub fn centered(center_deg: f64, half_width_deg: f64) -> Self {
        Self {
            start_deg: center_deg - half_width_deg,
            end_deg: center_deg + half_width_deg,
        }
    }

    pub fn validate(&self) -> Result<(), OcclusionError> {
        if self.start_deg.is_finite() && self.end_deg.is_finite() {
            Ok(())
        } else {
            Err(OcclusionError::InvalidRange {
                start_deg: self.start_deg,
                end_deg: self.end_deg,
            })
        }
    }

    /// Angular extent in degrees, in `[0, 360]`.
    pub fn span_deg(&self) -> f64 {
        let raw = self.end_deg - self.start_deg;
        if raw >= 360.0 {
            360.0
        } else if raw <= -360.0 {
            0.0
        } else {
            wrap_deg(raw)
        }
    }

    pub fn contains(&self, theta_deg: f64) -> bool {
        let span = self.span_deg();
        if span >= 360.0 {
            return true;
        }
        wrap_deg(theta_deg - self.start_deg) <= span
    }
}

/// Angular eyelid occlusion for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct EyelidBoundary {
    /// Range covered by the upper lid (typically around 90°).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<AngularRange>,
    /// Range covered by the lower lid (typically around 270°).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<AngularRange>,
}

impl EyelidBoundary {
    /// No occlusion.
    pub fn open() -> Self {
        Self::default()
    }

    pub fn new(upper: Option<AngularRange>, lower: Option<AngularRange>) -> Self {
        Self { upper, lower }
    }

    /// Derive occlusion ranges from two points on the usable-iris boundary.
    ///
    /// Each point's angle is mirrored across the vertical axis: the upper
    /// range is centred on 90° and reaches the upper point, the lower range
    /// is centred on 270° and reaches the lower point.
    pub fn from_iris_limits(upper_xy: [f64; 2], lower_xy: [f64; 2], pupil: &PupilEstimate) -> Self {
        let (_, theta_up) = pupil.polar_of(upper_xy);
        let (_, theta_lo) = pupil.polar_of(lower_xy);
        let half_up = angle_diff_deg(theta_up, 90.0).abs();
        let half_lo = angle_diff_deg(theta_lo, 270.0).abs();
        Self {
            upper: Some(AngularRange::centered(90.0, half_up)),
            lower: Some(AngularRange::centered(270.0, half_lo)),
        }
    }

    pub fn ranges(&self) -> impl Iterator<Item = &AngularRange> {
        self.upper.iter().chain(self.lower.iter())
    }

    pub fn validate(&self) -> Result<(), OcclusionError> {
        self.ranges().try_for_each(AngularRange::validate)
    }

    pub fn is_occluded(&self, theta_deg: f64) -> bool {
        self.ranges().any(|r| r.contains(theta_deg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn polar_cartesian_round_trip_uses_y_up_angles() {
        let p = PupilEstimate::circle(100.0, 80.0, 10.0);
        let up = p.cartesian_of(20.0, 90.0);
        assert_abs_diff_eq!(up[0], 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(up[1], 60.0, epsilon = 1e-9);

        let (r, t) = p.polar_of([100.0, 100.0]);
        assert_abs_diff_eq!(r, 20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(t, 270.0, epsilon = 1e-9);
    }

    #[test]
    fn degenerate_pupil_is_reported() {
        assert!(PupilEstimate::circle(10.0, 10.0, 0.0).validate().is_err());
        assert!(PupilEstimate::circle(f64::NAN, 10.0, 3.0).validate().is_err());
        assert!(PupilEstimate::circle(10.0, 10.0, 3.0).validate().is_ok());
    }

    #[test]
    fn ellipse_boundary_radius_follows_axes() {
        let p = PupilEstimate::circle(0.0, 0.0, 15.0).with_ellipse(PupilEllipse {
            semi_axes: [20.0, 10.0],
            angle: 0.0,
        });
        assert_abs_diff_eq!(p.boundary_radius_at(0.0), 20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.boundary_radius_at(90.0), 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.boundary_radius_at(180.0), 20.0, epsilon = 1e-9);
    }

    #[test]
    fn range_wraps_through_zero() {
        let r = AngularRange::new(350.0, 10.0);
        assert_abs_diff_eq!(r.span_deg(), 20.0, epsilon = 1e-9);
        assert!(r.contains(355.0));
        assert!(r.contains(5.0));
        assert!(!r.contains(20.0));
        assert!(AngularRange::new(0.0, 400.0).contains(123.0));
    }

    #[test]
    fn iris_limits_mirror_across_vertical_axis() {
        let p = PupilEstimate::circle(50.0, 50.0, 5.0);
        // Upper point at 60°, lower point at 300°.
        let up = p.cartesian_of(20.0, 60.0);
        let lo = p.cartesian_of(20.0, 300.0);
        let lids = EyelidBoundary::from_iris_limits(up, lo, &p);
        let upper = lids.upper.unwrap();
        let lower = lids.lower.unwrap();
        assert_abs_diff_eq!(upper.start_deg, 60.0, epsilon = 1e-9);
        assert_abs_diff_eq!(upper.end_deg, 120.0, epsilon = 1e-9);
        assert_abs_diff_eq!(lower.start_deg, 240.0, epsilon = 1e-9);
        assert_abs_diff_eq!(lower.end_deg, 300.0, epsilon = 1e-9);
        assert!(lids.is_occluded(100.0));
        assert!(!lids.is_occluded(0.0));
    }
}
