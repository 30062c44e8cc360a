//! Error taxonomy for the unwrap → mask → correlate → track pipeline.
//!
//! Frame-local failures are folded into a [`FailureReason`] and attached to
//! the frame's estimate by the tracker. [`ParameterError`] is the only kind
//! that is raised synchronously at call time.

// ── Geometry ─────────────────────────────────────────────────────────────

/// Invalid annulus geometry for a polar unwrap.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// Pupil radius is not strictly positive or the center is not finite.
    InvalidPupil { center: [f64; 2], radius: f64 },
    /// Outer sampling radius does not exceed the inner one.
    DegenerateAnnulus { inner: f64, outer: f64 },
    /// The outer disc of the annulus does not intersect the frame at all.
    OutsideFrame {
        center: [f64; 2],
        outer: f64,
        width: u32,
        height: u32,
    },
}

impl std::fmt::Display for GeometryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPupil { center, radius } => write!(
                f,
                "invalid pupil: center ({:.2}, {:.2}), radius {:.3}",
                center[0], center[1], radius
            ),
            Self::DegenerateAnnulus { inner, outer } => write!(
                f,
                "degenerate annulus: outer radius {:.3} <= inner radius {:.3}",
                outer, inner
            ),
            Self::OutsideFrame {
                center,
                outer,
                width,
                height,
            } => write!(
                f,
                "annulus at ({:.1}, {:.1}) with outer radius {:.1} lies outside {}x{} frame",
                center[0], center[1], outer, width, height
            ),
        }
    }
}

impl std::error::Error for GeometryError {}

// ── Occlusion ────────────────────────────────────────────────────────────

/// Eyelid masking failures.
#[derive(Debug, Clone, PartialEq)]
pub enum OcclusionError {
    /// Unoccluded angular span is below the configured minimum.
    FullyOccluded {
        usable_fraction: f32,
        min_fraction: f32,
    },
    /// An eyelid range has non-finite bounds.
    InvalidRange { start_deg: f64, end_deg: f64 },
}

impl std::fmt::Display for OcclusionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FullyOccluded {
                usable_fraction,
                min_fraction,
            } => write!(
                f,
                "fully occluded: usable span {:.1}% < minimum {:.1}%",
                usable_fraction * 100.0,
                min_fraction * 100.0
            ),
            Self::InvalidRange { start_deg, end_deg } => {
                write!(f, "invalid eyelid range [{}, {}]", start_deg, end_deg)
            }
        }
    }
}

impl std::error::Error for OcclusionError {}

// ── Correlation ──────────────────────────────────────────────────────────

/// Input shape errors raised by the correlators.
#[derive(Debug, Clone, PartialEq)]
pub enum CorrelationError {
    /// Two polar images (or sequences) have no common valid layout/overlap.
    ShapeMismatch { left: [usize; 2], right: [usize; 2] },
    /// Periodic sequences must have equal length.
    LengthMismatch { left: usize, right: usize },
}

impl std::fmt::Display for CorrelationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShapeMismatch { left, right } => write!(
                f,
                "shape mismatch: {}x{} vs {}x{}",
                left[0], left[1], right[0], right[1]
            ),
            Self::LengthMismatch { left, right } => {
                write!(f, "length mismatch: {} vs {}", left, right)
            }
        }
    }
}

impl std::error::Error for CorrelationError {}

// ── Parameters ───────────────────────────────────────────────────────────

/// Illegal configuration or parameter combination.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterError {
    /// Name of the offending parameter.
    pub param: &'static str,
    /// Human-readable constraint description.
    pub message: String,
}

impl ParameterError {
    pub fn new(param: &'static str, message: impl Into<String>) -> Self {
        Self {
            param,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ParameterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid parameter `{}`: {}", self.param, self.message)
    }
}

impl std::error::Error for ParameterError {}

// ── Umbrella ─────────────────────────────────────────────────────────────

/// Any failure of the per-frame pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum TorsionError {
    Geometry(GeometryError),
    Occlusion(OcclusionError),
    Correlation(CorrelationError),
    Parameter(ParameterError),
}

impl TorsionError {
    /// Stable reason recorded on a failed estimate.
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::Geometry(_) => FailureReason::InvalidGeometry,
            Self::Occlusion(OcclusionError::FullyOccluded { .. }) => FailureReason::FullyOccluded,
            Self::Occlusion(OcclusionError::InvalidRange { .. }) => FailureReason::InvalidEyelid,
            Self::Correlation(CorrelationError::ShapeMismatch { .. }) => {
                FailureReason::ShapeMismatch
            }
            Self::Correlation(CorrelationError::LengthMismatch { .. }) => {
                FailureReason::LengthMismatch
            }
            Self::Parameter(_) => FailureReason::InvalidParameter,
        }
    }
}

impl std::fmt::Display for TorsionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Geometry(e) => write!(f, "geometry error: {}", e),
            Self::Occlusion(e) => write!(f, "occlusion error: {}", e),
            Self::Correlation(e) => write!(f, "correlation error: {}", e),
            Self::Parameter(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for TorsionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Geometry(e) => Some(e),
            Self::Occlusion(e) => Some(e),
            Self::Correlation(e) => Some(e),
            Self::Parameter(e) => Some(e),
        }
    }
}

impl From<GeometryError> for TorsionError {
    fn from(e: GeometryError) -> Self {
        Self::Geometry(e)
    }
}

impl From<OcclusionError> for TorsionError {
    fn from(e: OcclusionError) -> Self {
        Self::Occlusion(e)
    }
}

impl From<CorrelationError> for TorsionError {
    fn from(e: CorrelationError) -> Self {
        Self::Correlation(e)
    }
}

impl From<ParameterError> for TorsionError {
    fn from(e: ParameterError) -> Self {
        Self::Parameter(e)
    }
}

/// Stable reject code attached to an invalid torsion estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InvalidGeometry,
    InvalidEyelid,
    FullyOccluded,
    ShapeMismatch,
    LengthMismatch,
    InvalidParameter,
    CorrelationBelowThreshold,
    LackingInterpPoints,
}

impl FailureReason {
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidGeometry => "invalid_geometry",
            Self::InvalidEyelid => "invalid_eyelid",
            Self::FullyOccluded => "fully_occluded",
            Self::ShapeMismatch => "shape_mismatch",
            Self::LengthMismatch => "length_mismatch",
            Self::InvalidParameter => "invalid_parameter",
            Self::CorrelationBelowThreshold => "correlation_below_threshold",
            Self::LackingInterpPoints => "lacking_interp_points",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Run-level failures of the torsion tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum RunError {
    /// `step` was called before a reference was established.
    NotCalibrated,
    /// `calibrate` was called twice.
    AlreadyCalibrated,
    /// The run already reached `Done`.
    Finished,
    /// The run is in the `Error` state.
    Failed,
    /// The caller cancelled the run.
    Cancelled,
    /// Frame indices must be strictly increasing.
    OutOfOrder { previous: usize, index: usize },
    /// Calibration frame could not be unwrapped or masked.
    Calibration(TorsionError),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotCalibrated => write!(f, "tracker is not calibrated"),
            Self::AlreadyCalibrated => write!(f, "tracker is already calibrated"),
            Self::Finished => write!(f, "run already finished"),
            Self::Failed => write!(f, "run is in the error state"),
            Self::Cancelled => write!(f, "run cancelled"),
            Self::OutOfOrder { previous, index } => write!(
                f,
                "frame index {} does not follow previous index {}",
                index, previous
            ),
            Self::Calibration(e) => write!(f, "calibration failed: {}", e),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Calibration(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_follow_error_kind() {
        let e: TorsionError = OcclusionError::FullyOccluded {
            usable_fraction: 0.1,
            min_fraction: 0.2,
        }
        .into();
        assert_eq!(e.reason(), FailureReason::FullyOccluded);
        assert_eq!(e.reason().code(), "fully_occluded");

        let e: TorsionError = GeometryError::DegenerateAnnulus {
            inner: 10.0,
            outer: 5.0,
        }
        .into();
        assert_eq!(e.reason(), FailureReason::InvalidGeometry);
        assert!(e.to_string().contains("degenerate annulus"));
    }

    #[test]
    fn failure_reason_serializes_snake_case() {
        let s = serde_json::to_string(&FailureReason::LackingInterpPoints).unwrap();
        assert_eq!(s, "\"lacking_interp_points\"");
    }
}
