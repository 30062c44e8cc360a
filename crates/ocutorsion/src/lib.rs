//! ocutorsion — ocular torsion estimation from iris video.
//!
//! Torsion is the rotation of the eye about its visual axis. Given a frame,
//! an upstream pupil estimate and eyelid occlusion ranges, the pipeline
//! stages are:
//!
//! 1. **Unwrap** – resample the iris annulus around the pupil into a
//!    radius × angle [`PolarImage`].
//! 2. **Occlusion** – mask eyelid-covered columns and inpaint them by
//!    mirrored azimuthal replication.
//! 3. **Correlate** – normalized cross-correlation against a calibration
//!    band over candidate angular offsets, with cubic-spline sub-column
//!    refinement.
//! 4. **Track** – a calibrate/step state machine that turns a sequence of
//!    frames into a [`TorsionSeries`], isolating per-frame failures.
//!
//! Angles are in degrees, counter-clockwise with image y pointing up
//! (90° is straight up in the image).
//!
//! # Example
//!
//! ```no_run
//! use ocutorsion::{EyelidBoundary, PupilEstimate, TorsionConfig, TorsionTracker};
//! use image::GrayImage;
//!
//! let frames: Vec<GrayImage> = vec![GrayImage::new(320, 240); 3];
//! let pupil = PupilEstimate::circle(160.0, 120.0, 20.0);
//! let lids = EyelidBoundary::open();
//!
//! let mut tracker = TorsionTracker::new(TorsionConfig::default()).unwrap();
//! tracker.calibrate(0, &frames[0], &pupil, &lids).unwrap();
//! for (i, frame) in frames.iter().enumerate() {
//!     let est = tracker.step(i, frame, &pupil, &lids).unwrap();
//!     println!("{}: {:?}", i, est.angle_degrees);
//! }
//! tracker.finish().unwrap();
//! ```

mod config;
mod correlate;
mod error;
mod geometry;
mod occlusion;
mod pipeline;
mod tracker;
mod unwrap;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::{GeometryConfig, TorsionConfig};
pub use correlate::{
    circular_correlate_1d, correlate, correlate_1d, correlation_surface, resolve_peak,
    CorrelationSurface, Lag1d, NaturalCubicSpline, RefinedPeak, Rejection, SearchConfig,
    SurfaceCell, TorsionOutcome, DEFAULT_MIN_OVERLAP, MIN_INTERP_POINTS,
};
pub use error::{
    CorrelationError, FailureReason, GeometryError, OcclusionError, ParameterError, RunError,
    TorsionError,
};
pub use geometry::{angle_diff_deg, wrap_deg, AngularRange, EyelidBoundary, PupilEllipse, PupilEstimate};
pub use occlusion::{mask_occlusion, FillMode, MaskedPolar, OcclusionConfig, OcclusionMask};
pub use pipeline::build_polar;
pub use tracker::{FrameInput, TorsionEstimate, TorsionSeries, TorsionTracker, TrackerState};
pub use unwrap::{unwrap_iris, BorderMode, FrameSampler, Interpolation, PolarImage, UnwrapConfig};
