//! Per-frame pipeline: unwrap → mask → correlation surface.

use image::GrayImage;

use crate::config::GeometryConfig;
use crate::correlate::{correlation_surface, CorrelationSurface, SearchConfig};
use crate::error::TorsionError;
use crate::geometry::{EyelidBoundary, PupilEstimate};
use crate::occlusion::{mask_occlusion, MaskedPolar};
use crate::unwrap::unwrap_iris;

/// Unwrap the iris band of `frame` and mask eyelid occlusion.
pub fn build_polar(
    frame: &GrayImage,
    pupil: &PupilEstimate,
    eyelid: &EyelidBoundary,
    config: &GeometryConfig,
) -> Result<MaskedPolar, TorsionError> {
    let polar = unwrap_iris(frame, pupil, &config.unwrap)?;
    mask_occlusion(&polar, eyelid, &config.occlusion)
}

/// Build the target band of one frame and correlate it with `reference`.
///
/// Pure in its inputs, so frames can be processed on any thread.
pub(crate) fn frame_surface(
    reference: &MaskedPolar,
    frame: &GrayImage,
    pupil: &PupilEstimate,
    eyelid: &EyelidBoundary,
    geometry: &GeometryConfig,
    search: &SearchConfig,
) -> Result<CorrelationSurface, TorsionError> {
    let target = build_polar(frame, pupil, eyelid, geometry)?;
    correlation_surface(reference, &target, search)
}
