//! Torsion tracking over a frame sequence.
//!
//! [`TorsionTracker`] is a small state machine:
//!
//! ```text
//! Idle ──calibrate──▶ Calibrated ──step──▶ Running ──finish──▶ Done
//!   │                     │                   │
//!   └──── cancel / calibration failure ───────┴──────────────▶ Error
//! ```
//!
//! The calibration band is kept read-only for the whole run. Per-frame
//! failures never stop the run: they are recorded on the frame's
//! [`TorsionEstimate`] with a [`FailureReason`].

mod batch;
mod series;

use image::GrayImage;

pub use batch::FrameInput;
pub use series::TorsionSeries;

use crate::config::TorsionConfig;
use crate::correlate::{resolve_peak, CorrelationSurface, Rejection, TorsionOutcome};
use crate::error::{FailureReason, ParameterError, RunError, TorsionError};
use crate::geometry::{EyelidBoundary, PupilEstimate};
use crate::occlusion::MaskedPolar;
use crate::pipeline::{build_polar, frame_surface};

/// Lifecycle state of a [`TorsionTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerState {
    Idle,
    Calibrated,
    Running,
    Done,
    Error,
}

/// Torsion result for one frame.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TorsionEstimate {
    pub frame_index: usize,
    pub reference_index: usize,
    /// Counter-clockwise rotation relative to the reference, degrees.
    pub angle_degrees: Option<f64>,
    /// Interpolated peak coefficient; for a below-threshold rejection, the
    /// best coarse coefficient.
    pub confidence: Option<f64>,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    /// Radial shift of the peak, in polar rows.
    pub radial_shift: isize,
    /// Pupil center the frame was unwrapped around.
    pub pupil_center: [f64; 2],
    /// Human-readable failure detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TorsionEstimate {
    fn from_outcome(index: usize, reference_index: usize, pupil: &PupilEstimate, outcome: &TorsionOutcome) -> Self {
        match outcome {
            TorsionOutcome::Accepted(peak) => Self {
                frame_index: index,
                reference_index,
                angle_degrees: Some(peak.angle_deg),
                confidence: Some(peak.confidence),
                valid: true,
                failure_reason: None,
                radial_shift: peak.radial_shift,
                pupil_center: pupil.center,
                detail: None,
            },
            TorsionOutcome::Rejected(rejection) => {
                let confidence = match rejection {
                    Rejection::CorrelationBelowThreshold { best, .. } => Some(*best),
                    _ => None,
                };
                Self {
                    confidence,
                    failure_reason: Some(rejection.reason()),
                    detail: Some(rejection.to_string()),
                    ..Self::invalid(index, reference_index, pupil)
                }
            }
        }
    }

    fn from_error(index: usize, reference_index: usize, pupil: &PupilEstimate, err: &TorsionError) -> Self {
        Self {
            failure_reason: Some(err.reason()),
            detail: Some(err.to_string()),
            ..Self::invalid(index, reference_index, pupil)
        }
    }

    fn invalid(index: usize, reference_index: usize, pupil: &PupilEstimate) -> Self {
        Self {
            frame_index: index,
            reference_index,
            angle_degrees: None,
            confidence: None,
            valid: false,
            failure_reason: None,
            radial_shift: 0,
            pupil_center: pupil.center,
            detail: None,
        }
    }
}

struct Reference {
    index: usize,
    band: MaskedPolar,
}

/// Calibrate once, then estimate torsion frame by frame.
pub struct TorsionTracker {
    config: TorsionConfig,
    state: TrackerState,
    reference: Option<Reference>,
    series: TorsionSeries,
    last_index: Option<usize>,
    /// Angle of the last accepted estimate, for the continuity tie-break.
    prior_deg: Option<f64>,
    cancelled: bool,
}

impl TorsionTracker {
    pub fn new(config: TorsionConfig) -> Result<Self, ParameterError> {
        config.validate()?;
        Ok(Self {
            config,
            state: TrackerState::Idle,
            reference: None,
            series: TorsionSeries::default(),
            last_index: None,
            prior_deg: None,
            cancelled: false,
        })
    }

    pub fn config(&self) -> &TorsionConfig {
        &self.config
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Calibration band, once calibrated.
    pub fn reference(&self) -> Option<&MaskedPolar> {
        self.reference.as_ref().map(|r| &r.band)
    }

    pub fn reference_index(&self) -> Option<usize> {
        self.reference.as_ref().map(|r| r.index)
    }

    pub fn series(&self) -> &TorsionSeries {
        &self.series
    }

    pub fn into_series(self) -> TorsionSeries {
        self.series
    }

    fn terminal_error(&self) -> Option<RunError> {
        match self.state {
            TrackerState::Done => Some(RunError::Finished),
            TrackerState::Error if self.cancelled => Some(RunError::Cancelled),
            TrackerState::Error => Some(RunError::Failed),
            _ => None,
        }
    }

    /// Build the reference band from the calibration frame.
    ///
    /// Failure is fatal for the run and moves the tracker to `Error`.
    pub fn calibrate(
        &mut self,
        index: usize,
        frame: &GrayImage,
        pupil: &PupilEstimate,
        eyelid: &EyelidBoundary,
    ) -> Result<(), RunError> {
        if let Some(e) = self.terminal_error() {
            return Err(e);
        }
        if self.state != TrackerState::Idle {
            return Err(RunError::AlreadyCalibrated);
        }
        match build_polar(frame, pupil, eyelid, &self.config.geometry) {
            Ok(band) => {
                tracing::info!(
                    "calibrated on frame {} ({}x{} band, {:.1}% usable)",
                    index,
                    band.shape()[0],
                    band.shape()[1],
                    band.mask().usable_fraction() * 100.0
                );
                self.reference = Some(Reference { index, band });
                self.state = TrackerState::Calibrated;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("calibration on frame {} failed: {}", index, e);
                self.state = TrackerState::Error;
                Err(RunError::Calibration(e))
            }
        }
    }

    /// Check that a frame with `index` may be processed now.
    fn check_ready(&self, index: usize) -> Result<(), RunError> {
        if let Some(e) = self.terminal_error() {
            return Err(e);
        }
        if self.reference.is_none() {
            return Err(RunError::NotCalibrated);
        }
        match self.last_index {
            Some(previous) if index <= previous => Err(RunError::OutOfOrder { previous, index }),
            _ => Ok(()),
        }
    }

    /// Estimate torsion of one frame against the reference.
    ///
    /// Frame-local failures are recorded on the returned estimate; only
    /// lifecycle violations are errors.
    pub fn step(
        &mut self,
        index: usize,
        frame: &GrayImage,
        pupil: &PupilEstimate,
        eyelid: &EyelidBoundary,
    ) -> Result<&TorsionEstimate, RunError> {
        self.check_ready(index)?;
        let result = match &self.reference {
            Some(r) => frame_surface(
                &r.band,
                frame,
                pupil,
                eyelid,
                &self.config.geometry,
                &self.config.search,
            ),
            None => return Err(RunError::NotCalibrated),
        };
        Ok(self.record(index, pupil, result))
    }

    /// Resolve a computed surface (or failure) into the next estimate.
    fn record(
        &mut self,
        index: usize,
        pupil: &PupilEstimate,
        result: Result<CorrelationSurface, TorsionError>,
    ) -> &TorsionEstimate {
        let reference_index = self.reference_index().unwrap_or(0);
        let estimate = match result {
            Ok(surface) => {
                let outcome = resolve_peak(&surface, &self.config.search, self.prior_deg);
                if let TorsionOutcome::Accepted(peak) = &outcome {
                    self.prior_deg = Some(peak.angle_deg);
                }
                TorsionEstimate::from_outcome(index, reference_index, pupil, &outcome)
            }
            Err(e) => TorsionEstimate::from_error(index, reference_index, pupil, &e),
        };

        match (estimate.valid, estimate.angle_degrees, estimate.failure_reason) {
            (true, Some(angle), _) => tracing::debug!(
                "frame {}: {:+.3} deg (r={:.3})",
                index,
                angle,
                estimate.confidence.unwrap_or(f64::NAN)
            ),
            (_, _, reason) => tracing::warn!(
                "frame {}: no estimate ({})",
                index,
                reason.map_or("unknown", FailureReason::code)
            ),
        }

        self.last_index = Some(index);
        self.state = TrackerState::Running;
        self.series.push(estimate)
    }

    /// End the run.
    pub fn finish(&mut self) -> Result<&TorsionSeries, RunError> {
        if let Some(e) = self.terminal_error() {
            return Err(e);
        }
        if self.state == TrackerState::Idle {
            return Err(RunError::NotCalibrated);
        }
        self.state = TrackerState::Done;
        tracing::info!(
            "run finished: {} frames, {:.1}% valid",
            self.series.len(),
            self.series.valid_fraction() * 100.0
        );
        Ok(&self.series)
    }

    /// Abort the run; further calls fail with [`RunError::Cancelled`].
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.state = TrackerState::Error;
    }
}
