//! Batch processing: surfaces in parallel, peaks in frame order.

use std::sync::atomic::{AtomicBool, Ordering};

use image::GrayImage;
use rayon::prelude::*;

use super::{TorsionTracker, TrackerState};
use crate::correlate::CorrelationSurface;
use crate::error::{RunError, TorsionError};
use crate::geometry::{EyelidBoundary, PupilEstimate};
use crate::pipeline::frame_surface;

/// One frame of a batch with its upstream pupil and eyelid estimates.
#[derive(Debug, Clone, Copy)]
pub struct FrameInput<'a> {
    pub index: usize,
    pub frame: &'a GrayImage,
    pub pupil: PupilEstimate,
    pub eyelid: EyelidBoundary,
}

impl TorsionTracker {
    /// Process `frames` (strictly increasing indices) against the reference.
    ///
    /// Correlation surfaces are computed on the rayon pool when
    /// `config.parallel` is set; peak selection runs sequentially so the
    /// continuity tie-break sees frames in order. `cancel` is checked
    /// between frames: once set, remaining results are discarded and the
    /// run ends in `Error`. Returns the number of frames recorded.
    pub fn run_batch(
        &mut self,
        frames: &[FrameInput<'_>],
        cancel: Option<&AtomicBool>,
    ) -> Result<usize, RunError> {
        let Some(first) = frames.first() else {
            return Ok(0);
        };
        self.check_ready(first.index)?;
        for pair in frames.windows(2) {
            if pair[1].index <= pair[0].index {
                return Err(RunError::OutOfOrder {
                    previous: pair[0].index,
                    index: pair[1].index,
                });
            }
        }

        let cancelled = || cancel.is_some_and(|c| c.load(Ordering::Relaxed));
        let results: Vec<Option<Result<CorrelationSurface, TorsionError>>> = {
            let Some(reference) = self.reference.as_ref() else {
                return Err(RunError::NotCalibrated);
            };
            let geometry = &self.config.geometry;
            let search = &self.config.search;
            let work = |f: &FrameInput<'_>| {
                if cancelled() {
                    return None;
                }
                Some(frame_surface(
                    &reference.band,
                    f.frame,
                    &f.pupil,
                    &f.eyelid,
                    geometry,
                    search,
                ))
            };
            if self.config.parallel {
                frames.par_iter().map(work).collect()
            } else {
                frames.iter().map(work).collect()
            }
        };

        let mut recorded = 0;
        for (f, result) in frames.iter().zip(results) {
            let result = match result {
                Some(r) if !cancelled() => r,
                _ => {
                    tracing::info!(
                        "batch cancelled after {} of {} frames",
                        recorded,
                        frames.len()
                    );
                    self.cancel();
                    return Err(RunError::Cancelled);
                }
            };
            self.record(f.index, &f.pupil, result);
            recorded += 1;
        }

        debug_assert_eq!(self.state, TrackerState::Running);
        tracing::info!(
            "batch of {} frames done ({} -> {})",
            recorded,
            first.index,
            frames[frames.len() - 1].index
        );
        Ok(recorded)
    }
}
