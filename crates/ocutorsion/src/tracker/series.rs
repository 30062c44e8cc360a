//! Ordered per-frame torsion results.

use super::TorsionEstimate;

/// Torsion estimates of one run, in increasing frame order.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TorsionSeries {
    estimates: Vec<TorsionEstimate>,
}

impl TorsionSeries {
    pub(crate) fn push(&mut self, estimate: TorsionEstimate) -> &TorsionEstimate {
        debug_assert!(self
            .estimates
            .last()
            .map_or(true, |e| e.frame_index < estimate.frame_index));
        self.estimates.push(estimate);
        &self.estimates[self.estimates.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.estimates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.estimates.is_empty()
    }

    pub fn estimates(&self) -> &[TorsionEstimate] {
        &self.estimates
    }

    pub fn iter(&self) -> impl Iterator<Item = &TorsionEstimate> {
        self.estimates.iter()
    }

    /// Estimate for frame `index`, if that frame was processed.
    pub fn get(&self, index: usize) -> Option<&TorsionEstimate> {
        self.estimates
            .binary_search_by_key(&index, |e| e.frame_index)
            .ok()
            .map(|k| &self.estimates[k])
    }

    /// Fraction of frames with a valid estimate.
    pub fn valid_fraction(&self) -> f64 {
        if self.estimates.is_empty() {
            return 0.0;
        }
        let n = self.estimates.iter().filter(|e| e.valid).count();
        n as f64 / self.estimates.len() as f64
    }

    /// Frame indices without a valid estimate.
    pub fn invalid_indices(&self) -> Vec<usize> {
        self.estimates
            .iter()
            .filter(|e| !e.valid)
            .map(|e| e.frame_index)
            .collect()
    }

    /// Angle per frame, `None` where invalid.
    pub fn angles(&self) -> Vec<Option<f64>> {
        self.estimates.iter().map(|e| e.angle_degrees).collect()
    }

    /// Angular velocity between each frame and its predecessor in the
    /// series.
    ///
    /// Degrees per frame, or degrees per second when `fps` is given. The
    /// first entry, and any entry where either neighbour is invalid, is
    /// `None`. Gaps in frame indices are divided out.
    pub fn angular_velocity(&self, fps: Option<f64>) -> Vec<Option<f64>> {
        let scale = fps.unwrap_or(1.0);
        let mut out = Vec::with_capacity(self.estimates.len());
        let mut prev: Option<&TorsionEstimate> = None;
        for e in &self.estimates {
            let v = prev.and_then(|p| {
                let (a0, a1) = (p.angle_degrees?, e.angle_degrees?);
                let dt = (e.frame_index - p.frame_index) as f64;
                Some((a1 - a0) / dt * scale)
            });
            out.push(v);
            prev = Some(e);
        }
        out
    }
}

impl<'a> IntoIterator for &'a TorsionSeries {
    type Item = &'a TorsionEstimate;
    type IntoIter = std::slice::Iter<'a, TorsionEstimate>;

    fn into_iter(self) -> Self::IntoIter {
        self.estimates.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureReason;
    use approx::assert_abs_diff_eq;

    fn est(index: usize, angle: Option<f64>) -> TorsionEstimate {
        TorsionEstimate {
            frame_index: index,
            reference_index: 0,
            angle_degrees: angle,
            confidence: angle.map(|_| 0.9),
            valid: angle.is_some(),
            failure_reason: angle.is_none().then_some(FailureReason::FullyOccluded),
            radial_shift: 0,
            pupil_center: [0.0, 0.0],
            detail: None,
        }
    }

    #[test]
    fn velocity_skips_invalid_neighbours_and_scales_by_fps() {
        let mut s = TorsionSeries::default();
        s.push(est(0, Some(0.0)));
        s.push(est(1, Some(0.5)));
        s.push(est(2, None));
        s.push(est(3, Some(1.0)));
        s.push(est(5, Some(2.0)));
        let v = s.angular_velocity(None);
        assert_eq!(v[0], None);
        assert_abs_diff_eq!(v[1].unwrap(), 0.5);
        assert_eq!(v[2], None);
        assert_eq!(v[3], None);
        assert_abs_diff_eq!(v[4].unwrap(), 0.5);
        let per_s = s.angular_velocity(Some(100.0));
        assert_abs_diff_eq!(per_s[1].unwrap(), 50.0);

        assert_eq!(s.invalid_indices(), vec![2]);
        assert_abs_diff_eq!(s.valid_fraction(), 0.8);
        assert_eq!(s.get(3).and_then(|e| e.angle_degrees), Some(1.0));
        assert!(s.get(4).is_none());
    }
}
