use std::collections::BTreeSet;
use tracing::debug;

use crate::config::RepairParams;
use crate::fitting::{CurveModel, IntervalSpacing};
use crate::utils::stats::{mean, mean_abs, std_dev};

/// Flags are ignored below this fraction of the mean interval length.
pub const MIN_RELATIVE_DEVIATION: f64 = 0.05;

/// Finds intervals of an ordered side that likely hide a missing landmark.
///
/// Two heuristics are OR'd together, both scaled by `specificity`
/// (standard deviations; negative values widen detection):
///
/// - fit residual: `|r| > mean(|r|) + k * std(r)`, where `r` is the actual
///   interval length minus the frequency polynomial's prediction. Interior
///   intervals must also differ in sign from both neighbours' residuals.
/// - local length: the interval is longer than either neighbour by more
///   than `k * std(lengths)`.
///
/// Intervals adjacent to an accepted flag are suppressed, longest first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OmissionDetector {
    pub specificity: f64,
}

impl OmissionDetector {
    pub fn new(specificity: f64) -> Self {
        Self { specificity }
    }

    pub fn from_params(params: &RepairParams) -> Self {
        Self::new(params.omission_detection_specificity)
    }

    /// Indices of flagged intervals; interval `i` lies between points `i` and `i + 1`.
    pub fn detect(&self, model: &CurveModel, spacing: &[IntervalSpacing]) -> BTreeSet<usize> {
        if spacing.len() < 2 {
            return BTreeSet::new();
        }
        let lengths: Vec<f64> = spacing.iter().map(|sp| sp.length).collect();
        let residuals: Vec<f64> = spacing
            .iter()
            .map(|sp| sp.length - model.frequency.eval(sp.midpoint_arc))
            .collect();
        let floor = MIN_RELATIVE_DEVIATION * mean(&lengths);

        let by_residual = self.residual_flags(&residuals, floor);
        let by_length = self.length_flags(&lengths, floor);
        debug!(
            "omission candidates: residual {:?}, local length {:?}",
            by_residual, by_length
        );

        let mut candidates: Vec<usize> = by_residual.union(&by_length).copied().collect();
        candidates.sort_by(|&a, &b| lengths[b].total_cmp(&lengths[a]).then(a.cmp(&b)));

        let mut flagged = BTreeSet::new();
        for idx in candidates {
            let adjacent =
                (idx > 0 && flagged.contains(&(idx - 1))) || flagged.contains(&(idx + 1));
            if !adjacent {
                flagged.insert(idx);
            }
        }
        flagged
    }

    fn residual_flags(&self, residuals: &[f64], floor: f64) -> BTreeSet<usize> {
        let threshold = mean_abs(residuals) + self.specificity * std_dev(residuals);
        let last = residuals.len() - 1;
        (0..residuals.len())
            .filter(|&i| {
                let r = residuals[i];
                if r.abs() <= threshold || r.abs() < floor {
                    return false;
                }
                if i == 0 || i == last {
                    return true;
                }
                let sign = r.signum();
                residuals[i - 1].signum() != sign && residuals[i + 1].signum() != sign
            })
            .collect()
    }

    fn length_flags(&self, lengths: &[f64], floor: f64) -> BTreeSet<usize> {
        let threshold = self.specificity * std_dev(lengths);
        (0..lengths.len())
            .filter(|&i| {
                let exceeds = |j: usize| {
                    let excess = lengths[i] - lengths[j];
                    excess > threshold && excess >= floor
                };
                (i > 0 && exceeds(i - 1)) || (i + 1 < lengths.len() && exceeds(i + 1))
            })
            .collect()
    }
}
