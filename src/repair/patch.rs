use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RepairParams;
use crate::error::{LandmarkError, Result};
use crate::fitting::{CurveFitter, CurveModel};
use crate::landmarks::{patch_point_label, LandmarkPoint, OrderedSide, Side};
use crate::utils::stats::mean_abs;

const ERROR_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchStatus {
    /// Adding another point stopped improving the local fit.
    Converged,
    /// Even the first imputed point did not improve the fit; the patch is empty.
    NoImprovementFound,
    /// The side reached its point cap; the repair may be incomplete.
    PointCountCapReached,
}

/// Points synthesized for one flagged interval of a side.
///
/// The patch is held by the caller until it is accepted with
/// [`OrderedSide::apply_patch`] or edited with [`PatchGenerator::resize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// Sub-patch index, used in the labels of the synthesized points.
    pub index: usize,
    pub side: Side,
    /// Interval of the unpatched side the points were placed in.
    pub interval: usize,
    pub upper_label: String,
    pub lower_label: String,
    pub points: Vec<LandmarkPoint>,
    pub status: PatchStatus,
    /// Normalized local fit error for 0, 1, 2, ... imputed points.
    pub normalized_errors: Vec<f64>,
}

impl Patch {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Imputes points into a flagged interval.
///
/// Testing `n` points places them evenly (by height) between the interval's
/// bounding landmarks, on the centerline fitted before imputation. The side
/// plus candidates is refitted and the mean absolute frequency residual over
/// the subdivided interval and its neighbours, divided by `N - 1 + n`, is
/// compared to the value for `n - 1`. The search continues while the relative
/// improvement exceeds `imputation_specificity`, and never lets the side grow
/// beyond `max_side_points`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatchGenerator {
    pub fitter: CurveFitter,
    pub imputation_specificity: f64,
    pub max_side_points: usize,
}

impl PatchGenerator {
    pub fn new(fitter: CurveFitter, imputation_specificity: f64, max_side_points: usize) -> Self {
        Self {
            fitter,
            imputation_specificity,
            max_side_points,
        }
    }

    pub fn from_params(params: &RepairParams) -> Self {
        Self::new(
            CurveFitter::from_params(params),
            params.imputation_specificity,
            params.max_side_points(),
        )
    }

    pub fn with_max_side_points(mut self, max_side_points: usize) -> Self {
        self.max_side_points = max_side_points;
        self
    }

    /// Searches `interval` of `side` for the number of points to impute.
    ///
    /// `patch_index` is raised to [`OrderedSide::next_patch_index`] when the
    /// side already carries points of that sub-patch or a later one, so the
    /// labels of the returned points never collide with the side's.
    pub fn generate(
        &self,
        side: &OrderedSide,
        interval: usize,
        patch_index: usize,
    ) -> Result<Patch> {
        self.check_interval(side, interval)?;
        let taken = side.next_patch_index();
        let patch_index = if patch_index < taken {
            debug!(
                "sub-patch index {} already used on {} side, using {}",
                patch_index, side.side, taken
            );
            taken
        } else {
            patch_index
        };
        let model = self.fitter.fit(side)?;
        let n_points = side.len();

        let mut errors = vec![self.region_error(side, interval, &[])?];
        let mut accepted: Vec<LandmarkPoint> = Vec::new();
        let mut status = PatchStatus::Converged;

        let mut n = 1;
        loop {
            if n_points + n > self.max_side_points {
                status = PatchStatus::PointCountCapReached;
                break;
            }
            let candidate = impute(&model, side, interval, n, patch_index);
            let current = self.region_error(side, interval, &candidate)?;
            let previous = errors[errors.len() - 1];
            errors.push(current);

            let improvement = relative_improvement(previous, current);
            debug!(
                "patch {} testing {} point(s): error {:.5} -> {:.5} ({:+.3})",
                patch_index, n, previous, current, improvement
            );
            if improvement <= self.imputation_specificity {
                break;
            }
            accepted = candidate;
            n += 1;
        }

        if accepted.is_empty() && status == PatchStatus::Converged {
            status = PatchStatus::NoImprovementFound;
        }
        match status {
            PatchStatus::Converged => info!(
                "patch {} on {} interval {}: {} point(s)",
                patch_index,
                side.side,
                interval,
                accepted.len()
            ),
            PatchStatus::NoImprovementFound => warn!(
                "patch {} on {} interval {}: no imputed point improved the fit",
                patch_index, side.side, interval
            ),
            PatchStatus::PointCountCapReached => warn!(
                "patch {} on {} interval {}: side capped at {} points, repair may be incomplete",
                patch_index, side.side, interval, self.max_side_points
            ),
        }

        let points = side.points();
        Ok(Patch {
            index: patch_index,
            side: side.side,
            interval,
            upper_label: points[interval].label.clone(),
            lower_label: points[interval + 1].label.clone(),
            points: accepted,
            status,
            normalized_errors: errors,
        })
    }

    /// Re-imputes `patch` with exactly `n` points, clamped to the side's cap.
    /// `side` is the side the patch was generated for, without the patch applied.
    pub fn resize(&self, side: &OrderedSide, patch: &Patch, n: usize) -> Result<Patch> {
        let interval = locate_interval(side, patch)?;
        let model = self.fitter.fit(side)?;

        let room = self.max_side_points.saturating_sub(side.len());
        let (n, status) = if n > room {
            warn!(
                "patch {} limited to {} point(s) by the side cap of {}",
                patch.index, room, self.max_side_points
            );
            (room, PatchStatus::PointCountCapReached)
        } else if n == 0 {
            (0, PatchStatus::NoImprovementFound)
        } else {
            (n, PatchStatus::Converged)
        };

        let mut errors = Vec::with_capacity(n + 1);
        let mut points = Vec::new();
        for k in 0..=n {
            points = impute(&model, side, interval, k, patch.index);
            errors.push(self.region_error(side, interval, &points)?);
        }

        Ok(Patch {
            interval,
            points,
            status,
            normalized_errors: errors,
            ..patch.clone()
        })
    }

    /// Adds one point to a caller-held patch.
    pub fn grow(&self, side: &OrderedSide, patch: &Patch) -> Result<Patch> {
        self.resize(side, patch, patch.len() + 1)
    }

    /// Removes one point from a caller-held patch.
    pub fn shrink(&self, side: &OrderedSide, patch: &Patch) -> Result<Patch> {
        self.resize(side, patch, patch.len().saturating_sub(1))
    }

    fn check_interval(&self, side: &OrderedSide, interval: usize) -> Result<()> {
        if interval >= side.interval_count() {
            return Err(LandmarkError::invalid(
                "interval",
                interval,
                "no such interval on this side",
            ));
        }
        Ok(())
    }

    /// Normalized mean absolute frequency residual around `interval` after
    /// inserting `candidate` into the side.
    fn region_error(
        &self,
        side: &OrderedSide,
        interval: usize,
        candidate: &[LandmarkPoint],
    ) -> Result<f64> {
        let combined = if candidate.is_empty() {
            side.clone()
        } else {
            let mut points = side.points().to_vec();
            points.extend_from_slice(candidate);
            OrderedSide::new(side.side, points)
        };
        let model = self.fitter.fit(&combined)?;
        let residuals = model.residuals();

        let n = candidate.len();
        let first = interval.saturating_sub(1);
        let last = (interval + n + 1).min(residuals.len() - 1);
        let local = mean_abs(&residuals[first..=last]);
        Ok(local / (side.len() - 1 + n) as f64)
    }
}

fn relative_improvement(previous: f64, current: f64) -> f64 {
    if previous <= ERROR_EPS {
        if current <= ERROR_EPS {
            0.0
        } else {
            f64::NEG_INFINITY
        }
    } else {
        (previous - current) / previous
    }
}

/// `n` points evenly spaced by height inside `interval`, placed on `model`'s centerline.
fn impute(
    model: &CurveModel,
    side: &OrderedSide,
    interval: usize,
    n: usize,
    patch_index: usize,
) -> Vec<LandmarkPoint> {
    let upper = &side.points()[interval];
    let lower = &side.points()[interval + 1];
    (1..=n)
        .map(|k| {
            let s = upper.z + (lower.z - upper.z) * k as f64 / (n + 1) as f64;
            LandmarkPoint::from_position(patch_point_label(patch_index, k - 1), model.point_at(s))
        })
        .collect()
}

fn locate_interval(side: &OrderedSide, patch: &Patch) -> Result<usize> {
    let position = |label: &str| side.points().iter().position(|p| p.label == label);
    match (position(&patch.upper_label), position(&patch.lower_label)) {
        (Some(upper), Some(lower)) if lower == upper + 1 => Ok(upper),
        _ => Err(LandmarkError::invalid(
            "patch",
            format!("{}..{}", patch.upper_label, patch.lower_label),
            "bounding landmarks are not adjacent on this side",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::synthetic_spine;
    use approx::assert_relative_eq;

    fn gapped_left() -> (OrderedSide, LandmarkPoint) {
        let (left, _) = synthetic_spine(17, 25.0, 30.0, 8.0);
        let removed = left
            .points()
            .iter()
            .find(|p| p.label == "T9L")
            .cloned()
            .unwrap();
        (left.remove_labels(&["T9L"]), removed)
    }

    fn generator(cap: usize) -> PatchGenerator {
        PatchGenerator::new(CurveFitter::new(5, 2), 0.0, cap)
    }

    #[test]
    fn test_gap_is_filled_with_one_point() {
        let (side, removed) = gapped_left();
        for cap in [17, 34] {
            let patch = generator(cap).generate(&side, 7, 0).unwrap();
            assert_eq!(patch.len(), 1, "cap {}", cap);
            assert!(patch.points[0].distance_to(&removed) < 1.5);
            assert_relative_eq!(patch.points[0].z, removed.z, epsilon = 1e-9);
            assert_eq!(patch.points[0].label, "SubPatch-0_Point-0");
            assert_eq!(patch.upper_label, "T8L");
            assert_eq!(patch.lower_label, "T10L");
        }
        assert_eq!(
            generator(17).generate(&side, 7, 0).unwrap().status,
            PatchStatus::PointCountCapReached
        );
        assert_eq!(
            generator(34).generate(&side, 7, 0).unwrap().status,
            PatchStatus::Converged
        );
    }

    #[test]
    fn test_full_side_is_capped_immediately() {
        let (side, _) = gapped_left();
        let patch = generator(side.len()).generate(&side, 7, 3).unwrap();
        assert!(patch.is_empty());
        assert_eq!(patch.status, PatchStatus::PointCountCapReached);
        assert_eq!(patch.normalized_errors.len(), 1);
    }

    #[test]
    fn test_regular_interval_gets_no_points() {
        let (side, _) = gapped_left();
        let patch = generator(34).generate(&side, 2, 0).unwrap();
        assert!(patch.is_empty());
        assert_eq!(patch.status, PatchStatus::NoImprovementFound);
    }

    #[test]
    fn test_search_respects_cap_with_permissive_specificity() {
        let (side, _) = gapped_left();
        for cap in 16..=22 {
            let patch = PatchGenerator::new(CurveFitter::new(5, 2), -10.0, cap)
                .generate(&side, 7, 0)
                .unwrap();
            assert!(side.len() + patch.len() <= cap);
            assert!(patch.normalized_errors.len() <= cap - side.len() + 1);
        }
    }

    #[test]
    fn test_grow_and_shrink() {
        let (side, _) = gapped_left();
        let generator = generator(34);
        let patch = generator.generate(&side, 7, 1).unwrap();

        let grown = generator.grow(&side, &patch).unwrap();
        assert_eq!(grown.len(), 2);
        assert_eq!(grown.points[1].label, "SubPatch-1_Point-1");
        assert!(grown.points[0].z > grown.points[1].z);
        assert_relative_eq!(grown.points[0].z, -175.0 - 50.0 / 3.0, epsilon = 1e-9);

        let shrunk = generator.shrink(&side, &grown).unwrap();
        assert_eq!(shrunk.points, patch.points);
        let empty = generator.shrink(&side, &shrunk).unwrap();
        assert!(empty.is_empty());

        let capped = generator
            .with_max_side_points(17)
            .resize(&side, &patch, 4)
            .unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped.status, PatchStatus::PointCountCapReached);
    }

    #[test]
    fn test_resize_after_side_changed() {
        let (side, _) = gapped_left();
        let generator = generator(34);
        let patch = generator.generate(&side, 7, 0).unwrap();
        let applied = side.apply_patch(&patch).unwrap();
        assert!(generator.grow(&applied, &patch).is_err());
    }

    #[test]
    fn test_patches_applied_one_after_another_keep_labels_unique() {
        let (left, _) = synthetic_spine(17, 25.0, 30.0, 8.0);
        let side0 = left.remove_labels(&["T5L", "L1L"]);
        let generator = generator(34);

        // T4L..T6L
        let first = generator.generate(&side0, 3, 0).unwrap();
        let first = generator.resize(&side0, &first, 1).unwrap();
        assert_eq!(first.points[0].label, "SubPatch-0_Point-0");
        let side1 = side0.apply_patch(&first).unwrap();
        assert!(side1.apply_patch(&first).is_err());

        // T12L..L2L, asked for the index the first patch already used
        let second = generator.generate(&side1, 11, 0).unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(second.upper_label, "T12L");
        assert_eq!(second.lower_label, "L2L");
        let second = generator.resize(&side1, &second, 1).unwrap();
        let side2 = side1.apply_patch(&second).unwrap();
        assert_eq!(side2.len(), 17);
        let mut labels: Vec<&str> = side2.points().iter().map(|p| p.label.as_str()).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), 17);

        let grown = generator.grow(&side1, &second).unwrap();
        assert_eq!(grown.len(), 2);
        assert_eq!(grown.points[1].label, "SubPatch-1_Point-1");

        // a patch bounded by a synthesized point can still be edited
        let bound = side2
            .points()
            .iter()
            .position(|p| p.label == "SubPatch-1_Point-0")
            .unwrap();
        let third = generator.generate(&side2, bound, 0).unwrap();
        assert_eq!(third.index, 2);
        let third = generator.resize(&side2, &third, 1).unwrap();
        assert_eq!(third.upper_label, "SubPatch-1_Point-0");
        assert_eq!(third.lower_label, "L2L");
        assert_eq!(third.points[0].label, "SubPatch-2_Point-0");
        assert!(side2.apply_patch(&third).is_ok());
    }

    #[test]
    fn test_invalid_interval() {
        let (side, _) = gapped_left();
        let err = generator(34).generate(&side, 15, 0).unwrap_err();
        assert!(matches!(
            err,
            LandmarkError::InvalidParameter {
                name: "interval",
                ..
            }
        ));
    }
}
