//! Detection and imputation of missing landmarks.
//!
//! Steps must run in order: classify, fit, detect, patch. Every mutation of a
//! side (patch applied, points removed) invalidates its curve model, so the
//! pipeline refits before each detection.

pub mod omission;
pub mod patch;

use std::collections::BTreeSet;
use tracing::info;

use crate::classify::LeftRightClassifier;
use crate::config::RepairParams;
use crate::error::Result;
use crate::fitting::CurveFitter;
use crate::landmarks::{LandmarkPoint, OrderedSide};
pub use omission::OmissionDetector;
pub use patch::{Patch, PatchGenerator, PatchStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct RepairOutcome {
    pub left: OrderedSide,
    pub right: OrderedSide,
    /// Every patch that was generated, including empty ones.
    pub patches: Vec<Patch>,
    pub flagged_left: BTreeSet<usize>,
    pub flagged_right: BTreeSet<usize>,
}

impl RepairOutcome {
    pub fn added_points(&self) -> usize {
        self.patches.iter().map(Patch::len).sum()
    }
}

/// Splits an unlabeled point set into sides and fills detected gaps on both.
pub fn repair_landmarks(points: &[LandmarkPoint], params: &RepairParams) -> Result<RepairOutcome> {
    params.validate()?;
    let (left, right) = LeftRightClassifier::from_params(params).classify(points)?;

    let mut next_patch_index = 0;
    let (left, mut patches, flagged_left) = repair_side(&left, params, &mut next_patch_index)?;
    let (right, right_patches, flagged_right) = repair_side(&right, params, &mut next_patch_index)?;
    patches.extend(right_patches);

    let outcome = RepairOutcome {
        left,
        right,
        patches,
        flagged_left,
        flagged_right,
    };
    info!(
        "repaired landmarks: {} left, {} right, {} point(s) imputed",
        outcome.left.len(),
        outcome.right.len(),
        outcome.added_points()
    );
    Ok(outcome)
}

/// Fits, detects and patches one side.
///
/// Patches are generated against the unpatched side and share its point cap;
/// `next_patch_index` numbers them across calls.
pub fn repair_side(
    side: &OrderedSide,
    params: &RepairParams,
    next_patch_index: &mut usize,
) -> Result<(OrderedSide, Vec<Patch>, BTreeSet<usize>)> {
    let model = CurveFitter::from_params(params).fit(side)?;
    let flagged = OmissionDetector::from_params(params).detect(&model, &model.spacing);
    info!("{} side: flagged intervals {:?}", side.side, flagged);

    let generator = PatchGenerator::from_params(params);
    let max_side = params.max_side_points();
    let mut added = 0;
    let mut patches = Vec::with_capacity(flagged.len());
    for &interval in &flagged {
        let patch = generator
            .with_max_side_points(max_side.saturating_sub(added))
            .generate(side, interval, *next_patch_index)?;
        *next_patch_index = patch.index + 1;
        added += patch.len();
        patches.push(patch);
    }

    let repaired = patches
        .iter()
        .try_fold(side.clone(), |acc, patch| acc.apply_patch(patch))?;
    Ok((repaired, patches, flagged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{interleave, synthetic_spine};

    #[test]
    fn test_complete_spine_is_untouched() {
        let (l, r) = synthetic_spine(17, 25.0, 30.0, 8.0);
        let outcome = repair_landmarks(&interleave(&l, &r), &RepairParams::default()).unwrap();
        assert_eq!(outcome.left, l);
        assert_eq!(outcome.right, r);
        assert!(outcome.patches.is_empty());
        assert!(outcome.flagged_left.is_empty() && outcome.flagged_right.is_empty());
    }

    #[test]
    fn test_repairs_gaps_on_both_sides() {
        let (l, r) = synthetic_spine(17, 25.0, 30.0, 8.0);
        let mut points = interleave(&l, &r);
        points.retain(|p| p.label != "T9L" && p.label != "L2R");

        let outcome = repair_landmarks(&points, &RepairParams::default()).unwrap();
        assert_eq!(outcome.left.len(), 17);
        assert_eq!(outcome.right.len(), 17);
        assert!(outcome.flagged_left.contains(&7));
        assert!(outcome.flagged_right.contains(&12));
        assert_eq!(outcome.added_points(), 2);

        let filled: Vec<&Patch> = outcome.patches.iter().filter(|p| !p.is_empty()).collect();
        assert_eq!(filled.len(), 2);
        assert_eq!(filled[0].upper_label, "T8L");
        assert_eq!(filled[1].upper_label, "L1R");
        assert!(filled[1].points[0].label.starts_with("SubPatch-"));
        assert_ne!(filled[0].index, filled[1].index);

        let original_t9 = l.points().iter().find(|p| p.label == "T9L").unwrap();
        assert!(filled[0].points[0].distance_to(original_t9) < 1.5);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let (l, r) = synthetic_spine(17, 25.0, 30.0, 8.0);
        let params = RepairParams {
            km_window_size: 20,
            ..RepairParams::default()
        };
        assert!(repair_landmarks(&interleave(&l, &r), &params).is_err());
    }
}
