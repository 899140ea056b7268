//! Left/right side classification of unlabeled landmarks.
//!
//! Landmarks are sorted top first and a window of `window_size` consecutive
//! points slides down the spine one point at a time. Each window is split in
//! two by [`kmeans::two_means`] and every member receives a vote for the side
//! of its cluster. The majority vote decides the final side.

pub mod kmeans;

use nalgebra::Vector3;
use tracing::{debug, warn};

use crate::config::{RepairParams, TiePolicy};
use crate::error::{LandmarkError, Result};
use crate::landmarks::{sort_top_down, LandmarkPoint, OrderedSide, Side};
use kmeans::two_means;

const SPAN_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeftRightClassifier {
    pub window_size: usize,
    pub tie_policy: TiePolicy,
}

impl LeftRightClassifier {
    pub fn new(window_size: u32) -> Self {
        Self {
            window_size: window_size as usize,
            tie_policy: TiePolicy::default(),
        }
    }

    pub fn from_params(params: &RepairParams) -> Self {
        Self {
            window_size: params.km_window_size as usize,
            tie_policy: params.tie_policy,
        }
    }

    pub fn with_tie_policy(mut self, tie_policy: TiePolicy) -> Self {
        self.tie_policy = tie_policy;
        self
    }

    /// Splits `points` into (left, right). Every input point lands in exactly one side.
    pub fn classify(&self, points: &[LandmarkPoint]) -> Result<(OrderedSide, OrderedSide)> {
        if self.window_size < 2 {
            return Err(LandmarkError::invalid(
                "km_window_size",
                self.window_size,
                "a window needs at least two points",
            ));
        }
        if points.len() < self.window_size {
            return Err(LandmarkError::InsufficientData {
                context: "left/right classification",
                needed: self.window_size,
                found: points.len(),
            });
        }

        let mut sorted = points.to_vec();
        sort_top_down(&mut sorted);

        // (left, right) votes per sorted point
        let mut votes = vec![(0u32, 0u32); sorted.len()];
        for (start, window) in sorted.windows(self.window_size).enumerate() {
            let km = two_means(&normalize_window(window))?;
            let left_cluster = km.lateral_min_cluster();
            for (offset, &cluster) in km.assignments.iter().enumerate() {
                if cluster == left_cluster {
                    votes[start + offset].0 += 1;
                } else {
                    votes[start + offset].1 += 1;
                }
            }
            debug!(
                "window {}: {} iterations, centroids x = ({:.1}, {:.1})",
                start, km.iterations, km.centroids[0].x, km.centroids[1].x
            );
        }

        let mean_x = sorted.iter().map(|p| p.x).sum::<f64>() / sorted.len() as f64;
        let mut left = Vec::new();
        let mut right = Vec::new();
        for (point, (left_votes, right_votes)) in sorted.into_iter().zip(votes) {
            let side = if left_votes > right_votes {
                Side::Left
            } else if right_votes > left_votes {
                Side::Right
            } else {
                self.break_tie(&point, left_votes, right_votes, mean_x)?
            };
            match side {
                Side::Left => left.push(point),
                Side::Right => right.push(point),
            }
        }

        debug!("classified {} left and {} right landmarks", left.len(), right.len());
        Ok((
            OrderedSide::new(Side::Left, left),
            OrderedSide::new(Side::Right, right),
        ))
    }

    fn break_tie(
        &self,
        point: &LandmarkPoint,
        left_votes: u32,
        right_votes: u32,
        mean_x: f64,
    ) -> Result<Side> {
        match self.tie_policy {
            TiePolicy::Reject => Err(LandmarkError::AmbiguousClassification {
                label: point.label.clone(),
                left_votes,
                right_votes,
            }),
            TiePolicy::LateralSign => {
                let side = if point.x < mean_x {
                    Side::Left
                } else {
                    Side::Right
                };
                warn!(
                    "landmark '{}' tied at {} votes per side, assigned {} by lateral position",
                    point.label, left_votes, side
                );
                Ok(side)
            }
        }
    }
}

/// Copies the window with the superior-inferior and anterior-posterior axes
/// compressed to at most the window's lateral span, so the clustering
/// separates sides instead of top from bottom.
fn normalize_window(window: &[LandmarkPoint]) -> Vec<Vector3<f64>> {
    let span = |f: fn(&LandmarkPoint) -> f64| {
        let (lo, hi) = window
            .iter()
            .map(f)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        hi - lo
    };
    let width = span(|p: &LandmarkPoint| p.x);
    let depth = span(|p: &LandmarkPoint| p.y);
    let height = span(|p: &LandmarkPoint| p.z);

    let compress = |extent: f64| {
        if extent > SPAN_EPS && width > SPAN_EPS {
            (width / extent).min(1.0)
        } else {
            1.0
        }
    };
    let ap_factor = compress(depth);
    let si_factor = compress(height);

    window
        .iter()
        .map(|p| Vector3::new(p.x, p.y * ap_factor, p.z * si_factor))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::parse_label;
    use crate::utils::test_utils::{interleave, synthetic_spine};

    fn three_pairs() -> Vec<LandmarkPoint> {
        let mut points = Vec::new();
        for level in 0..3 {
            let z = -50.0 * level as f64;
            let y = 5.0 * level as f64;
            points.push(LandmarkPoint::new(format!("a{}", level), -30.0, y, z));
            points.push(LandmarkPoint::new(format!("b{}", level), 30.0, y, z));
        }
        points
    }

    #[test]
    fn test_three_clear_pairs() {
        let (left, right) = LeftRightClassifier::new(4).classify(&three_pairs()).unwrap();
        assert_eq!(left.len(), 3);
        assert_eq!(right.len(), 3);
        assert!(left.points().iter().all(|p| p.x < 0.0));
        assert!(right.points().iter().all(|p| p.x > 0.0));
        assert_eq!(left.side, Side::Left);
        assert_eq!(left.points()[0].label, "a0");
        assert_eq!(right.points()[2].label, "b2");
    }

    #[test]
    fn test_classification_is_deterministic() {
        let (l, r) = synthetic_spine(17, 25.0, 28.0, 12.0);
        let points = interleave(&l, &r);
        let classifier = LeftRightClassifier::new(6);
        let first = classifier.classify(&points).unwrap();
        for _ in 0..5 {
            assert_eq!(classifier.classify(&points).unwrap(), first);
        }
    }

    #[test]
    fn test_classification_partitions_input() {
        let (l, r) = synthetic_spine(17, 25.0, 28.0, 12.0);
        let mut points = interleave(&l, &r);
        // drop a few landmarks so the sides are unequal
        points.retain(|p| p.label != "T4L" && p.label != "L2R" && p.label != "T9L");

        for window in 2..=12 {
            let (left, right) = LeftRightClassifier::new(window).classify(&points).unwrap();
            assert_eq!(left.len() + right.len(), points.len());
            let mut labels: Vec<&str> = left
                .points()
                .iter()
                .chain(right.points())
                .map(|p| p.label.as_str())
                .collect();
            labels.sort();
            labels.dedup();
            assert_eq!(labels.len(), points.len());
        }

        let (left, right) = LeftRightClassifier::new(4).classify(&points).unwrap();
        assert!(left
            .points()
            .iter()
            .all(|p| parse_label(&p.label).map(|(_, s)| s) == Some(Side::Left)));
        assert!(right
            .points()
            .iter()
            .all(|p| parse_label(&p.label).map(|(_, s)| s) == Some(Side::Right)));
    }

    #[test]
    fn test_too_few_points() {
        let points = three_pairs();
        let err = LeftRightClassifier::new(8).classify(&points).unwrap_err();
        assert!(matches!(
            err,
            LandmarkError::InsufficientData {
                needed: 8,
                found: 6,
                ..
            }
        ));
        assert!(LeftRightClassifier::new(1).classify(&points).is_err());
    }

    fn diagonal() -> Vec<LandmarkPoint> {
        vec![
            LandmarkPoint::new("a", -10.0, 0.0, 0.0),
            LandmarkPoint::new("b", 0.0, 0.0, -1.0),
            LandmarkPoint::new("c", 10.0, 0.0, -2.0),
        ]
    }

    #[test]
    fn test_tie_policies() {
        // "b" is right of "a" in the first window and left of "c" in the second
        let (left, right) = LeftRightClassifier::new(2).classify(&diagonal()).unwrap();
        assert_eq!(left.len(), 1);
        assert!(right.contains_label("b"));

        let err = LeftRightClassifier::new(2)
            .with_tie_policy(TiePolicy::Reject)
            .classify(&diagonal())
            .unwrap_err();
        assert_eq!(
            err,
            LandmarkError::AmbiguousClassification {
                label: "b".to_string(),
                left_votes: 1,
                right_votes: 1
            }
        );
    }

    #[test]
    fn test_normalize_window_compresses_tall_windows() {
        let window = vec![
            LandmarkPoint::new("a", -30.0, 0.0, 0.0),
            LandmarkPoint::new("b", 30.0, 0.0, -120.0),
        ];
        let normalized = normalize_window(&window);
        assert_eq!(normalized[1].z, -60.0);
        assert_eq!(normalized[1].y, 0.0);
    }
}
