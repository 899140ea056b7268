//! Landmark point model shared by the repair and assessment modules.
//!
//! Coordinates follow the anatomical frame of the host scene: `x` is the
//! lateral (left-right) axis, `y` the anterior-posterior axis and `z` the
//! superior-inferior axis. Sides are ordered top of the spine first, i.e. by
//! descending `z`.

pub mod levels;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use tracing::warn;

use crate::error::{LandmarkError, Result};
use crate::repair::patch::Patch;
pub use levels::{
    parse_label, parse_patch_label, patch_point_label, vertebra_label, COMPLETE_SIDE_POINTS,
    VERTEBRA_LEVELS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn suffix(self) -> char {
        match self {
            Side::Left => 'L',
            Side::Right => 'R',
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl LandmarkPoint {
    pub fn new(label: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            label: label.into(),
            x,
            y,
            z,
        }
    }

    pub fn from_position(label: impl Into<String>, position: Vector3<f64>) -> Self {
        Self::new(label, position.x, position.y, position.z)
    }

    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn distance_to(&self, other: &LandmarkPoint) -> f64 {
        (self.position() - other.position()).norm()
    }

    pub fn translated(&self, offset: &Vector3<f64>) -> LandmarkPoint {
        LandmarkPoint::from_position(self.label.clone(), self.position() + offset)
    }
}

/// Sorts by descending superior-inferior coordinate, keeping input order for equal heights.
pub(crate) fn sort_top_down(points: &mut [LandmarkPoint]) {
    points.sort_by(|a, b| b.z.partial_cmp(&a.z).unwrap_or(Ordering::Equal));
}

/// Landmarks of one side, top of the spine first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedSide {
    pub side: Side,
    points: Vec<LandmarkPoint>,
}

impl OrderedSide {
    pub fn new(side: Side, mut points: Vec<LandmarkPoint>) -> Self {
        sort_top_down(&mut points);
        Self { side, points }
    }

    pub fn points(&self) -> &[LandmarkPoint] {
        &self.points
    }

    pub fn into_points(self) -> Vec<LandmarkPoint> {
        self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of gaps between consecutive points.
    pub fn interval_count(&self) -> usize {
        self.points.len().saturating_sub(1)
    }

    pub fn top(&self) -> Option<&LandmarkPoint> {
        self.points.first()
    }

    pub fn bottom(&self) -> Option<&LandmarkPoint> {
        self.points.last()
    }

    pub fn z_values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.z).collect()
    }

    pub fn contains_label(&self, label: &str) -> bool {
        self.points.iter().any(|p| p.label == label)
    }

    /// Merges an accepted patch into the side. The patch is consumed by the
    /// caller afterwards; any curve model of this side is stale from here on.
    ///
    /// Fails if a patch point's label is already on the side, e.g. when the
    /// same patch is applied twice.
    pub fn apply_patch(&self, patch: &Patch) -> Result<OrderedSide> {
        if let Some(taken) = patch.points.iter().find(|p| self.contains_label(&p.label)) {
            return Err(LandmarkError::invalid(
                "patch point label",
                &taken.label,
                "label already present on this side",
            ));
        }
        let mut points = self.points.clone();
        points.extend(patch.points.iter().cloned());
        Ok(OrderedSide::new(self.side, points))
    }

    /// One past the highest sub-patch index among the side's synthesized points.
    pub fn next_patch_index(&self) -> usize {
        self.points
            .iter()
            .filter_map(|p| parse_patch_label(&p.label))
            .map(|(patch, _)| patch + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn remove_labels(&self, labels: &[&str]) -> OrderedSide {
        let points = self
            .points
            .iter()
            .filter(|p| !labels.contains(&p.label.as_str()))
            .cloned()
            .collect();
        OrderedSide::new(self.side, points)
    }

    pub fn translated(&self, offset: &Vector3<f64>) -> OrderedSide {
        OrderedSide {
            side: self.side,
            points: self.points.iter().map(|p| p.translated(offset)).collect(),
        }
    }

    /// Renames a complete side to the canonical `T1L`..`L5L` (or `..R`) labels.
    pub fn with_vertebra_labels(&self) -> Result<OrderedSide> {
        if self.points.len() != COMPLETE_SIDE_POINTS {
            return Err(LandmarkError::InsufficientData {
                context: "canonical vertebra labelling",
                needed: COMPLETE_SIDE_POINTS,
                found: self.points.len(),
            });
        }
        let points = self
            .points
            .iter()
            .enumerate()
            .map(|(level, p)| LandmarkPoint {
                label: vertebra_label(level, self.side),
                ..p.clone()
            })
            .collect();
        Ok(OrderedSide {
            side: self.side,
            points,
        })
    }
}

/// One vertebra level: the left and right landmark at the same height.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelPair {
    /// Index into [`VERTEBRA_LEVELS`] when both labels name a vertebra.
    pub level: Option<usize>,
    pub left: LandmarkPoint,
    pub right: LandmarkPoint,
}

impl LevelPair {
    pub fn midpoint(&self) -> Vector3<f64> {
        (self.left.position() + self.right.position()) * 0.5
    }

    pub fn name(&self, index: usize) -> String {
        match self.level {
            Some(level) => VERTEBRA_LEVELS[level].to_string(),
            None => format!("level-{}", index),
        }
    }
}

/// Pairs left and right landmarks level by level, top first.
///
/// Labels are matched by vertebra name when every label on both sides parses;
/// otherwise points are paired by order over the shorter side.
pub fn pair_levels(left: &OrderedSide, right: &OrderedSide) -> Result<Vec<LevelPair>> {
    if left.is_empty() || right.is_empty() {
        return Err(LandmarkError::MismatchedSides {
            left: left.len(),
            right: right.len(),
        });
    }

    let left_levels: Option<Vec<usize>> = left
        .points()
        .iter()
        .map(|p| parse_label(&p.label).map(|(level, _)| level))
        .collect();
    let right_levels: Option<Vec<usize>> = right
        .points()
        .iter()
        .map(|p| parse_label(&p.label).map(|(level, _)| level))
        .collect();

    if let (Some(left_levels), Some(right_levels)) = (left_levels, right_levels) {
        let mut pairs: Vec<LevelPair> = left_levels
            .iter()
            .zip(left.points())
            .filter_map(|(level, lp)| {
                right_levels
                    .iter()
                    .position(|l| l == level)
                    .map(|idx| LevelPair {
                        level: Some(*level),
                        left: lp.clone(),
                        right: right.points()[idx].clone(),
                    })
            })
            .collect();
        if !pairs.is_empty() {
            pairs.sort_by_key(|p| p.level);
            return Ok(pairs);
        }
    }

    if left.len() != right.len() {
        warn!(
            "pairing {} left and {} right landmarks by order, unmatched points are ignored",
            left.len(),
            right.len()
        );
    }
    Ok(left
        .points()
        .iter()
        .zip(right.points())
        .map(|(l, r)| LevelPair {
            level: None,
            left: l.clone(),
            right: r.clone(),
        })
        .collect())
}
