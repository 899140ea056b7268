use serde::{Deserialize, Serialize};

use crate::error::{LandmarkError, Result};
use crate::landmarks::{pair_levels, LevelPair, OrderedSide};

const TILT_EPS: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CobbAngle {
    pub angle_deg: f64,
    /// Index (into `tilts_deg`) of the upper extremal level.
    pub top_level: usize,
    pub bottom_level: usize,
    pub top_name: String,
    pub bottom_name: String,
    /// Coronal tilt of every paired level, top first.
    pub tilts_deg: Vec<f64>,
}

/// Coronal-plane tilt (degrees) of the line from the left to the right landmark.
/// Positive when the right landmark sits higher.
pub fn coronal_tilt(pair: &LevelPair) -> Result<f64> {
    let dx = pair.right.x - pair.left.x;
    let dz = pair.right.z - pair.left.z;
    let extent = dx.hypot(dz);
    if extent <= TILT_EPS {
        return Err(LandmarkError::DegenerateGeometry(format!(
            "left and right landmarks of level '{}' coincide in the coronal plane",
            pair.left.label
        )));
    }
    Ok((dz / extent).asin().to_degrees())
}

/// Difference between the most and least tilted levels.
pub fn cobb_angle(left: &OrderedSide, right: &OrderedSide) -> Result<CobbAngle> {
    let pairs = pair_levels(left, right)?;
    if pairs.len() < 2 {
        return Err(LandmarkError::InsufficientData {
            context: "Cobb angle",
            needed: 2,
            found: pairs.len(),
        });
    }
    let tilts = pairs.iter().map(coronal_tilt).collect::<Result<Vec<f64>>>()?;

    let mut idx_max = 0;
    let mut idx_min = 0;
    for (i, &tilt) in tilts.iter().enumerate() {
        if tilt > tilts[idx_max] {
            idx_max = i;
        }
        if tilt < tilts[idx_min] {
            idx_min = i;
        }
    }
    let top = idx_max.min(idx_min);
    let bottom = idx_max.max(idx_min);

    Ok(CobbAngle {
        angle_deg: tilts[idx_max] - tilts[idx_min],
        top_level: top,
        bottom_level: bottom,
        top_name: pairs[top].name(top),
        bottom_name: pairs[bottom].name(bottom),
        tilts_deg: tilts,
    })
}
