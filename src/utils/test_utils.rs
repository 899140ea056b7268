use crate::landmarks::{vertebra_label, LandmarkPoint, OrderedSide, Side, COMPLETE_SIDE_POINTS};
use std::f64::consts::PI;

/// Builds a smooth bilateral spine with `levels` evenly spaced vertebrae.
///
/// The centerline bows laterally by `bow` mm (half sine over the spine) and
/// carries a small anterior-posterior curve; left points sit `half_width` mm
/// to the negative lateral side, right points to the positive side.
pub fn synthetic_spine(
    levels: usize,
    spacing: f64,
    half_width: f64,
    bow: f64,
) -> (OrderedSide, OrderedSide) {
    assert!(levels >= 2 && levels <= COMPLETE_SIDE_POINTS);
    let mut left = Vec::with_capacity(levels);
    let mut right = Vec::with_capacity(levels);
    for i in 0..levels {
        let t = i as f64 / (levels - 1) as f64;
        let z = -spacing * i as f64;
        let cx = bow * (PI * t).sin();
        let cy = 20.0 * t * (1.0 - t);
        left.push(LandmarkPoint::new(
            vertebra_label(i, Side::Left),
            cx - half_width,
            cy,
            z,
        ));
        right.push(LandmarkPoint::new(
            vertebra_label(i, Side::Right),
            cx + half_width,
            cy,
            z,
        ));
    }
    (
        OrderedSide::new(Side::Left, left),
        OrderedSide::new(Side::Right, right),
    )
}

/// Left/right pairs whose connecting lines have the given coronal tilts (degrees),
/// one level every 40 mm.
pub fn tilted_levels(tilts_deg: &[f64], half_width: f64) -> (OrderedSide, OrderedSide) {
    let mut left = Vec::with_capacity(tilts_deg.len());
    let mut right = Vec::with_capacity(tilts_deg.len());
    for (i, tilt) in tilts_deg.iter().enumerate() {
        let theta = tilt.to_radians();
        let z = -40.0 * i as f64;
        let dx = half_width * theta.cos();
        let dz = half_width * theta.sin();
        left.push(LandmarkPoint::new(
            vertebra_label(i, Side::Left),
            -dx,
            0.0,
            z - dz,
        ));
        right.push(LandmarkPoint::new(
            vertebra_label(i, Side::Right),
            dx,
            0.0,
            z + dz,
        ));
    }
    (
        OrderedSide::new(Side::Left, left),
        OrderedSide::new(Side::Right, right),
    )
}

/// All points of both sides, interleaved level by level.
pub fn interleave(left: &OrderedSide, right: &OrderedSide) -> Vec<LandmarkPoint> {
    left.points()
        .iter()
        .zip(right.points())
        .flat_map(|(l, r)| [l.clone(), r.clone()])
        .collect()
}
