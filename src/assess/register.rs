//! Alignment and length matching of the reference spine to a patient.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::reference::{Mesh, ReferenceModel};
use crate::error::{LandmarkError, Result};
use crate::fitting::{Centerline, Domain};
use crate::landmarks::{pair_levels, LandmarkPoint, OrderedSide};

const LENGTH_EPS: f64 = 1e-9;

/// Centerline through the midpoints of paired levels.
#[derive(Debug, Clone, PartialEq)]
pub struct Midline {
    pub centerline: Centerline,
    pub s_top: f64,
    pub s_bottom: f64,
    pub levels: usize,
}

impl Midline {
    /// Fits both axes with degree `min(degree, levels - 1)`; `domain`
    /// defaults to the span of the midpoints.
    pub fn fit(
        left: &OrderedSide,
        right: &OrderedSide,
        degree: usize,
        domain: Option<Domain>,
    ) -> Result<Self> {
        let midpoints: Vec<Vector3<f64>> = pair_levels(left, right)?
            .iter()
            .map(|pair| pair.midpoint())
            .collect();
        if midpoints.len() < 2 {
            return Err(LandmarkError::InsufficientData {
                context: "spine midline",
                needed: 2,
                found: midpoints.len(),
            });
        }
        let s: Vec<f64> = midpoints.iter().map(|m| m.z).collect();
        let x: Vec<f64> = midpoints.iter().map(|m| m.x).collect();
        let y: Vec<f64> = midpoints.iter().map(|m| m.y).collect();
        let degree = degree.min(midpoints.len() - 1);
        let domain = domain.unwrap_or_else(|| Domain::from_samples(&s));

        Ok(Self {
            centerline: Centerline::fit(&s, &x, &y, degree, domain)?,
            s_top: s.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            s_bottom: s.iter().copied().fold(f64::INFINITY, f64::min),
            levels: midpoints.len(),
        })
    }

    pub fn sampled_length(&self, samples: usize) -> f64 {
        self.centerline
            .sampled_length(self.s_top, self.s_bottom, samples)
    }
}

/// Reference landmarks (and mesh) moved onto the patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredReference {
    pub left: OrderedSide,
    pub right: OrderedSide,
    pub mesh: Option<Mesh>,
    /// Base alignment applied before scaling.
    pub translation: [f64; 3],
    /// Patient midline length over reference midline length.
    pub scale_factor: f64,
}

/// Average of the lowest landmark of each side.
pub fn base_center(left: &OrderedSide, right: &OrderedSide) -> Result<Vector3<f64>> {
    match (left.bottom(), right.bottom()) {
        (Some(l), Some(r)) => Ok((l.position() + r.position()) * 0.5),
        _ => Err(LandmarkError::MismatchedSides {
            left: left.len(),
            right: right.len(),
        }),
    }
}

/// Translates the reference so the base centers coincide, then slides every
/// reference landmark along the reference midline, away from or toward its
/// middle in proportion to its arc distance from it, until the midline length
/// matches the patient's. The base is re-anchored after sliding.
///
/// Mesh vertices follow the displacement of their nearest reference landmark.
pub fn register_reference(
    left: &OrderedSide,
    right: &OrderedSide,
    reference: &ReferenceModel,
    degree: usize,
    samples: usize,
) -> Result<RegisteredReference> {
    let patient_base = base_center(left, right)?;
    let translation = patient_base - base_center(&reference.left, &reference.right)?;
    let aligned_left = reference.left.translated(&translation);
    let aligned_right = reference.right.translated(&translation);

    let patient = Midline::fit(left, right, degree, None)?;
    let aligned = Midline::fit(&aligned_left, &aligned_right, degree, None)?;
    let patient_length = patient.sampled_length(samples);
    let reference_length = aligned.sampled_length(samples);
    if reference_length <= LENGTH_EPS {
        return Err(LandmarkError::DegenerateGeometry(
            "reference midline has zero length".to_string(),
        ));
    }
    let scale_factor = patient_length / reference_length;
    debug!(
        "registering reference: translation ({:.2}, {:.2}, {:.2}), length {:.1} -> {:.1} mm",
        translation.x, translation.y, translation.z, reference_length, patient_length
    );

    let cl = &aligned.centerline;
    let mid_arc = cl.arc_length(aligned.s_top, aligned.s_bottom) / 2.0;
    let slide = |point: &LandmarkPoint| -> Vector3<f64> {
        if (scale_factor - 1.0).abs() < 1e-12 {
            return Vector3::zeros();
        }
        let arc = cl.signed_arc(aligned.s_top, point.z);
        let target = mid_arc + (arc - mid_arc) * scale_factor;
        let s = cl.s_at_arc(aligned.s_top, target);
        cl.point_at(s) - cl.point_at(point.z)
    };

    let displaced: Vec<(Vector3<f64>, Vector3<f64>)> = aligned_left
        .points()
        .iter()
        .chain(aligned_right.points())
        .map(|p| (p.position(), slide(p)))
        .collect();
    let (left_moves, right_moves) = displaced.split_at(aligned_left.len());

    let moved = |side: &OrderedSide, moves: &[(Vector3<f64>, Vector3<f64>)]| {
        let points = side
            .points()
            .iter()
            .zip(moves)
            .map(|(p, (_, d))| p.translated(d))
            .collect();
        OrderedSide::new(side.side, points)
    };
    let scaled_left = moved(&aligned_left, left_moves);
    let scaled_right = moved(&aligned_right, right_moves);

    let anchor = patient_base - base_center(&scaled_left, &scaled_right)?;
    let scaled_left = scaled_left.translated(&anchor);
    let scaled_right = scaled_right.translated(&anchor);

    let mesh = reference.mesh.as_ref().map(|mesh| {
        let mut aligned = mesh.translated(&translation);
        for idx in 0..aligned.vertices.len() {
            let v = aligned.vertex(idx);
            let moved = v + nearest_displacement(&displaced, &v) + anchor;
            aligned.vertices[idx] = [moved.x, moved.y, moved.z];
        }
        aligned
    });

    Ok(RegisteredReference {
        left: scaled_left,
        right: scaled_right,
        mesh,
        translation: [translation.x, translation.y, translation.z],
        scale_factor,
    })
}

fn nearest_displacement(
    displaced: &[(Vector3<f64>, Vector3<f64>)],
    vertex: &Vector3<f64>,
) -> Vector3<f64> {
    let mut min_distance_squared = f64::MAX;
    let mut closest = Vector3::zeros();
    for (position, displacement) in displaced {
        let distance_squared = (position - vertex).norm_squared();
        if distance_squared < min_distance_squared {
            min_distance_squared = distance_squared;
            closest = *displacement;
        }
    }
    closest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::synthetic_spine;
    use approx::assert_relative_eq;

    fn reference() -> ReferenceModel {
        let (l, r) = synthetic_spine(17, 25.0, 30.0, 0.0);
        ReferenceModel::new(l, r, None)
    }

    #[test]
    fn test_identical_patient_is_left_in_place() {
        let reference = reference();
        let registered =
            register_reference(&reference.left, &reference.right, &reference, 4, 100).unwrap();
        assert_eq!(registered.translation, [0.0, 0.0, 0.0]);
        assert_eq!(registered.scale_factor, 1.0);
        assert_eq!(registered.left, reference.left);
        assert_eq!(registered.right, reference.right);
    }

    #[test]
    fn test_translated_patient_moves_reference_and_mesh() {
        let mut reference = reference();
        reference.mesh = Some(
            Mesh::new(
                vec![[0.0, 0.0, 0.0], [-30.0, 0.0, -400.0], [30.0, 0.0, -200.0]],
                vec![[0, 1, 2]],
            )
            .unwrap(),
        );
        let offset = Vector3::new(5.0, -3.0, 120.0);
        let left = reference.left.translated(&offset);
        let right = reference.right.translated(&offset);

        let registered = register_reference(&left, &right, &reference, 4, 100).unwrap();
        assert_relative_eq!(registered.translation[0], 5.0, epsilon = 1e-9);
        assert_relative_eq!(registered.translation[2], 120.0, epsilon = 1e-9);
        assert_relative_eq!(registered.scale_factor, 1.0, epsilon = 1e-9);
        for (a, b) in registered.left.points().iter().zip(left.points()) {
            assert!(a.distance_to(b) < 1e-6);
        }

        let mesh = registered.mesh.unwrap();
        assert_relative_eq!(mesh.vertices[1][0], -25.0, epsilon = 1e-6);
        assert_relative_eq!(mesh.vertices[1][2], -280.0, epsilon = 1e-6);
        assert_eq!(mesh.triangles, vec![[0, 1, 2]]);
    }

    #[test]
    fn test_stretched_patient_lengthens_reference() {
        let reference = reference();
        let stretch = |side: &OrderedSide| {
            let points = side
                .points()
                .iter()
                .map(|p| LandmarkPoint::new(p.label.clone(), p.x, p.y, p.z * 1.1))
                .collect();
            OrderedSide::new(side.side, points)
        };
        let left = stretch(&reference.left);
        let right = stretch(&reference.right);

        let registered = register_reference(&left, &right, &reference, 4, 100).unwrap();
        assert!(registered.scale_factor > 1.05);

        let patient = Midline::fit(&left, &right, 4, None).unwrap();
        let scaled = Midline::fit(&registered.left, &registered.right, 4, None).unwrap();
        assert_relative_eq!(
            scaled.sampled_length(100),
            patient.sampled_length(100),
            max_relative = 0.01
        );
        // the base stays on the patient's base
        let base = base_center(&registered.left, &registered.right).unwrap();
        assert!((base - base_center(&left, &right).unwrap()).norm() < 1e-9);
        // relative order of the levels is preserved
        let labels: Vec<&str> = registered.left.points().iter().map(|p| p.label.as_str()).collect();
        let expected: Vec<&str> =
            reference.left.points().iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, expected);
    }
}
