use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{LandmarkError, Result};
use crate::landmarks::{parse_label, LandmarkPoint, OrderedSide, Side, COMPLETE_SIDE_POINTS};

/// Triangulated surface attached to the reference spine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<[f64; 3]>,
    pub triangles: Vec<[usize; 3]>,
}

impl Mesh {
    pub fn new(vertices: Vec<[f64; 3]>, triangles: Vec<[usize; 3]>) -> Result<Self> {
        if let Some(bad) = triangles
            .iter()
            .flatten()
            .find(|&&idx| idx >= vertices.len())
        {
            return Err(LandmarkError::invalid(
                "triangle vertex",
                *bad,
                "index outside the vertex list",
            ));
        }
        Ok(Self {
            vertices,
            triangles,
        })
    }

    pub fn vertex(&self, idx: usize) -> Vector3<f64> {
        let [x, y, z] = self.vertices[idx];
        Vector3::new(x, y, z)
    }

    pub fn translated(&self, offset: &Vector3<f64>) -> Mesh {
        Mesh {
            vertices: self
                .vertices
                .iter()
                .map(|[x, y, z]| [x + offset.x, y + offset.y, z + offset.z])
                .collect(),
            triangles: self.triangles.clone(),
        }
    }
}

/// Normative "average spine" the patient is compared against. Read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceModel {
    pub left: OrderedSide,
    pub right: OrderedSide,
    pub mesh: Option<Mesh>,
}

impl ReferenceModel {
    pub fn new(left: OrderedSide, right: OrderedSide, mesh: Option<Mesh>) -> Self {
        Self { left, right, mesh }
    }

    /// Splits labeled reference landmarks (`T1L` .. `L5R`) into sides.
    pub fn from_points(points: &[LandmarkPoint], mesh: Option<Mesh>) -> Result<Self> {
        let mut left = Vec::new();
        let mut right = Vec::new();
        for point in points {
            match parse_label(&point.label) {
                Some((_, Side::Left)) => left.push(point.clone()),
                Some((_, Side::Right)) => right.push(point.clone()),
                None => {
                    return Err(LandmarkError::invalid(
                        "reference label",
                        &point.label,
                        "reference landmarks must be named after a vertebra and side",
                    ))
                }
            }
        }
        if left.len() != COMPLETE_SIDE_POINTS || right.len() != COMPLETE_SIDE_POINTS {
            warn!(
                "reference model has {} left and {} right landmarks, expected {} per side",
                left.len(),
                right.len(),
                COMPLETE_SIDE_POINTS
            );
        }
        Ok(Self::new(
            OrderedSide::new(Side::Left, left),
            OrderedSide::new(Side::Right, right),
            mesh,
        ))
    }

    pub fn points(&self) -> Vec<LandmarkPoint> {
        self.left
            .points()
            .iter()
            .chain(self.right.points())
            .cloned()
            .collect()
    }
}
