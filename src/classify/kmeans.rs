//! Deterministic two-cluster k-means.

use nalgebra::Vector3;

use crate::error::{LandmarkError, Result};

/// Iteration stops once every centroid moved less than this (mm). With two
/// clusters this stops on the same assignment as requiring only one to settle.
pub const CONVERGENCE_DELTA: f64 = 0.05;
pub const MAX_ITERATIONS: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct TwoMeans {
    pub centroids: [Vector3<f64>; 2],
    /// Cluster (0 or 1) of each input point.
    pub assignments: Vec<usize>,
    pub iterations: usize,
}

impl TwoMeans {
    /// Cluster whose centroid has the smaller lateral coordinate.
    pub fn lateral_min_cluster(&self) -> usize {
        if self.centroids[0].x <= self.centroids[1].x {
            0
        } else {
            1
        }
    }
}

/// Clusters `points` into two groups.
///
/// Centroid 0 starts at the minimum lateral coordinate and centroid 1 at the
/// maximum, both at the mean of the other two axes, so the result depends
/// only on the input.
pub fn two_means(points: &[Vector3<f64>]) -> Result<TwoMeans> {
    if points.is_empty() {
        return Err(LandmarkError::InsufficientData {
            context: "k-means",
            needed: 1,
            found: 0,
        });
    }

    let n = points.len() as f64;
    let mean_y = points.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_z = points.iter().map(|p| p.z).sum::<f64>() / n;
    let min_x = points.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let max_x = points.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);

    let mut centroids = [
        Vector3::new(min_x, mean_y, mean_z),
        Vector3::new(max_x, mean_y, mean_z),
    ];
    let mut assignments = assign(points, &centroids);
    let mut iterations = 0;

    while iterations < MAX_ITERATIONS {
        iterations += 1;
        let mut updated = centroids;
        for (cluster, centroid) in updated.iter_mut().enumerate() {
            let members: Vec<&Vector3<f64>> = points
                .iter()
                .zip(&assignments)
                .filter(|(_, a)| **a == cluster)
                .map(|(p, _)| p)
                .collect();
            // an empty cluster keeps its previous centroid
            if !members.is_empty() {
                *centroid = members.iter().fold(Vector3::zeros(), |acc, p| acc + *p)
                    / members.len() as f64;
            }
        }

        let moved = (updated[0] - centroids[0])
            .norm()
            .max((updated[1] - centroids[1]).norm());
        centroids = updated;
        assignments = assign(points, &centroids);
        if moved < CONVERGENCE_DELTA {
            break;
        }
    }

    Ok(TwoMeans {
        centroids,
        assignments,
        iterations,
    })
}

fn assign(points: &[Vector3<f64>], centroids: &[Vector3<f64>; 2]) -> Vec<usize> {
    points
        .iter()
        .map(|p| {
            let d0 = (p - centroids[0]).norm_squared();
            let d1 = (p - centroids[1]).norm_squared();
            if d1 < d0 {
                1
            } else {
                0
            }
        })
        .collect()
}
