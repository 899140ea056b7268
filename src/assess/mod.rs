//! Posture assessment against a normative reference spine.
//!
//! The reference is aligned to the patient's base, stretched along its own
//! midline to the patient's length, and the two midlines are compared axis by
//! axis. Lateral deviations are reported as reference minus patient, so a
//! positive value is the Max-Right extreme and a negative one Max-Left; the
//! anterior-posterior axis reads the same way (positive is Max-Anterior).

pub mod cobb;
pub mod reference;
pub mod register;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::AssessParams;
use crate::error::{LandmarkError, Result};
use crate::fitting::{Domain, Polynomial};
use crate::landmarks::OrderedSide;
use crate::utils::stats::rms;
pub use cobb::{cobb_angle, coronal_tilt, CobbAngle};
pub use reference::{Mesh, ReferenceModel};
pub use register::{base_center, register_reference, Midline, RegisteredReference};

/// Extremes and RMS of a deviation curve sampled over the overlapping height range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisDeviation {
    /// Largest positive deviation, `0.0` if the curve never goes positive.
    pub max_positive: f64,
    /// Height at which `max_positive` occurs.
    pub max_positive_at: f64,
    /// Most negative deviation, `0.0` if the curve never goes negative.
    pub max_negative: f64,
    pub max_negative_at: f64,
    pub rms: f64,
}

impl AxisDeviation {
    pub fn from_curve(deviation: &Polynomial, heights: &[f64]) -> Self {
        let values: Vec<f64> = heights.iter().map(|&s| deviation.eval(s)).collect();
        let mut result = AxisDeviation {
            max_positive: 0.0,
            max_positive_at: heights.first().copied().unwrap_or(0.0),
            max_negative: 0.0,
            max_negative_at: heights.first().copied().unwrap_or(0.0),
            rms: rms(&values),
        };
        for (&s, &v) in heights.iter().zip(&values) {
            if v > result.max_positive {
                result.max_positive = v;
                result.max_positive_at = s;
            }
            if v < result.max_negative {
                result.max_negative = v;
                result.max_negative_at = s;
            }
        }
        result
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostureAssessment {
    pub cobb: CobbAngle,
    pub lateral: AxisDeviation,
    pub anteroposterior: AxisDeviation,
    pub patient_length: f64,
    /// Midline length of the reference after registration.
    pub reference_length: f64,
    pub registered: RegisteredReference,
}

impl PostureAssessment {
    pub fn max_right(&self) -> f64 {
        self.lateral.max_positive
    }

    pub fn max_left(&self) -> f64 {
        self.lateral.max_negative
    }

    pub fn rms_lateral(&self) -> f64 {
        self.lateral.rms
    }

    pub fn max_anterior(&self) -> f64 {
        self.anteroposterior.max_positive
    }

    pub fn max_posterior(&self) -> f64 {
        self.anteroposterior.max_negative
    }

    pub fn rms_anteroposterior(&self) -> f64 {
        self.anteroposterior.rms
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostureAssessor {
    pub poly_degree: u32,
    pub sample_points: u32,
}

impl Default for PostureAssessor {
    fn default() -> Self {
        Self::from_params(&AssessParams::default())
    }
}

impl PostureAssessor {
    pub fn new(poly_degree: u32, sample_points: u32) -> Self {
        Self {
            poly_degree,
            sample_points,
        }
    }

    pub fn from_params(params: &AssessParams) -> Self {
        Self::new(params.poly_degree, params.sample_points)
    }

    /// Compares a patient's sides to the reference. Neither input is modified.
    pub fn assess(
        &self,
        left: &OrderedSide,
        right: &OrderedSide,
        reference: &ReferenceModel,
    ) -> Result<PostureAssessment> {
        AssessParams {
            poly_degree: self.poly_degree,
            sample_points: self.sample_points,
        }
        .validate()?;
        let degree = self.poly_degree as usize;
        let samples = self.sample_points as usize;

        let registered = register_reference(left, right, reference, degree, samples)?;

        // both midlines share one normalization so their coefficients subtract
        let patient = Midline::fit(left, right, degree, None)?;
        let scaled = Midline::fit(&registered.left, &registered.right, degree, None)?;
        let domain = Domain::spanning(
            patient.s_top.max(scaled.s_top),
            patient.s_bottom.min(scaled.s_bottom),
        );
        let degree = degree.min(patient.levels - 1).min(scaled.levels - 1);
        let patient = Midline::fit(left, right, degree, Some(domain))?;
        let scaled = Midline::fit(&registered.left, &registered.right, degree, Some(domain))?;

        let lateral = scaled
            .centerline
            .lateral
            .checked_sub(&patient.centerline.lateral)?;
        let anteroposterior = scaled
            .centerline
            .anteroposterior
            .checked_sub(&patient.centerline.anteroposterior)?;

        let top = patient.s_top.min(scaled.s_top);
        let bottom = patient.s_bottom.max(scaled.s_bottom);
        if top <= bottom {
            return Err(LandmarkError::DegenerateGeometry(format!(
                "patient and reference do not overlap in height (overlap {:.2}..{:.2})",
                bottom, top
            )));
        }
        let step = (top - bottom) / (samples - 1) as f64;
        let heights: Vec<f64> = (0..samples).map(|k| top - step * k as f64).collect();

        let assessment = PostureAssessment {
            cobb: cobb_angle(left, right)?,
            lateral: AxisDeviation::from_curve(&lateral, &heights),
            anteroposterior: AxisDeviation::from_curve(&anteroposterior, &heights),
            patient_length: patient.sampled_length(samples),
            reference_length: scaled.sampled_length(samples),
            registered,
        };
        info!(
            "posture: Cobb {:.1} deg ({}-{}), lateral {:+.1}/{:+.1} mm, AP {:+.1}/{:+.1} mm",
            assessment.cobb.angle_deg,
            assessment.cobb.top_name,
            assessment.cobb.bottom_name,
            assessment.max_right(),
            assessment.max_left(),
            assessment.max_anterior(),
            assessment.max_posterior()
        );
        Ok(assessment)
    }
}
