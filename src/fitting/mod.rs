//! Curve fitting.
//!
//! Spine curves are modelled as polynomials of the superior-inferior
//! coordinate: one for the lateral and one for the anterior-posterior
//! coordinate, plus a "frequency" polynomial describing how the spacing
//! between consecutive landmarks evolves along the curve.

pub mod curve;
pub mod polynomial;

pub use curve::{interval_spacing, Centerline, CurveFitter, CurveModel, IntervalSpacing};
pub use polynomial::{Domain, Polynomial};
