use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::polynomial::{Domain, Polynomial};
use crate::config::{RepairParams, DEFAULT_JITTER_SEED};
use crate::error::{LandmarkError, Result};
use crate::landmarks::OrderedSide;

/// Step (mm along the superior-inferior axis) used when walking a curve.
pub const ARC_STEP_MM: f64 = 0.1;

/// Lateral and anterior-posterior coordinates as functions of the
/// superior-inferior coordinate `s`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Centerline {
    pub lateral: Polynomial,
    pub anteroposterior: Polynomial,
}

impl Centerline {
    pub fn fit(s: &[f64], x: &[f64], y: &[f64], degree: usize, domain: Domain) -> Result<Self> {
        Ok(Self {
            lateral: Polynomial::fit_in_domain(s, x, degree, domain)?,
            anteroposterior: Polynomial::fit_in_domain(s, y, degree, domain)?,
        })
    }

    pub fn point_at(&self, s: f64) -> Vector3<f64> {
        Vector3::new(self.lateral.eval(s), self.anteroposterior.eval(s), s)
    }

    /// Arc length between two heights, walking the curve in [`ARC_STEP_MM`] steps.
    pub fn arc_length(&self, s_from: f64, s_to: f64) -> f64 {
        let ds = s_to - s_from;
        if ds == 0.0 {
            return 0.0;
        }
        let steps = (ds.abs() / ARC_STEP_MM).ceil().max(1.0) as usize;
        let h = ds / steps as f64;
        let mut prev = self.point_at(s_from);
        let mut total = 0.0;
        for k in 1..=steps {
            let p = self.point_at(s_from + h * k as f64);
            total += (p - prev).norm();
            prev = p;
        }
        total
    }

    /// Arc length from `s_origin` to `s`, positive going inferior.
    pub fn signed_arc(&self, s_origin: f64, s: f64) -> f64 {
        if s <= s_origin {
            self.arc_length(s_origin, s)
        } else {
            -self.arc_length(s_origin, s)
        }
    }

    /// Height reached after travelling `arc` mm from `s_start`; positive
    /// values travel inferior, negative superior.
    pub fn s_at_arc(&self, s_start: f64, arc: f64) -> f64 {
        if arc == 0.0 {
            return s_start;
        }
        let target = arc.abs();
        let h = if arc > 0.0 { -ARC_STEP_MM } else { ARC_STEP_MM };
        // each step covers at least |h| of arc
        let max_steps = (target / ARC_STEP_MM).ceil() as usize + 1;

        let mut s = s_start;
        let mut travelled = 0.0;
        let mut prev = self.point_at(s);
        for _ in 0..max_steps {
            let next_s = s + h;
            let p = self.point_at(next_s);
            let seg = (p - prev).norm();
            if travelled + seg >= target {
                let frac = if seg > 0.0 { (target - travelled) / seg } else { 0.0 };
                return s + h * frac;
            }
            travelled += seg;
            s = next_s;
            prev = p;
        }
        s
    }

    /// Curve length between two heights from `samples` evenly spaced evaluations.
    pub fn sampled_length(&self, s_top: f64, s_bottom: f64, samples: usize) -> f64 {
        let samples = samples.max(2);
        let h = (s_bottom - s_top) / (samples - 1) as f64;
        (1..samples)
            .map(|k| {
                let a = self.point_at(s_top + h * (k - 1) as f64);
                let b = self.point_at(s_top + h * k as f64);
                (b - a).norm()
            })
            .sum()
    }
}

/// Arc length of one inter-landmark interval and where along the curve it sits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalSpacing {
    /// Cumulative arc length from the top landmark to the interval midpoint.
    pub midpoint_arc: f64,
    pub length: f64,
}

/// Fitted curves of one side. Rebuilt from scratch whenever the side's
/// membership changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveModel {
    pub centerline: Centerline,
    /// Interval length as a function of midpoint arc length.
    pub frequency: Polynomial,
    pub spacing: Vec<IntervalSpacing>,
    pub s_top: f64,
    pub s_bottom: f64,
}

impl CurveModel {
    pub fn point_at(&self, s: f64) -> Vector3<f64> {
        self.centerline.point_at(s)
    }

    /// Actual minus predicted length for every interval.
    pub fn residuals(&self) -> Vec<f64> {
        self.spacing
            .iter()
            .map(|sp| sp.length - self.frequency.eval(sp.midpoint_arc))
            .collect()
    }

    pub fn total_length(&self) -> f64 {
        self.spacing.iter().map(|sp| sp.length).sum()
    }
}

/// Walks the centerline between consecutive landmark heights.
pub fn interval_spacing(centerline: &Centerline, s_values: &[f64]) -> Vec<IntervalSpacing> {
    let mut cumulative = 0.0;
    s_values
        .windows(2)
        .map(|w| {
            let length = centerline.arc_length(w[0], w[1]);
            let midpoint_arc = cumulative + length / 2.0;
            cumulative += length;
            IntervalSpacing {
                midpoint_arc,
                length,
            }
        })
        .collect()
}

fn fit_frequency(spacing: &[IntervalSpacing], degree: usize) -> Result<Polynomial> {
    if spacing.is_empty() {
        return Err(LandmarkError::InsufficientData {
            context: "frequency polynomial",
            needed: 1,
            found: 0,
        });
    }
    let degree = degree.min(spacing.len() - 1);
    let mids: Vec<f64> = spacing.iter().map(|sp| sp.midpoint_arc).collect();
    let lengths: Vec<f64> = spacing.iter().map(|sp| sp.length).collect();
    Polynomial::fit(&mids, &lengths, degree)
}

/// Fits [`CurveModel`]s to ordered sides.
///
/// The top and bottom landmarks are repeated `boundary_multiplicity` times
/// with uniform jitter in `[-1, 1]` mm per axis so the regression stays
/// anchored to the ends of the spine. The jitter is drawn from a generator
/// seeded with `jitter_seed` on every call, which makes fitting a pure function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveFitter {
    pub degree: u32,
    pub boundary_multiplicity: u32,
    pub jitter_seed: u64,
}

impl CurveFitter {
    pub fn new(degree: u32, boundary_multiplicity: u32) -> Self {
        Self {
            degree,
            boundary_multiplicity,
            jitter_seed: DEFAULT_JITTER_SEED,
        }
    }

    pub fn from_params(params: &RepairParams) -> Self {
        Self {
            degree: params.poly_fit_degree,
            boundary_multiplicity: params.boundary_multiplicity,
            jitter_seed: params.jitter_seed,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.jitter_seed = seed;
        self
    }

    pub fn fit(&self, side: &OrderedSide) -> Result<CurveModel> {
        let degree = self.degree as usize;
        let needed = (degree + 1).max(2);
        if side.len() < needed {
            return Err(LandmarkError::InsufficientData {
                context: "curve fit",
                needed,
                found: side.len(),
            });
        }

        let samples = self.boundary_weighted(side);
        let s: Vec<f64> = samples.iter().map(|p| p.z).collect();
        let x: Vec<f64> = samples.iter().map(|p| p.x).collect();
        let y: Vec<f64> = samples.iter().map(|p| p.y).collect();

        let centerline = Centerline::fit(&s, &x, &y, degree, Domain::from_samples(&s))?;
        let spacing = interval_spacing(&centerline, &side.z_values());
        let frequency = fit_frequency(&spacing, degree)?;

        let (Some(top), Some(bottom)) = (side.top(), side.bottom()) else {
            return Err(LandmarkError::InsufficientData {
                context: "curve fit",
                needed,
                found: 0,
            });
        };
        let (s_top, s_bottom) = (top.z, bottom.z);
        debug!(
            "fitted {} side: {} points, {} intervals, length {:.1} mm",
            side.side,
            side.len(),
            spacing.len(),
            spacing.iter().map(|sp| sp.length).sum::<f64>()
        );

        Ok(CurveModel {
            centerline,
            frequency,
            spacing,
            s_top,
            s_bottom,
        })
    }

    fn boundary_weighted(&self, side: &OrderedSide) -> Vec<Vector3<f64>> {
        let mut rng = StdRng::seed_from_u64(self.jitter_seed);
        let mut samples: Vec<Vector3<f64>> = side.points().iter().map(|p| p.position()).collect();
        let ends = [side.top(), side.bottom()];
        for end in ends.into_iter().flatten() {
            let anchor = end.position();
            for _ in 0..self.boundary_multiplicity {
                let jitter = Vector3::new(
                    rng.random_range(-1.0..=1.0),
                    rng.random_range(-1.0..=1.0),
                    rng.random_range(-1.0..=1.0),
                );
                samples.push(anchor + jitter);
            }
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{LandmarkPoint, Side};
    use crate::utils::test_utils::synthetic_spine;
    use approx::assert_relative_eq;

    fn straight_side(n: usize, spacing: f64) -> OrderedSide {
        let points = (0..n)
            .map(|i| LandmarkPoint::new(format!("p{}", i), 10.0, 5.0, -spacing * i as f64))
            .collect();
        OrderedSide::new(Side::Left, points)
    }

    #[test]
    fn test_fit_is_idempotent() {
        let (left, _) = synthetic_spine(17, 25.0, 30.0, 8.0);
        let fitter = CurveFitter::new(5, 3);
        let a = fitter.fit(&left).unwrap();
        let b = fitter.fit(&left).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fit_rejects_too_few_points() {
        let side = straight_side(3, 20.0);
        let err = CurveFitter::new(3, 1).fit(&side).unwrap_err();
        assert!(matches!(
            err,
            LandmarkError::InsufficientData {
                needed: 4,
                found: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_straight_side_spacing() {
        let side = straight_side(10, 20.0);
        let model = CurveFitter::new(2, 2).fit(&side).unwrap();

        assert_eq!(model.spacing.len(), 9);
        assert_relative_eq!(model.s_top, 0.0);
        assert_relative_eq!(model.s_bottom, -180.0);
        // jittered anchors tilt the fit slightly, the curve stays near-vertical
        for sp in &model.spacing {
            assert_relative_eq!(sp.length, 20.0, epsilon = 0.05);
        }
        assert_relative_eq!(model.spacing[0].midpoint_arc, model.spacing[0].length / 2.0);
        for r in model.residuals() {
            assert!(r.abs() < 0.05, "residual {}", r);
        }
        assert_relative_eq!(model.point_at(-90.0).x, 10.0, epsilon = 0.5);
    }

    #[test]
    fn test_different_seed_changes_jitter_only() {
        let (left, _) = synthetic_spine(17, 25.0, 30.0, 8.0);
        let a = CurveFitter::new(4, 2).fit(&left).unwrap();
        let b = CurveFitter::new(4, 2).with_seed(7).fit(&left).unwrap();
        assert_ne!(a, b);
        assert_relative_eq!(a.total_length(), b.total_length(), epsilon = 1.0);
    }

    #[test]
    fn test_arc_helpers_on_vertical_line() {
        let domain = Domain::spanning(-100.0, 0.0);
        let centerline = Centerline {
            lateral: Polynomial::new(vec![3.0], domain),
            anteroposterior: Polynomial::new(vec![-2.0], domain),
        };
        assert_relative_eq!(centerline.arc_length(0.0, -100.0), 100.0, epsilon = 1e-9);
        assert_relative_eq!(centerline.signed_arc(-10.0, 5.0), -15.0, epsilon = 1e-9);
        assert_relative_eq!(centerline.s_at_arc(-10.0, 25.0), -35.0, epsilon = 1e-9);
        assert_relative_eq!(centerline.s_at_arc(-10.0, -4.05), -5.95, epsilon = 1e-9);
        assert_relative_eq!(centerline.sampled_length(0.0, -100.0, 11), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_arc_length_of_slanted_line() {
        // x = 0.75 * s  => ds = 4 gives 5 mm of arc
        let domain = Domain::spanning(-40.0, 0.0);
        let centerline = Centerline {
            lateral: Polynomial::new(vec![-15.0, 15.0], domain),
            anteroposterior: Polynomial::new(vec![0.0], domain),
        };
        assert_relative_eq!(centerline.arc_length(0.0, -40.0), 50.0, epsilon = 1e-9);
        assert_relative_eq!(centerline.s_at_arc(0.0, 25.0), -20.0, epsilon = 1e-6);
    }
}
