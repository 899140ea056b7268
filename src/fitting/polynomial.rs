//! Least-squares polynomials over a normalized abscissa.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{LandmarkError, Result};

const SVD_EPS: f64 = 1e-12;

/// Affine map `t = (x - shift) / scale` applied before evaluating a polynomial.
///
/// Keeps the Vandermonde system well conditioned for millimetre coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub shift: f64,
    pub scale: f64,
}

impl Domain {
    /// Maps `[a, b]` (in either order) onto `[-1, 1]`.
    pub fn spanning(a: f64, b: f64) -> Self {
        let half = (b - a).abs() / 2.0;
        Self {
            shift: (a + b) / 2.0,
            scale: if half > 1e-12 { half } else { 1.0 },
        }
    }

    pub fn from_samples(xs: &[f64]) -> Self {
        let (min, max) = xs
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
                (lo.min(x), hi.max(x))
            });
        if !min.is_finite() || !max.is_finite() {
            return Self {
                shift: 0.0,
                scale: 1.0,
            };
        }
        Self::spanning(min, max)
    }

    #[inline]
    pub fn normalize(&self, x: f64) -> f64 {
        (x - self.shift) / self.scale
    }
}

/// `p(x) = sum_i coeffs[i] * t^i` with `t = domain.normalize(x)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polynomial {
    coeffs: Vec<f64>,
    domain: Domain,
}

impl Polynomial {
    pub fn new(coeffs: Vec<f64>, domain: Domain) -> Self {
        Self { coeffs, domain }
    }

    /// Least-squares fit of a degree-`degree` polynomial over the samples' own range.
    pub fn fit(xs: &[f64], ys: &[f64], degree: usize) -> Result<Self> {
        Self::fit_in_domain(xs, ys, degree, Domain::from_samples(xs))
    }

    pub fn fit_in_domain(xs: &[f64], ys: &[f64], degree: usize, domain: Domain) -> Result<Self> {
        if xs.len() != ys.len() {
            return Err(LandmarkError::DegenerateGeometry(format!(
                "{} abscissae for {} ordinates",
                xs.len(),
                ys.len()
            )));
        }
        let unknowns = degree + 1;
        if xs.len() < unknowns {
            return Err(LandmarkError::InsufficientData {
                context: "polynomial fit",
                needed: unknowns,
                found: xs.len(),
            });
        }
        if xs.iter().chain(ys).any(|v| !v.is_finite()) {
            return Err(LandmarkError::DegenerateGeometry(
                "non-finite sample in polynomial fit".to_string(),
            ));
        }

        let vandermonde = DMatrix::from_fn(xs.len(), unknowns, |i, j| {
            domain.normalize(xs[i]).powi(j as i32)
        });
        let rhs = DVector::from_column_slice(ys);
        let solution = vandermonde
            .svd(true, true)
            .solve(&rhs, SVD_EPS)
            .map_err(|e| LandmarkError::DegenerateGeometry(e.to_string()))?;

        Ok(Self {
            coeffs: solution.iter().copied().collect(),
            domain,
        })
    }

    pub fn eval(&self, x: f64) -> f64 {
        let t = self.domain.normalize(x);
        self.coeffs.iter().rev().fold(0.0, |acc, &c| acc * t + c)
    }

    pub fn degree(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coeffs
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Coefficient-wise `self - other`. Both polynomials must share a domain.
    pub fn checked_sub(&self, other: &Polynomial) -> Result<Polynomial> {
        let same_domain = (self.domain.shift - other.domain.shift).abs() <= 1e-9
            && (self.domain.scale - other.domain.scale).abs() <= 1e-9;
        if !same_domain {
            return Err(LandmarkError::DegenerateGeometry(format!(
                "cannot subtract polynomials over different domains ({:?} vs {:?})",
                self.domain, other.domain
            )));
        }
        let len = self.coeffs.len().max(other.coeffs.len());
        let coeffs = (0..len)
            .map(|i| {
                self.coeffs.get(i).copied().unwrap_or(0.0)
                    - other.coeffs.get(i).copied().unwrap_or(0.0)
            })
            .collect();
        Ok(Polynomial {
            coeffs,
            domain: self.domain,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fit_recovers_cubic() {
        let xs: Vec<f64> = (0..20).map(|i| -400.0 + 20.0 * i as f64).collect();
        let f = |x: f64| 3.0 - 0.5 * x + 1e-3 * x * x + 2e-6 * x * x * x;
        let ys: Vec<f64> = xs.iter().map(|&x| f(x)).collect();

        let poly = Polynomial::fit(&xs, &ys, 3).unwrap();
        assert_eq!(poly.degree(), 3);
        for x in [-390.0, -200.0, -13.0, 0.0] {
            assert_relative_eq!(poly.eval(x), f(x), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_fit_needs_degree_plus_one_points() {
        let err = Polynomial::fit(&[0.0, 1.0, 2.0], &[1.0, 2.0, 3.0], 3).unwrap_err();
        assert_eq!(
            err,
            LandmarkError::InsufficientData {
                context: "polynomial fit",
                needed: 4,
                found: 3
            }
        );
    }

    #[test]
    fn test_least_squares_line_through_noise() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 2.0, 2.0, 3.0];
        let poly = Polynomial::fit(&xs, &ys, 1).unwrap();
        // slope 0.6, intercept 1.1
        assert_relative_eq!(poly.eval(0.0), 1.1, epsilon = 1e-9);
        assert_relative_eq!(poly.eval(1.0) - poly.eval(0.0), 0.6, epsilon = 1e-9);
    }

    #[test]
    fn test_checked_sub() {
        let domain = Domain::spanning(-100.0, 0.0);
        let a = Polynomial::new(vec![1.0, 2.0, 3.0], domain);
        let b = Polynomial::new(vec![0.5, 2.0], domain);
        let d = a.checked_sub(&b).unwrap();
        assert_eq!(d.coefficients(), &[0.5, 0.0, 3.0]);
        for x in [-100.0, -42.0, 0.0] {
            assert_relative_eq!(d.eval(x), a.eval(x) - b.eval(x), epsilon = 1e-12);
        }

        let other = Polynomial::new(vec![1.0], Domain::spanning(0.0, 10.0));
        assert!(a.checked_sub(&other).is_err());
    }

    #[test]
    fn test_degenerate_domain_falls_back_to_unit_scale() {
        let domain = Domain::from_samples(&[5.0, 5.0, 5.0]);
        assert_eq!(domain.scale, 1.0);
        assert_eq!(domain.normalize(6.0), 1.0);
    }
}
