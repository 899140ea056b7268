//! Tunable parameters of the repair and assessment routines.
//!
//! Every knob is a plain scalar supplied by the caller. `Config` can also be
//! read from a TOML file; missing fields take the defaults below.
//!
//! ```toml
//! [repair]
//! km_window_size = 4
//! poly_fit_degree = 5
//! omission_detection_specificity = 1.5
//!
//! [assess]
//! sample_points = 200
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{LandmarkError, Result};

pub const DEFAULT_JITTER_SEED: u64 = 0x5EED;

/// What to do with a landmark that got as many left as right votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicy {
    /// Side of the landmark's lateral coordinate relative to the mean lateral
    /// coordinate of all landmarks.
    #[default]
    LateralSign,
    /// Fail with [`LandmarkError::AmbiguousClassification`].
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairParams {
    pub km_window_size: u32,
    pub poly_fit_degree: u32,
    pub boundary_multiplicity: u32,
    pub omission_detection_specificity: f64,
    pub imputation_specificity: f64,
    /// Landmarks in a complete bilateral set; each side is capped at half.
    pub max_total_points: u32,
    pub tie_policy: TiePolicy,
    pub jitter_seed: u64,
}

impl Default for RepairParams {
    fn default() -> Self {
        Self {
            km_window_size: 4,
            poly_fit_degree: 5,
            boundary_multiplicity: 2,
            omission_detection_specificity: 1.0,
            imputation_specificity: 0.0,
            max_total_points: 34,
            tie_policy: TiePolicy::LateralSign,
            jitter_seed: DEFAULT_JITTER_SEED,
        }
    }
}

impl RepairParams {
    pub fn validate(&self) -> Result<()> {
        check_range("km_window_size", self.km_window_size as f64, 2.0, 12.0)?;
        check_range("poly_fit_degree", self.poly_fit_degree as f64, 1.0, 10.0)?;
        check_range(
            "boundary_multiplicity",
            self.boundary_multiplicity as f64,
            1.0,
            10.0,
        )?;
        check_range(
            "omission_detection_specificity",
            self.omission_detection_specificity,
            -10.0,
            10.0,
        )?;
        check_range(
            "imputation_specificity",
            self.imputation_specificity,
            -10.0,
            1.0,
        )?;
        if self.max_total_points < 2 {
            return Err(LandmarkError::invalid(
                "max_total_points",
                self.max_total_points,
                "must allow at least one point per side",
            ));
        }
        Ok(())
    }

    /// Point cap of a single side.
    pub fn max_side_points(&self) -> usize {
        (self.max_total_points / 2) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessParams {
    pub poly_degree: u32,
    pub sample_points: u32,
}

impl Default for AssessParams {
    fn default() -> Self {
        Self {
            poly_degree: 4,
            sample_points: 100,
        }
    }
}

impl AssessParams {
    pub fn validate(&self) -> Result<()> {
        check_range("poly_degree", self.poly_degree as f64, 1.0, 10.0)?;
        if self.sample_points < 2 {
            return Err(LandmarkError::invalid(
                "sample_points",
                self.sample_points,
                "at least two samples are needed",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub repair: RepairParams,
    pub assess: AssessParams,
}

impl Config {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(text).context("failed to parse landmark config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {:?}", path.as_ref()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("invalid config file {:?}", path.as_ref()))
    }

    pub fn validate(&self) -> Result<()> {
        self.repair.validate()?;
        self.assess.validate()
    }
}

fn check_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<()> {
    if !value.is_finite() || value < min || value > max {
        return Err(LandmarkError::invalid(name, value, "out of range"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.repair.max_side_points(), 17);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [repair]
            km_window_size = 6
            imputation_specificity = -0.5
            tie_policy = "reject"

            [assess]
            sample_points = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.repair.km_window_size, 6);
        assert_eq!(config.repair.imputation_specificity, -0.5);
        assert_eq!(config.repair.tie_policy, TiePolicy::Reject);
        assert_eq!(config.repair.poly_fit_degree, 5);
        assert_eq!(config.assess.sample_points, 250);
        assert_eq!(config.assess.poly_degree, 4);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let err = Config::from_toml_str("[repair]\nkm_window_size = 1\n").unwrap_err();
        assert!(format!("{:#}", err).contains("km_window_size"));

        let params = RepairParams {
            imputation_specificity: 1.5,
            ..RepairParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(LandmarkError::InvalidParameter {
                name: "imputation_specificity",
                ..
            })
        ));

        let assess = AssessParams {
            sample_points: 1,
            ..AssessParams::default()
        };
        assert!(assess.validate().is_err());
    }
}
