use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::category::{Category, ProbBins};
use crate::component::Parameter;
use crate::error::ConfigError;

/// Constants of one verification run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationCfg {
    /// Visibility category thresholds in metres.
    pub visibility_thresholds: Vec<f64>,
    /// Cloud-base category thresholds in feet.
    pub cloud_base_thresholds: Vec<f64>,
    pub probability_bins: Vec<f64>,
    pub uncertainty_probability_bins: Vec<f64>,
    /// Required forecast length; also the cutoff for observations.
    pub verification_period_hours: i64,
    pub metars_per_hour: f64,
    pub ft_to_m: f64,
}

impl Default for VerificationCfg {
    fn default() -> Self {
        Self {
            visibility_thresholds: vec![350.0, 800.0, 1500.0, 5000.0, 10000.0],
            cloud_base_thresholds: vec![200.0, 500.0, 1000.0, 1500.0],
            probability_bins: ProbBins::plain().as_slice().to_vec(),
            uncertainty_probability_bins: ProbBins::uncertainty().as_slice().to_vec(),
            verification_period_hours: 24,
            metars_per_hour: 2.0,
            ft_to_m: 0.3048,
        }
    }
}

impl VerificationCfg {
    /// Parse a (possibly partial) JSON document; missing keys keep their defaults.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: VerificationCfg = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_thresholds("visibility", &self.visibility_thresholds)?;
        check_thresholds("cloud base", &self.cloud_base_thresholds)?;
        check_bins("plain", &self.probability_bins)?;
        check_bins("uncertainty", &self.uncertainty_probability_bins)?;
        if self.verification_period_hours <= 0 {
            return Err(ConfigError::Invalid {
                name: "verification_period_hours",
                reason: format!("{} is not positive", self.verification_period_hours),
            });
        }
        if !(self.metars_per_hour.is_finite() && self.metars_per_hour > 0.0) {
            return Err(ConfigError::Invalid {
                name: "metars_per_hour",
                reason: format!("{} is not positive", self.metars_per_hour),
            });
        }
        if !(self.ft_to_m.is_finite() && self.ft_to_m > 0.0) {
            return Err(ConfigError::Invalid {
                name: "ft_to_m",
                reason: format!("{} is not positive", self.ft_to_m),
            });
        }
        Ok(())
    }

    pub fn categories(&self, parameter: Parameter) -> Vec<Category> {
        match parameter {
            Parameter::Visibility => Category::from_thresholds(&self.visibility_thresholds),
            Parameter::CloudBase => Category::from_thresholds(&self.cloud_base_thresholds),
        }
    }

    pub fn plain_bins(&self) -> ProbBins {
        ProbBins::new(self.probability_bins.clone())
    }

    pub fn uncertainty_bins(&self) -> ProbBins {
        ProbBins::new(self.uncertainty_probability_bins.clone())
    }

    pub fn verification_period(&self) -> Duration {
        Duration::hours(self.verification_period_hours)
    }
}

fn check_thresholds(name: &'static str, t: &[f64]) -> Result<(), ConfigError> {
    let positive = t.iter().all(|v| v.is_finite() && *v > 0.0);
    let ascending = t.windows(2).all(|w| w[0] < w[1]);
    if positive && ascending {
        Ok(())
    } else {
        Err(ConfigError::Thresholds { name })
    }
}

fn check_bins(name: &'static str, bins: &[f64]) -> Result<(), ConfigError> {
    let starts_at_zero = bins.first().is_some_and(|p| *p == 0.0);
    let in_range = bins.iter().all(|p| (0.0..=1.0).contains(p));
    let ascending = bins.windows(2).all(|w| w[0] < w[1]);
    if starts_at_zero && in_range && ascending {
        Ok(())
    } else {
        Err(ConfigError::ProbabilityBins { name })
    }
}
