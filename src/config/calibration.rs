use super::traits::ConfigSection;
use crate::data::connectors::parse_datetime;
use crate::engines::evaluation::CalibrationStep;
use crate::error::{CalibrationError, Result};
use crate::types::{ParameterDef, Period};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Time interval as written in the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodConfig {
    pub start: String,
    pub end: String,
}

impl PeriodConfig {
    pub fn to_period(&self) -> Result<Period> {
        let parse = |text: &str| {
            parse_datetime(text).ok_or_else(|| {
                CalibrationError::Configuration(format!("Invalid date/time '{}'", text))
            })
        };
        let period = Period::new(parse(&self.start)?, parse(&self.end)?);
        if period.start > period.end {
            return Err(CalibrationError::Configuration(format!(
                "Period starts after it ends: {} > {}",
                self.start, self.end
            )));
        }
        Ok(period)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub step: CalibrationStep,
    pub parameters: Vec<ParameterDef>,
    pub simulation_period: PeriodConfig,
    pub validation_period: Option<PeriodConfig>,
    /// Overrides the step's objective weights
    pub weights: Option<Vec<f64>>,
    pub out_dir: PathBuf,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            step: CalibrationStep::Discharge,
            parameters: Vec::new(),
            simulation_period: PeriodConfig {
                start: "2014-01-01 00:00:00".to_string(),
                end: "2014-12-31 23:59:59".to_string(),
            },
            validation_period: None,
            weights: None,
            out_dir: PathBuf::from("calibration_output"),
        }
    }
}

impl CalibrationConfig {
    /// Objective weights in effect, the override or the step's defaults
    pub fn effective_weights(&self) -> Vec<f64> {
        self.weights.clone().unwrap_or_else(|| self.step.weights())
    }
}

impl ConfigSection for CalibrationConfig {
    fn section_name() -> &'static str {
        "calibration"
    }

    fn validate(&self) -> std::result::Result<(), CalibrationError> {
        if self.parameters.is_empty() {
            return Err(Self::invalid("At least one parameter must be calibrated"));
        }

        let mut names = HashSet::new();
        for param in &self.parameters {
            if !names.insert(param.name.as_str()) {
                return Err(Self::invalid(format!("Duplicate parameter {}", param.name)));
            }
            if !(param.low.is_finite() && param.up.is_finite()) || param.low >= param.up {
                return Err(Self::invalid(format!(
                    "Parameter {} needs finite bounds with low < up, got [{}, {}]",
                    param.name, param.low, param.up
                )));
            }
            if let Some(default) = param.default {
                if default < param.low || default > param.up {
                    return Err(Self::invalid(format!(
                        "Default of parameter {} lies outside its bounds",
                        param.name
                    )));
                }
            }
        }

        let objectives = self.step.objectives().len();
        let weights = self.effective_weights();
        if weights.len() != objectives {
            return Err(Self::invalid(format!(
                "Step {} has {} objectives but {} weights are configured",
                self.step,
                objectives,
                weights.len()
            )));
        }
        if weights.iter().any(|w| *w == 0.0 || !w.is_finite()) {
            return Err(Self::invalid("Objective weights must be finite and non-zero"));
        }

        self.simulation_period.to_period()?;
        if let Some(vali) = &self.validation_period {
            vali.to_period()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> CalibrationConfig {
        CalibrationConfig {
            parameters: vec![ParameterDef::new("CN2", -20.0, 20.0)],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_weight_arity_mismatch() {
        let config = CalibrationConfig {
            weights: Some(vec![2.0, -1.0]),
            ..valid()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("3 objectives but 2 weights"));
    }

    #[test]
    fn test_bad_bounds_and_duplicates() {
        let config = CalibrationConfig {
            parameters: vec![ParameterDef::new("CN2", 1.0, 1.0)],
            ..valid()
        };
        assert!(config.validate().is_err());

        let config = CalibrationConfig {
            parameters: vec![ParameterDef::new("CN2", 0.0, 1.0), ParameterDef::new("CN2", 0.0, 2.0)],
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reversed_period() {
        let config = CalibrationConfig {
            simulation_period: PeriodConfig {
                start: "2015-01-01".to_string(),
                end: "2014-01-01".to_string(),
            },
            ..valid()
        };
        assert!(config.validate().is_err());
    }
}
