use crate::engines::metrics::{EfficiencyMetrics, Metric, PeriodEfficiency};
use crate::error::{CalibrationError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Calibration step, selecting which variables and metrics form the fitness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalibrationStep {
    #[serde(rename = "Q")]
    Discharge,
    #[serde(rename = "SED")]
    Sediment,
    #[serde(rename = "NUTRIENT")]
    Nutrient,
}

/// One entry of the fitness tuple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveSpec {
    pub variable: String,
    pub metric: Metric,
    pub weight: f64,
    /// Worst acceptable value, used for the hypervolume reference point
    pub worst: f64,
}

impl ObjectiveSpec {
    fn new(variable: &str, metric: Metric, weight: f64, worst: f64) -> Self {
        Self {
            variable: variable.to_string(),
            metric,
            weight,
            worst,
        }
    }

    pub fn label(&self) -> String {
        match self.metric {
            Metric::Pbias => format!("{}-|PBIAS|", self.variable),
            other => format!("{}-{}", self.variable, other.as_str()),
        }
    }

    /// Objective value read from the metrics of the individual being scored.
    /// PBIAS is minimized as an absolute value.
    pub fn extract(&self, efficiency: &EfficiencyMetrics) -> f64 {
        let value = efficiency.value(self.metric);
        match self.metric {
            Metric::Pbias => value.abs(),
            _ => value,
        }
    }
}

impl CalibrationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discharge => "Q",
            Self::Sediment => "SED",
            Self::Nutrient => "NUTRIENT",
        }
    }

    /// Variables whose observations and simulations are compared
    pub fn variables(&self) -> Vec<String> {
        let names: &[&str] = match self {
            Self::Discharge => &["Q"],
            Self::Sediment => &["SED", "Q"],
            Self::Nutrient => &["CH_TN", "CH_TP", "Q", "SED"],
        };
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Fitness layout in concatenation order
    pub fn objectives(&self) -> Vec<ObjectiveSpec> {
        match self {
            // Max NSE (double weight), min RSR, min |PBIAS|
            Self::Discharge => vec![
                ObjectiveSpec::new("Q", Metric::Nse, 2.0, -1.0),
                ObjectiveSpec::new("Q", Metric::Rsr, -1.0, 100.0),
                ObjectiveSpec::new("Q", Metric::Pbias, -1.0, 10.0),
            ],
            Self::Sediment => vec![
                ObjectiveSpec::new("SED", Metric::Nse, 2.0, -100.0),
                ObjectiveSpec::new("SED", Metric::Rsr, -1.0, 100.0),
                ObjectiveSpec::new("SED", Metric::Pbias, -1.0, 100.0),
                ObjectiveSpec::new("Q", Metric::Nse, 1.0, -100.0),
            ],
            Self::Nutrient => vec![
                ObjectiveSpec::new("CH_TN", Metric::Nse, 1.0, -100.0),
                ObjectiveSpec::new("CH_TP", Metric::Nse, 1.0, -100.0),
                ObjectiveSpec::new("Q", Metric::Nse, 1.0, -100.0),
                ObjectiveSpec::new("SED", Metric::Nse, 1.0, -100.0),
            ],
        }
    }

    pub fn weights(&self) -> Vec<f64> {
        self.objectives().iter().map(|o| o.weight).collect()
    }

    pub fn worst(&self) -> Vec<f64> {
        self.objectives().iter().map(|o| o.worst).collect()
    }

    pub fn labels(&self) -> Vec<String> {
        self.objectives().iter().map(ObjectiveSpec::label).collect()
    }
}

impl fmt::Display for CalibrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CalibrationStep {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "Q" => Ok(Self::Discharge),
            "SED" => Ok(Self::Sediment),
            "NUTRIENT" => Ok(Self::Nutrient),
            other => Err(CalibrationError::Configuration(format!(
                "The step of calibration should be one of [Q, SED, NUTRIENT], got '{}'",
                other
            ))),
        }
    }
}

/// Build the fitness tuple from the calibration-period metrics.
/// Fails when a variable required by `objectives` was not evaluated.
pub fn fitness_values(objectives: &[ObjectiveSpec], efficiency: &PeriodEfficiency) -> Result<Vec<f64>> {
    objectives
        .iter()
        .map(|objective| {
            efficiency
                .get(&objective.variable)
                .map(|metrics| objective.extract(metrics))
                .ok_or_else(|| {
                    CalibrationError::Simulator(format!(
                        "no paired observed/simulated data for variable {}",
                        objective.variable
                    ))
                })
        })
        .collect()
}
