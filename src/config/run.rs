use super::manager::AppConfig;
use super::optimization::OptimizationConfig;
use super::traits::ConfigSection;
use crate::engines::evaluation::{CalibrationStep, ObjectiveSpec};
use crate::error::{CalibrationError, Result};
use crate::types::{ParameterDef, Period};

/// Validated, immutable settings of one calibration run.
///
/// Built once at startup; the driver never consults global state.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub step: CalibrationStep,
    pub objectives: Vec<ObjectiveSpec>,
    pub weights: Vec<f64>,
    pub worst: Vec<f64>,
    pub parameters: Vec<ParameterDef>,
    pub low: Vec<f64>,
    pub up: Vec<f64>,
    pub npop: usize,
    pub ngens: usize,
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    pub pop_select_num: usize,
    pub seed: Option<u64>,
    pub filter_nse: bool,
    pub calibration_period: Period,
    pub validation_period: Option<Period>,
}

impl RunConfig {
    pub fn new(
        step: CalibrationStep,
        weights: Vec<f64>,
        parameters: Vec<ParameterDef>,
        optimization: &OptimizationConfig,
        calibration_period: Period,
        validation_period: Option<Period>,
    ) -> Result<Self> {
        let objectives = step.objectives();
        if weights.len() != objectives.len() {
            return Err(CalibrationError::Configuration(format!(
                "Step {} produces {} objectives but the weight vector has {} entries",
                step,
                objectives.len(),
                weights.len()
            )));
        }
        if parameters.is_empty() {
            return Err(CalibrationError::Configuration(
                "No parameter to calibrate".to_string(),
            ));
        }

        let worst = objectives.iter().map(|o| o.worst).collect();
        let low = parameters.iter().map(|p| p.low).collect();
        let up = parameters.iter().map(|p| p.up).collect();

        Ok(Self {
            step,
            objectives,
            weights,
            worst,
            parameters,
            low,
            up,
            npop: optimization.npop,
            ngens: optimization.ngens,
            crossover_rate: optimization.rcross,
            mutation_rate: optimization.rmut,
            pop_select_num: optimization.pop_select_num(),
            seed: optimization.seed,
            filter_nse: optimization.filter_nse,
            calibration_period,
            validation_period,
        })
    }

    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        config.optimization.validate()?;
        config.calibration.validate()?;
        let calibration = &config.calibration;
        Self::new(
            calibration.step,
            calibration.effective_weights(),
            calibration.parameters.clone(),
            &config.optimization,
            calibration.simulation_period.to_period()?,
            calibration
                .validation_period
                .as_ref()
                .map(|p| p.to_period())
                .transpose()?,
        )
    }

    pub fn labels(&self) -> Vec<String> {
        self.objectives.iter().map(ObjectiveSpec::label).collect()
    }

    /// Tracked variables, in the order their metrics are reported
    pub fn variables(&self) -> Vec<String> {
        self.step.variables()
    }

    /// Observation window: simulation period extended to the validation period
    pub fn observation_period(&self) -> Period {
        match &self.validation_period {
            Some(vali) => Period::new(
                self.calibration_period.start.min(vali.start),
                self.calibration_period.end.max(vali.end),
            ),
            None => self.calibration_period,
        }
    }
}
