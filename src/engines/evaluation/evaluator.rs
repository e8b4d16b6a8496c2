use super::objectives::{fitness_values, CalibrationStep, ObjectiveSpec};
use super::simulator::Simulator;
use crate::engines::generation::individual::SimulationRecord;
use crate::engines::metrics::{EfficiencyMetrics, ObsSimPair, PeriodEfficiency};
use crate::error::{CalibrationError, Result};
use crate::types::{Period, TimeSeries};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Result of scoring one genome
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub values: Vec<f64>,
    pub record: SimulationRecord,
}

/// Maps a genome to its fitness tuple. Shared read-only between workers.
pub trait FitnessEvaluator: Send + Sync {
    /// Objective labels, in fitness order
    fn labels(&self) -> Vec<String>;

    fn evaluate(&self, genes: &[f64]) -> Result<Evaluation>;
}

/// Evaluator backed by a model run compared against observations
pub struct ModelEvaluator {
    simulator: Arc<dyn Simulator>,
    objectives: Vec<ObjectiveSpec>,
    variables: Vec<String>,
    observed: BTreeMap<String, TimeSeries>,
    calibration_period: Period,
    validation_period: Option<Period>,
}

impl ModelEvaluator {
    /// `observed` should cover both the calibration and validation periods;
    /// it is read once by the caller and shared by every evaluation.
    pub fn new(
        simulator: Arc<dyn Simulator>,
        step: CalibrationStep,
        observed: BTreeMap<String, TimeSeries>,
        calibration_period: Period,
        validation_period: Option<Period>,
    ) -> Self {
        Self {
            simulator,
            objectives: step.objectives(),
            variables: step.variables(),
            observed,
            calibration_period,
            validation_period,
        }
    }

    fn period_efficiency(&self, simulated: &BTreeMap<String, TimeSeries>, period: &Period) -> PeriodEfficiency {
        let mut efficiency = PeriodEfficiency::default();
        for variable in &self.variables {
            let (Some(obs), Some(sim)) = (self.observed.get(variable), simulated.get(variable)) else {
                continue;
            };
            let pair = ObsSimPair::align(obs, sim, period);
            if let Some(metrics) = EfficiencyMetrics::calculate(&pair) {
                efficiency.variables.insert(variable.clone(), metrics);
            }
        }
        efficiency
    }
}

impl FitnessEvaluator for ModelEvaluator {
    fn labels(&self) -> Vec<String> {
        self.objectives.iter().map(ObjectiveSpec::label).collect()
    }

    fn evaluate(&self, genes: &[f64]) -> Result<Evaluation> {
        let output = self.simulator.run(genes)?;

        for variable in &self.variables {
            if !output.series.contains_key(variable) {
                return Err(CalibrationError::Simulator(format!(
                    "model output has no series for {}",
                    variable
                )));
            }
        }

        let calibration = self.period_efficiency(&output.series, &self.calibration_period);
        let validation = self
            .validation_period
            .map(|period| self.period_efficiency(&output.series, &period));

        // Always scored from this individual's own metrics
        let values = fitness_values(&self.objectives, &calibration)?;

        let observed = self
            .variables
            .iter()
            .filter_map(|v| self.observed.get(v).map(|s| (v.clone(), s.clone())))
            .collect();

        Ok(Evaluation {
            values,
            record: SimulationRecord {
                observed,
                simulated: output.series,
                calibration,
                validation,
                timing: output.timing,
            },
        })
    }
}
