//! Individual representation for parameter calibration
//!
//! An individual carries one candidate parameter vector (its genome, one value
//! per calibrated parameter), the fitness tuple produced by the evaluator, the
//! `(generation, index)` provenance tag used to recognise it across
//! generations, and the simulation record attached after its model run.
//!
//! Variation operators work on `genes` in place and must clear the fitness;
//! only the evaluator sets it again.

use crate::engines::metrics::PeriodEfficiency;
use crate::types::{ExecutionTiming, Provenance, TimeSeries};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Objective values of an individual, either unset or valid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fitness {
    values: Option<Vec<f64>>,
}

impl Fitness {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values: Some(values) }
    }

    pub fn is_valid(&self) -> bool {
        self.values.is_some()
    }

    pub fn values(&self) -> Option<&[f64]> {
        self.values.as_deref()
    }

    pub fn set(&mut self, values: Vec<f64>) {
        self.values = Some(values);
    }

    pub fn invalidate(&mut self) {
        self.values = None;
    }

    /// Values multiplied by the run-wide weights
    pub fn weighted(&self, weights: &[f64]) -> Option<Vec<f64>> {
        self.values
            .as_ref()
            .map(|v| v.iter().zip(weights).map(|(x, w)| x * w).collect())
    }
}

/// Everything a model run produced for one individual
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationRecord {
    pub observed: BTreeMap<String, TimeSeries>,
    pub simulated: BTreeMap<String, TimeSeries>,
    pub calibration: PeriodEfficiency,
    pub validation: Option<PeriodEfficiency>,
    pub timing: ExecutionTiming,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    pub genes: Vec<f64>,
    pub fitness: Fitness,
    pub provenance: Provenance,
    #[serde(default)]
    pub record: Option<SimulationRecord>,
    #[serde(skip)]
    pub rank: usize,
    #[serde(skip)]
    pub crowding_distance: f64,
}

impl Individual {
    pub fn new(genes: Vec<f64>, provenance: Provenance) -> Self {
        Self {
            genes,
            fitness: Fitness::default(),
            provenance,
            record: None,
            rank: 0,
            crowding_distance: 0.0,
        }
    }

    /// Objective values, empty when the fitness is not valid
    pub fn objectives(&self) -> &[f64] {
        self.fitness.values().unwrap_or(&[])
    }

    pub fn timing(&self) -> ExecutionTiming {
        self.record.as_ref().map(|r| r.timing).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fitness_lifecycle() {
        let mut fitness = Fitness::default();
        assert!(!fitness.is_valid());

        fitness.set(vec![0.8, 0.2]);
        assert!(fitness.is_valid());
        assert_eq!(fitness.weighted(&[2.0, -1.0]), Some(vec![1.6, -0.2]));

        fitness.invalidate();
        assert!(fitness.values().is_none());
    }

    #[test]
    fn test_new_individual_is_unevaluated() {
        let ind = Individual::new(vec![0.1, 0.2], Provenance::new(0, 3));
        assert!(!ind.fitness.is_valid());
        assert!(ind.objectives().is_empty());
        assert_eq!(ind.timing(), ExecutionTiming::default());
    }
}
