use super::traits::ConfigSection;
use crate::engines::evaluation::SchedulerKind;
use crate::error::CalibrationError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Initial population size
    pub npop: usize,
    /// Generation budget
    pub ngens: usize,
    /// Crossover probability per pair
    pub rcross: f64,
    /// Mutation probability per parameter
    pub rmut: f64,
    /// Fraction of `npop` kept as survivors each generation
    pub rsel: f64,
    pub seed: Option<u64>,
    /// Drop individuals whose primary objective is not positive
    pub filter_nse: bool,
    pub scheduler: SchedulerKind,
    pub workers: Option<usize>,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            npop: 20,
            ngens: 10,
            rcross: 0.75,
            rmut: 0.1,
            rsel: 0.8,
            seed: None,
            filter_nse: false,
            scheduler: SchedulerKind::Parallel,
            workers: None,
        }
    }
}

impl OptimizationConfig {
    pub fn pop_select_num(&self) -> usize {
        (self.npop as f64 * self.rsel).floor() as usize
    }
}

impl ConfigSection for OptimizationConfig {
    fn section_name() -> &'static str {
        "optimization"
    }

    fn validate(&self) -> Result<(), CalibrationError> {
        if self.npop < 2 {
            return Err(Self::invalid("Population size must be at least 2"));
        }
        if !(0.0..=1.0).contains(&self.rcross) {
            return Err(Self::invalid("Crossover rate must be between 0 and 1"));
        }
        if !(0.0..=1.0).contains(&self.rmut) {
            return Err(Self::invalid("Mutation rate must be between 0 and 1"));
        }
        if self.rsel <= 0.0 || self.rsel > 1.0 {
            return Err(Self::invalid("Selection ratio must be in (0, 1]"));
        }
        if self.pop_select_num() < 2 {
            return Err(Self::invalid(format!(
                "Selection must keep at least 2 individuals: floor({} * {}) = {}",
                self.npop,
                self.rsel,
                self.pop_select_num()
            )));
        }
        if self.workers == Some(0) {
            return Err(Self::invalid("Worker count must be positive"));
        }
        Ok(())
    }
}
