use super::evaluator::FitnessEvaluator;
use crate::engines::generation::individual::Individual;
use crate::error::{CalibrationError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Results of one evaluation batch
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Individuals that now carry a valid fitness and a simulation record
    pub evaluated: Vec<Individual>,
    /// One `ModelRun` error per individual whose evaluation failed
    pub failures: Vec<CalibrationError>,
    /// Wall-clock duration of the whole batch
    pub elapsed: Duration,
}

impl BatchOutcome {
    fn collect(results: Vec<Result<Individual>>, elapsed: Duration) -> Self {
        let mut outcome = BatchOutcome {
            elapsed,
            ..Default::default()
        };
        for result in results {
            match result {
                Ok(ind) => outcome.evaluated.push(ind),
                Err(e) => outcome.failures.push(e),
            }
        }
        outcome
    }

    pub fn len(&self) -> usize {
        self.evaluated.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Dispatches a batch of individuals to the evaluator
pub trait Scheduler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Every input individual ends up either in `evaluated` or in `failures`
    fn evaluate_batch(&self, batch: Vec<Individual>, evaluator: &dyn FitnessEvaluator) -> BatchOutcome;
}

/// Score one individual, tagging any failure with its provenance
pub fn evaluate_individual(mut individual: Individual, evaluator: &dyn FitnessEvaluator) -> Result<Individual> {
    match evaluator.evaluate(&individual.genes) {
        Ok(evaluation) => {
            log::debug!(
                "Individual {} evaluated: {:?}",
                individual.provenance,
                evaluation.values
            );
            individual.fitness.set(evaluation.values);
            individual.record = Some(evaluation.record);
            Ok(individual)
        }
        Err(CalibrationError::ModelRun { reason, .. }) => Err(CalibrationError::ModelRun {
            provenance: individual.provenance,
            reason,
        }),
        Err(e) => Err(CalibrationError::ModelRun {
            provenance: individual.provenance,
            reason: e.to_string(),
        }),
    }
}

/// Runs model evaluations one after the other on the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialScheduler;

impl Scheduler for SequentialScheduler {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn evaluate_batch(&self, batch: Vec<Individual>, evaluator: &dyn FitnessEvaluator) -> BatchOutcome {
        let start = Instant::now();
        let results: Vec<Result<Individual>> = batch
            .into_iter()
            .map(|ind| evaluate_individual(ind, evaluator))
            .collect();
        BatchOutcome::collect(results, start.elapsed())
    }
}

/// Runs model evaluations on a dedicated rayon thread pool
pub struct ParallelScheduler {
    pool: rayon::ThreadPool,
}

impl ParallelScheduler {
    /// `workers = None` uses one thread per available core
    pub fn new(workers: Option<usize>) -> Result<Self> {
        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("model-worker-{}", i));
        if let Some(n) = workers {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| CalibrationError::Configuration(format!("Failed to build worker pool: {}", e)))?;
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Scheduler for ParallelScheduler {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn evaluate_batch(&self, batch: Vec<Individual>, evaluator: &dyn FitnessEvaluator) -> BatchOutcome {
        let start = Instant::now();
        let results: Vec<Result<Individual>> = self.pool.install(|| {
            batch
                .into_par_iter()
                .map(|ind| evaluate_individual(ind, evaluator))
                .collect()
        });
        BatchOutcome::collect(results, start.elapsed())
    }
}

/// Scheduler selection, chosen once from the configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    Sequential,
    #[default]
    Parallel,
}

pub fn build_scheduler(kind: SchedulerKind, workers: Option<usize>) -> Result<Box<dyn Scheduler>> {
    Ok(match kind {
        SchedulerKind::Sequential => Box::new(SequentialScheduler),
        SchedulerKind::Parallel => Box::new(ParallelScheduler::new(workers)?),
    })
}
