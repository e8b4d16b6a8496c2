use crate::config::RunConfig;
use crate::data::ParameterStore;
use crate::engines::evaluation::{BatchOutcome, FitnessEvaluator, Scheduler};
use crate::engines::generation::individual::Individual;
use crate::engines::generation::operators::{random_genome, vary};
use crate::engines::generation::pareto::select_nsga2;
use crate::engines::generation::report::{GenerationReport, ReportSink, RunSummary};
use crate::engines::metrics::{hypervolume, reference_point, FitnessStatistics, Logbook};
use crate::error::{CalibrationError, Result};
use crate::types::Provenance;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Fewest viable individuals selection can work with
pub const MIN_VIABLE: usize = 2;

pub trait ProgressCallback: Send {
    fn on_generation_start(&mut self, generation: usize);
    fn on_generation_complete(&mut self, generation: usize, hypervolume: f64, population_size: usize);
    /// A batch of `generation` came back: `evaluated` runs succeeded, `failed` did not
    fn on_batch_evaluated(&mut self, generation: usize, evaluated: usize, failed: usize);
}

/// Where the driver currently is, reported with fatal errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Init,
    EvaluatingGen0,
    Selecting,
    Varying(usize),
    EvaluatingGen(usize),
    MergingAndSelecting(usize),
    Done,
}

impl EnginePhase {
    pub fn generation(&self) -> usize {
        match self {
            EnginePhase::Init | EnginePhase::EvaluatingGen0 | EnginePhase::Selecting => 0,
            EnginePhase::Varying(g) | EnginePhase::EvaluatingGen(g) | EnginePhase::MergingAndSelecting(g) => *g,
            EnginePhase::Done => 0,
        }
    }
}

impl fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnginePhase::Init => "initial sampling",
            EnginePhase::EvaluatingGen0 => "initial population evaluation",
            EnginePhase::Selecting => "initial selection",
            EnginePhase::Varying(_) => "variation",
            EnginePhase::EvaluatingGen(_) => "offspring evaluation",
            EnginePhase::MergingAndSelecting(_) => "merge and selection",
            EnginePhase::Done => "final reporting",
        };
        f.write_str(name)
    }
}

/// Outcome of a complete calibration run
#[derive(Debug, Clone)]
pub struct CalibrationResult {
    /// Final survivors, sorted by fitness
    pub population: Vec<Individual>,
    pub logbook: Logbook,
    pub labels: Vec<String>,
    /// `(generation, hypervolume)` for generation 0 and every completed generation
    pub hypervolumes: Vec<(usize, f64)>,
    pub summary: RunSummary,
}

/// Generational NSGA-II driver
pub struct CalibrationEngine {
    config: RunConfig,
    evaluator: Arc<dyn FitnessEvaluator>,
    scheduler: Box<dyn Scheduler>,
    parameter_store: Box<dyn ParameterStore>,
    reporter: Box<dyn ReportSink>,
    reference: Vec<f64>,
    phase: EnginePhase,
    rng: StdRng,
}

impl CalibrationEngine {
    pub fn new(
        config: RunConfig,
        evaluator: Arc<dyn FitnessEvaluator>,
        scheduler: Box<dyn Scheduler>,
        parameter_store: Box<dyn ParameterStore>,
        reporter: Box<dyn ReportSink>,
    ) -> Result<Self> {
        let labels = evaluator.labels();
        if labels.len() != config.weights.len() {
            return Err(CalibrationError::Configuration(format!(
                "Evaluator produces {} objectives ({}) but {} weights are configured",
                labels.len(),
                labels.join(", "),
                config.weights.len()
            )));
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let reference = reference_point(&config.worst, &config.weights);

        Ok(Self {
            config,
            evaluator,
            scheduler,
            parameter_store,
            reporter,
            reference,
            phase: EnginePhase::Init,
            rng,
        })
    }

    /// Run the calibration to completion
    pub fn run<C: ProgressCallback>(&mut self, mut callback: C) -> Result<CalibrationResult> {
        let run_start = Instant::now();
        let labels = self.evaluator.labels();
        let mut logbook = Logbook::new();
        let mut hypervolumes = Vec::new();
        let mut summary = RunSummary::default();

        log::info!(
            "Calibration step {}: {} parameter(s), npop={}, ngens={}, survivors={}, scheduler={}",
            self.config.step,
            self.config.parameters.len(),
            self.config.npop,
            self.config.ngens,
            self.config.pop_select_num,
            self.scheduler.name()
        );

        // Initial population
        self.phase = EnginePhase::Init;
        callback.on_generation_start(0);
        let population = self.initialize_population();
        self.persist(0, &population)?;
        summary.init_time = run_start.elapsed().as_secs_f64();

        self.phase = EnginePhase::EvaluatingGen0;
        let outcome = self.dispatch(population, &mut callback);
        let report = self.batch_report(0, &outcome);
        for ind in &outcome.evaluated {
            summary.model_timings.push(ind.timing());
        }
        summary.runs_per_generation.insert(0, outcome.len());
        summary.exec_time += report.exec_time;

        let viable = self.filter_viable(outcome.evaluated);
        self.ensure_viable(viable.len())?;

        self.phase = EnginePhase::Selecting;
        let mut population = select_nsga2(viable, self.config.pop_select_num, &self.config.weights);
        let hv = self.record_generation(0, report.new_runs, &population, &mut logbook)?;
        hypervolumes.push((0, hv));
        self.reporter.on_generation(&GenerationReport {
            hypervolume: hv,
            population_size: population.len(),
            ..report
        })?;
        callback.on_generation_complete(0, hv, population.len());

        for generation in 1..=self.config.ngens {
            callback.on_generation_start(generation);

            self.phase = EnginePhase::Varying(generation);
            let mut offspring = population.clone();
            vary(
                &mut offspring,
                self.config.crossover_rate,
                self.config.mutation_rate,
                &self.config.low,
                &self.config.up,
                &mut self.rng,
            );

            let (unchanged, mut batch): (Vec<Individual>, Vec<Individual>) =
                offspring.into_iter().partition(|ind| ind.fitness.is_valid());
            if batch.is_empty() {
                log::warn!(
                    "Generation {}: no offspring needs evaluation, stopping early",
                    generation
                );
                summary.early_terminated = true;
                break;
            }

            for (index, ind) in batch.iter_mut().enumerate() {
                ind.provenance = Provenance::new(generation, index);
                ind.record = None;
            }
            self.persist(generation, &batch)?;

            self.phase = EnginePhase::EvaluatingGen(generation);
            let outcome = self.dispatch(batch, &mut callback);
            let report = self.batch_report(generation, &outcome);
            for ind in &outcome.evaluated {
                summary.model_timings.push(ind.timing());
            }
            summary.runs_per_generation.insert(generation, outcome.len());
            summary.exec_time += report.exec_time;

            self.phase = EnginePhase::MergingAndSelecting(generation);
            let merged = merge_unique(population, unchanged, outcome.evaluated);
            let viable = self.filter_viable(merged);
            self.ensure_viable(viable.len())?;
            population = select_nsga2(viable, self.config.pop_select_num, &self.config.weights);

            let hv = self.record_generation(generation, report.new_runs, &population, &mut logbook)?;
            hypervolumes.push((generation, hv));
            self.reporter.on_generation(&GenerationReport {
                hypervolume: hv,
                population_size: population.len(),
                ..report
            })?;
            summary.generations_completed = generation;
            callback.on_generation_complete(generation, hv, population.len());
        }

        self.phase = EnginePhase::Done;
        population.sort_by(|a, b| {
            a.objectives()
                .partial_cmp(b.objectives())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        summary.wall_time = run_start.elapsed().as_secs_f64();
        summary.runtime_sum = summary.model_timings.iter().map(|t| t.runtime).sum();
        log::info!(
            "Calibration finished after {} generation(s), {} model run(s), {:.3}s",
            summary.generations_completed,
            summary.total_runs(),
            summary.wall_time
        );
        log::info!("{}", summary.timing_text());
        self.reporter
            .on_finish(&summary, &logbook, &population, &labels)?;

        Ok(CalibrationResult {
            population,
            logbook,
            labels,
            hypervolumes,
            summary,
        })
    }

    fn initialize_population(&mut self) -> Vec<Individual> {
        (0..self.config.npop)
            .map(|i| {
                let genes = random_genome(&self.config.low, &self.config.up, &mut self.rng);
                Individual::new(genes, Provenance::new(0, i))
            })
            .collect()
    }

    fn persist(&mut self, generation: usize, individuals: &[Individual]) -> Result<()> {
        let rows: Vec<(Provenance, Vec<f64>)> = individuals
            .iter()
            .map(|ind| (ind.provenance, ind.genes.clone()))
            .collect();
        let phase = self.phase;
        self.parameter_store
            .write(generation, &self.config.parameters, &rows)
            .map_err(|e| {
                CalibrationError::Persistence(format!("generation {} ({}): {}", generation, phase, e))
            })
    }

    fn dispatch<C: ProgressCallback>(&self, batch: Vec<Individual>, callback: &mut C) -> BatchOutcome {
        let outcome = self.scheduler.evaluate_batch(batch, self.evaluator.as_ref());
        for failure in &outcome.failures {
            log::warn!("{}", failure);
        }
        callback.on_batch_evaluated(
            self.phase.generation(),
            outcome.evaluated.len(),
            outcome.failures.len(),
        );
        outcome
    }

    fn batch_report(&self, generation: usize, outcome: &BatchOutcome) -> GenerationReport {
        GenerationReport {
            generation,
            new_runs: outcome.len(),
            failed_runs: outcome.failures.len(),
            exec_time: outcome.elapsed.as_secs_f64(),
            runtime_sum: outcome.evaluated.iter().map(|i| i.timing().runtime).sum(),
            hypervolume: 0.0,
            population_size: 0,
        }
    }

    /// Primary objective must be positive when filtering is enabled
    fn is_viable(&self, individual: &Individual) -> bool {
        if !individual.fitness.is_valid() {
            return false;
        }
        !self.config.filter_nse || individual.objectives().first().is_some_and(|v| *v > 0.0)
    }

    fn filter_viable(&self, pool: Vec<Individual>) -> Vec<Individual> {
        let before = pool.len();
        let viable: Vec<Individual> = pool.into_iter().filter(|ind| self.is_viable(ind)).collect();
        if viable.len() < before {
            log::info!(
                "{}: {} of {} individual(s) discarded by the viability filter",
                self.phase,
                before - viable.len(),
                before
            );
        }
        viable
    }

    fn ensure_viable(&self, remaining: usize) -> Result<()> {
        if remaining < MIN_VIABLE {
            return Err(CalibrationError::PopulationCollapse {
                generation: self.phase.generation(),
                operation: self.phase.to_string(),
                remaining,
            });
        }
        Ok(())
    }

    fn record_generation(
        &mut self,
        generation: usize,
        evals: usize,
        population: &[Individual],
        logbook: &mut Logbook,
    ) -> Result<f64> {
        let fitness: Vec<Vec<f64>> = population.iter().map(|i| i.objectives().to_vec()).collect();
        if let Some(stats) = FitnessStatistics::compile(&fitness) {
            logbook.record(generation, evals, stats);
            if let Some(record) = logbook.last() {
                log::info!("{}", Logbook::stream(record));
            }
        }

        let hv = hypervolume(&fitness, &self.config.weights, &self.reference);
        log::info!("Generation {}: hypervolume {:.4}", generation, hv);

        self.reporter
            .on_population(generation, population, &self.config.labels())?;
        Ok(hv)
    }
}

/// Concatenate pools, keeping the first individual seen for each provenance
pub fn merge_unique(
    survivors: Vec<Individual>,
    unchanged: Vec<Individual>,
    evaluated: Vec<Individual>,
) -> Vec<Individual> {
    let mut seen: HashSet<Provenance> = HashSet::new();
    survivors
        .into_iter()
        .chain(unchanged)
        .chain(evaluated)
        .filter(|ind| seen.insert(ind.provenance))
        .collect()
}
