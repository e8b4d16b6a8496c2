use chrono::{NaiveDate, NaiveDateTime};
use hydrocal::config::{ConfigManager, OptimizationConfig, RunConfig};
use hydrocal::data::MemoryParameterStore;
use hydrocal::engines::evaluation::{
    CalibrationStep, Evaluation, FitnessEvaluator, ParallelScheduler, Scheduler, SequentialScheduler,
};
use hydrocal::engines::generation::individual::{Fitness, Individual, SimulationRecord};
use hydrocal::engines::generation::operators::vary;
use hydrocal::engines::generation::pareto::{dominates, fast_non_dominated_sort, select_nsga2};
use hydrocal::engines::generation::{
    merge_unique, CalibrationEngine, ChannelProgressCallback, FileReportSink, GenerationReport,
    MemoryReportSink, ProgressCallback, ProgressMessage, ReportSink, RunSummary,
};
use hydrocal::engines::metrics::Logbook;
use hydrocal::error::{CalibrationError, Result};
use hydrocal::types::{ParameterDef, Period, Provenance};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const Q_WEIGHTS: [f64; 3] = [2.0, -1.0, -1.0];

type ScoreFn = dyn Fn(usize, &[f64]) -> Result<Vec<f64>> + Send + Sync;

/// Evaluator returning whatever `score` computes; `score` also receives the call number
struct StubEvaluator {
    calls: AtomicUsize,
    score: Box<ScoreFn>,
}

impl StubEvaluator {
    fn new<F>(score: F) -> Self
    where
        F: Fn(usize, &[f64]) -> Result<Vec<f64>> + Send + Sync + 'static,
    {
        Self {
            calls: AtomicUsize::new(0),
            score: Box::new(score),
        }
    }

    fn constant(values: Vec<f64>) -> Self {
        Self::new(move |_, _| Ok(values.clone()))
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FitnessEvaluator for StubEvaluator {
    fn labels(&self) -> Vec<String> {
        CalibrationStep::Discharge.labels()
    }

    fn evaluate(&self, genes: &[f64]) -> Result<Evaluation> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Evaluation {
            values: (self.score)(call, genes)?,
            record: SimulationRecord::default(),
        })
    }
}

/// Report sink whose records stay readable after the engine owns it
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<MemoryReportSink>>);

impl ReportSink for SharedSink {
    fn on_population(&mut self, generation: usize, population: &[Individual], labels: &[String]) -> Result<()> {
        self.0.lock().unwrap().on_population(generation, population, labels)
    }

    fn on_generation(&mut self, report: &GenerationReport) -> Result<()> {
        self.0.lock().unwrap().on_generation(report)
    }

    fn on_finish(
        &mut self,
        summary: &RunSummary,
        logbook: &Logbook,
        population: &[Individual],
        labels: &[String],
    ) -> Result<()> {
        self.0.lock().unwrap().on_finish(summary, logbook, population, labels)
    }
}

struct CountingCallback {
    started: Vec<usize>,
    completed: Vec<usize>,
}

impl ProgressCallback for &mut CountingCallback {
    fn on_generation_start(&mut self, generation: usize) {
        self.started.push(generation);
    }

    fn on_generation_complete(&mut self, generation: usize, _hypervolume: f64, _population_size: usize) {
        self.completed.push(generation);
    }

    fn on_batch_evaluated(&mut self, _generation: usize, _evaluated: usize, _failed: usize) {}
}

fn day(d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2014, 1, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
}

fn run_config(npop: usize, ngens: usize, configure: impl FnOnce(&mut OptimizationConfig)) -> RunConfig {
    let mut optimization = OptimizationConfig {
        npop,
        ngens,
        seed: Some(42),
        ..Default::default()
    };
    configure(&mut optimization);
    RunConfig::new(
        CalibrationStep::Discharge,
        Q_WEIGHTS.to_vec(),
        vec![ParameterDef::new("CN2", 0.0, 1.0)],
        &optimization,
        Period::new(day(1), day(31)),
        None,
    )
    .unwrap()
}

fn engine(
    config: RunConfig,
    evaluator: Arc<StubEvaluator>,
    scheduler: Box<dyn Scheduler>,
    sink: SharedSink,
) -> CalibrationEngine {
    CalibrationEngine::new(
        config,
        evaluator,
        scheduler,
        Box::new(MemoryParameterStore::new()),
        Box::new(sink),
    )
    .unwrap()
}

fn scored(index: usize, values: Vec<f64>) -> Individual {
    let mut ind = Individual::new(vec![0.5], Provenance::new(0, index));
    ind.fitness = Fitness::new(values);
    ind
}

#[test]
fn test_identical_fitness_shares_front_zero_and_hypervolume() {
    let evaluator = Arc::new(StubEvaluator::constant(vec![0.8, 0.2, 5.0]));
    let sink = SharedSink::default();
    let mut engine = engine(run_config(4, 1, |_| {}), evaluator.clone(), Box::new(SequentialScheduler), sink.clone());

    let mut callback = CountingCallback { started: vec![], completed: vec![] };
    let result = engine.run(&mut callback).unwrap();

    // Reference point (2, 100, 10) against point (-1.6, 0.2, 5)
    let (generation, hv) = result.hypervolumes[0];
    assert_eq!(generation, 0);
    assert!((hv - 3.6 * 99.8 * 5.0).abs() < 1e-6, "hypervolume {}", hv);
    assert!(result.hypervolumes.iter().all(|(_, v)| v.is_finite()));

    assert_eq!(result.population.len(), 3);
    assert!(result.population.iter().all(|ind| ind.rank == 0));
    assert_eq!(result.logbook.len(), result.hypervolumes.len());
    assert_eq!(callback.started.first(), Some(&0));
    assert_eq!(callback.completed.first(), Some(&0));

    let sink = sink.0.lock().unwrap();
    assert_eq!(sink.generations[0].new_runs, 4);
    assert_eq!(sink.populations[0].1.len(), 3);
    assert_eq!(sink.summary.as_ref().unwrap().runs_per_generation[&0], 4);
}

#[test]
fn test_identical_fitness_is_mutually_non_dominated() {
    let mut pool: Vec<Individual> = (0..4).map(|i| scored(i, vec![0.8, 0.2, 5.0])).collect();
    let fronts = fast_non_dominated_sort(&mut pool, &Q_WEIGHTS);
    assert_eq!(fronts, vec![vec![0, 1, 2, 3]]);
}

#[test]
fn test_single_failure_keeps_remaining_batch() {
    let evaluator = StubEvaluator::new(|_, genes| {
        if genes[0] > 0.9 {
            Err(CalibrationError::Simulator("model crashed".to_string()))
        } else {
            Ok(vec![genes[0], 0.2, 5.0])
        }
    });
    let batch: Vec<Individual> = [0.1, 0.3, 0.95, 0.5, 0.7]
        .iter()
        .enumerate()
        .map(|(i, g)| Individual::new(vec![*g], Provenance::new(3, i)))
        .collect();

    let outcome = SequentialScheduler.evaluate_batch(batch, &evaluator);
    assert_eq!(outcome.evaluated.len(), 4);
    assert_eq!(outcome.failures.len(), 1);
    match &outcome.failures[0] {
        CalibrationError::ModelRun { provenance, .. } => assert_eq!(*provenance, Provenance::new(3, 2)),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_run_proceeds_after_model_failure() {
    // Third model run of the whole calibration fails
    let evaluator = Arc::new(StubEvaluator::new(|call, genes| {
        if call == 2 {
            Err(CalibrationError::Simulator("no output file".to_string()))
        } else {
            Ok(vec![genes[0], 1.0 - genes[0], 5.0])
        }
    }));
    let sink = SharedSink::default();
    let mut engine = engine(run_config(5, 2, |_| {}), evaluator, Box::new(SequentialScheduler), sink.clone());

    let result = engine.run(hydrocal::engines::generation::LogProgressCallback).unwrap();
    assert_eq!(result.population.len(), 4);

    let sink = sink.0.lock().unwrap();
    assert_eq!(sink.generations[0].new_runs, 5);
    assert_eq!(sink.generations[0].failed_runs, 1);
    assert_eq!(result.summary.runs_per_generation[&0], 5);
    assert_eq!(result.summary.model_timings.len(), result.summary.total_runs() - 1);
}

#[test]
fn test_batch_progress_reports_failures() {
    let evaluator = Arc::new(StubEvaluator::new(|call, genes| {
        if call == 2 {
            Err(CalibrationError::Simulator("no output file".to_string()))
        } else {
            Ok(vec![genes[0], 1.0 - genes[0], 5.0])
        }
    }));
    let mut engine = engine(run_config(5, 2, |_| {}), evaluator, Box::new(SequentialScheduler), SharedSink::default());

    let (sender, receiver) = std::sync::mpsc::channel();
    let result = engine.run(ChannelProgressCallback::new(sender)).unwrap();

    let batches: Vec<(usize, usize, usize)> = receiver
        .try_iter()
        .filter_map(|message| match message {
            ProgressMessage::BatchEvaluated { generation, evaluated, failed } => {
                Some((generation, evaluated, failed))
            }
            _ => None,
        })
        .collect();

    assert_eq!(batches[0], (0, 4, 1));
    assert_eq!(batches.len(), result.summary.runs_per_generation.len());
    for (generation, evaluated, failed) in batches {
        assert_eq!(evaluated + failed, result.summary.runs_per_generation[&generation]);
    }
}

#[test]
fn test_summary_times_add_up_over_generations() {
    let evaluator = Arc::new(StubEvaluator::new(|_, genes| {
        std::thread::sleep(std::time::Duration::from_millis(2));
        Ok(vec![genes[0], 1.0 - genes[0], 5.0])
    }));
    let sink = SharedSink::default();
    let mut engine = engine(run_config(6, 3, |_| {}), evaluator, Box::new(SequentialScheduler), sink.clone());
    let result = engine.run(hydrocal::engines::generation::LogProgressCallback).unwrap();

    let summary = &result.summary;
    let sink = sink.0.lock().unwrap();
    let batch_time: f64 = sink.generations.iter().map(|g| g.exec_time).sum();
    assert!((summary.exec_time - batch_time).abs() < 1e-9);
    assert!(summary.exec_time > 0.0);
    assert!(summary.init_time >= 0.0);
    assert!(summary.wall_time >= summary.exec_time + summary.init_time);

    let text = summary.timing_text();
    assert!(text.contains("Initialization time:"));
    assert!(text.contains(&format!("Model execution time: {:.3}s", summary.exec_time)));
    assert!(text.contains("Sum of model run time:"));
}

#[test]
fn test_viability_filter_drops_offspring_from_merged_pool() {
    // Initial population is viable, every offspring has NSE -1 but better RSR and PBIAS
    let score = |call: usize, _: &[f64]| -> Result<Vec<f64>> {
        if call < 6 {
            Ok(vec![0.5, 0.2, 5.0])
        } else {
            Ok(vec![-1.0, 0.0, 0.0])
        }
    };

    let sink = SharedSink::default();
    let config = run_config(6, 2, |o| {
        o.filter_nse = true;
        o.rcross = 1.0;
    });
    let mut filtered = engine(config, Arc::new(StubEvaluator::new(score)), Box::new(SequentialScheduler), sink.clone());
    let result = filtered.run(hydrocal::engines::generation::LogProgressCallback).unwrap();

    assert_eq!(result.summary.generations_completed, 2);
    assert_eq!(sink.0.lock().unwrap().generations[1].new_runs, 4);
    assert_eq!(result.population.len(), 4);
    assert!(result
        .population
        .iter()
        .all(|ind| ind.provenance.generation == 0 && ind.objectives()[0] > 0.0));

    // Without the filter the non-dominated offspring make it into the survivors
    let config = run_config(6, 2, |o| o.rcross = 1.0);
    let mut unfiltered = engine(config, Arc::new(StubEvaluator::new(score)), Box::new(SequentialScheduler), SharedSink::default());
    let result = unfiltered.run(hydrocal::engines::generation::LogProgressCallback).unwrap();
    assert!(result.population.iter().any(|ind| ind.provenance.generation > 0));
}

#[test]
fn test_viability_filter_collapses_initial_population() {
    let evaluator = Arc::new(StubEvaluator::constant(vec![-0.5, 1.2, 40.0]));
    let sink = SharedSink::default();
    let config = run_config(6, 3, |o| o.filter_nse = true);
    let mut engine = engine(config, evaluator.clone(), Box::new(SequentialScheduler), sink.clone());

    let mut callback = CountingCallback { started: vec![], completed: vec![] };
    match engine.run(&mut callback) {
        Err(CalibrationError::PopulationCollapse { generation, remaining, .. }) => {
            assert_eq!(generation, 0);
            assert_eq!(remaining, 0);
        }
        other => panic!("expected a population collapse, got {:?}", other.map(|r| r.population.len())),
    }
    assert_eq!(evaluator.calls(), 6);
    assert!(callback.completed.is_empty());
    assert!(sink.0.lock().unwrap().generations.is_empty());
}

#[test]
fn test_viability_filter_disabled_keeps_negative_nse() {
    let evaluator = Arc::new(StubEvaluator::constant(vec![-0.5, 1.2, 40.0]));
    let mut engine = engine(run_config(4, 1, |_| {}), evaluator, Box::new(SequentialScheduler), SharedSink::default());
    let result = engine.run(hydrocal::engines::generation::LogProgressCallback).unwrap();
    assert_eq!(result.population.len(), 3);
}

#[test]
fn test_no_crossover_terminates_early() {
    let evaluator = Arc::new(StubEvaluator::new(|_, genes| Ok(vec![genes[0], 0.2, 5.0])));
    let sink = SharedSink::default();
    let config = run_config(4, 5, |o| o.rcross = 0.0);
    let mut engine = engine(config, evaluator.clone(), Box::new(SequentialScheduler), sink.clone());

    let mut callback = CountingCallback { started: vec![], completed: vec![] };
    let result = engine.run(&mut callback).unwrap();

    assert!(result.summary.early_terminated);
    assert_eq!(result.summary.generations_completed, 0);
    assert_eq!(evaluator.calls(), 4);
    assert_eq!(result.hypervolumes.len(), 1);
    assert_eq!(callback.completed, vec![0]);
    assert_eq!(sink.0.lock().unwrap().generations.len(), 1);
}

#[test]
fn test_same_seed_same_result_for_both_schedulers() {
    let score = |_: usize, genes: &[f64]| -> Result<Vec<f64>> {
        let x = genes[0];
        Ok(vec![1.0 - (x - 0.3).powi(2), (x - 0.3).abs(), 100.0 * (x - 0.5).abs()])
    };
    let run = |scheduler: Box<dyn Scheduler>| {
        let evaluator = Arc::new(StubEvaluator::new(score));
        let mut engine = engine(run_config(10, 4, |_| {}), evaluator, scheduler, SharedSink::default());
        engine.run(hydrocal::engines::generation::LogProgressCallback).unwrap()
    };

    let sequential = run(Box::new(SequentialScheduler));
    let parallel = run(Box::new(ParallelScheduler::new(Some(3)).unwrap()));

    let genes = |r: &hydrocal::engines::generation::CalibrationResult| {
        r.population.iter().map(|i| (i.provenance, i.genes.clone())).collect::<Vec<_>>()
    };
    assert_eq!(genes(&sequential), genes(&parallel));
    assert_eq!(sequential.hypervolumes, parallel.hypervolumes);
}

#[test]
fn test_merge_deduplicates_by_provenance() {
    let survivor = scored(1, vec![0.5, 0.5, 1.0]);
    let mut copy = survivor.clone();
    copy.genes = vec![0.9];

    let merged = merge_unique(vec![survivor], vec![copy], vec![scored(2, vec![0.6, 0.4, 2.0])]);
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].genes, vec![0.5]);
}

#[test]
fn test_select_returns_k_in_front_order() {
    let pool = vec![
        scored(0, vec![0.2, 0.8, 30.0]), // dominated by 1
        scored(1, vec![0.6, 0.4, 10.0]),
        scored(2, vec![0.9, 0.1, 20.0]),
        scored(3, vec![0.1, 0.9, 40.0]), // dominated by everyone
        scored(4, vec![0.5, 0.3, 5.0]),
    ];
    let survivors = select_nsga2(pool, 4, &Q_WEIGHTS);
    assert_eq!(survivors.len(), 4);

    let ids: Vec<usize> = survivors.iter().map(|i| i.provenance.index).collect();
    assert!(!ids.contains(&3));
    assert!(ids.contains(&0));
    let ranks: Vec<usize> = survivors.iter().map(|i| i.rank).collect();
    assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_dominance_is_antisymmetric_and_transitive() {
    let mut rng = StdRng::seed_from_u64(11);
    let points: Vec<Vec<f64>> = (0..30)
        .map(|_| (0..3).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect();

    for a in &points {
        assert!(!dominates(a, a, &Q_WEIGHTS));
        for b in &points {
            if dominates(a, b, &Q_WEIGHTS) {
                assert!(!dominates(b, a, &Q_WEIGHTS));
                for c in &points {
                    if dominates(b, c, &Q_WEIGHTS) {
                        assert!(dominates(a, c, &Q_WEIGHTS));
                    }
                }
            }
        }
    }
}

#[test]
fn test_variation_respects_bounds() {
    let low = [0.0, -20.0, 0.01];
    let up = [1.0, 20.0, 1.0];
    let mut rng = StdRng::seed_from_u64(5);
    let mut pool: Vec<Individual> = (0..8)
        .map(|i| {
            let genes = low.iter().zip(&up).map(|(l, u)| rng.gen_range(*l..=*u)).collect();
            Individual::new(genes, Provenance::new(0, i))
        })
        .collect();

    for _ in 0..50 {
        vary(&mut pool, 1.0, 0.5, &low, &up, &mut rng);
        for ind in &pool {
            for ((x, l), u) in ind.genes.iter().zip(&low).zip(&up) {
                assert!(x >= l && x <= u, "{} outside [{}, {}]", x, l, u);
            }
        }
    }
}

#[test]
fn test_file_reports_for_full_run() {
    let dir = tempfile::tempdir().unwrap();
    let reporter = FileReportSink::create(dir.path(), CalibrationStep::Discharge, false).unwrap();
    let evaluator = Arc::new(StubEvaluator::new(|_, genes| Ok(vec![genes[0], 0.5, 3.0])));

    let mut engine = CalibrationEngine::new(
        run_config(6, 2, |_| {}),
        evaluator,
        Box::new(SequentialScheduler),
        Box::new(MemoryParameterStore::new()),
        Box::new(reporter),
    )
    .unwrap();
    let result = engine.run(hydrocal::engines::generation::LogProgressCallback).unwrap();

    let hv_log = std::fs::read_to_string(dir.path().join(FileReportSink::HYPERVOLUME_LOG)).unwrap();
    assert_eq!(hv_log.lines().count(), result.hypervolumes.len());
    assert!(dir.path().join("simdata").join("gen_0.json").exists());
    assert!(dir.path().join(FileReportSink::PARETO_FRONT).exists());
    assert!(dir.path().join(FileReportSink::LOGBOOK).exists());
}

#[test]
fn test_mismatched_weights_rejected_at_startup() {
    let optimization = OptimizationConfig::default();
    let err = RunConfig::new(
        CalibrationStep::Sediment,
        Q_WEIGHTS.to_vec(),
        vec![ParameterDef::new("USLE_P", 0.0, 1.0)],
        &optimization,
        Period::new(day(1), day(31)),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, CalibrationError::Configuration(_)));
}

#[test]
fn test_config_file_with_env_override() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calibration.toml");
    std::fs::write(
        &path,
        r#"
[optimization]
npop = 12
ngens = 3
rsel = 0.5
seed = 7
filter_nse = true
scheduler = "sequential"

[calibration]
step = "SED"
out_dir = "out"

[calibration.simulation_period]
start = "2014-01-01 00:00:00"
end = "2014-06-30 00:00:00"

[calibration.validation_period]
start = "2014-07-01 00:00:00"
end = "2014-12-31 00:00:00"

[[calibration.parameters]]
name = "USLE_P"
low = 0.0
up = 1.0

[[calibration.parameters]]
name = "SPCON"
low = 0.0001
up = 0.01

[model]
command = "./model"
output_file = "out_{run}.csv"
observation_file = "obs.csv"
"#,
    )
    .unwrap();

    std::env::set_var("HYDROCAL__OPTIMIZATION__NGENS", "9");
    let manager = ConfigManager::new();
    let loaded = manager.load_from_file(&path);
    std::env::remove_var("HYDROCAL__OPTIMIZATION__NGENS");
    loaded.unwrap();

    let run = RunConfig::from_app_config(&manager.get().unwrap()).unwrap();
    assert_eq!(run.step, CalibrationStep::Sediment);
    assert_eq!(run.npop, 12);
    assert_eq!(run.ngens, 9);
    assert_eq!(run.pop_select_num, 6);
    assert!(run.filter_nse);
    assert_eq!(run.weights, vec![2.0, -1.0, -1.0, 1.0]);
    assert_eq!(run.low, vec![0.0, 0.0001]);
    assert!(run.validation_period.is_some());
    assert_eq!(run.labels().len(), 4);
}
