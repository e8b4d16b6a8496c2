use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hydrocal::config::{ConfigManager, RunConfig};
use hydrocal::data::{CsvObservationStore, JsonlParameterStore, ObservationStore};
use hydrocal::engines::evaluation::{
    build_scheduler, CalibrationStep, CommandSimulator, ModelEvaluator, SchedulerKind,
};
use hydrocal::engines::generation::{CalibrationEngine, FileReportSink, LogProgressCallback};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "hydrocal")]
#[command(version)]
#[command(about = "Multi-objective NSGA-II calibration of a hydrological model")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to TOML configuration file
    #[arg(short, long, global = true, default_value = "calibration.toml")]
    config: PathBuf,

    /// Calibration step (Q, SED or NUTRIENT), overrides the configured one
    #[arg(short, long, global = true)]
    step: Option<CalibrationStep>,

    /// Random seed, overrides the configured one
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Evaluate model runs one after the other
    #[arg(long, global = true)]
    sequential: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the calibration (default)
    Run,
    /// Validate the configuration file and exit
    Validate,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let manager = ConfigManager::new();
    manager
        .load_from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    manager.update(|c| {
        if let Some(step) = args.step {
            if step != c.calibration.step {
                // Configured weights belong to the configured step
                c.calibration.weights = None;
            }
            c.calibration.step = step;
        }
        if args.seed.is_some() {
            c.optimization.seed = args.seed;
        }
        if args.sequential {
            c.optimization.scheduler = SchedulerKind::Sequential;
        }
    })?;

    let app = manager.get()?;
    let run = RunConfig::from_app_config(&app)?;

    if let Some(Commands::Validate) = args.command {
        println!(
            "Configuration OK: step {}, objectives [{}], {} parameter(s)",
            run.step,
            run.labels().join(", "),
            run.parameters.len()
        );
        return Ok(());
    }

    let variables = run.variables();
    let store = CsvObservationStore::open(&app.model.observation_file, &variables)
        .with_context(|| format!("reading observations from {}", app.model.observation_file.display()))?;
    // Every tracked variable must be scorable over the calibration period
    store.read_required(&variables, &run.calibration_period)?;
    let observed = store.read(&variables, &run.observation_period())?;

    let simulator = Arc::new(CommandSimulator::new(
        app.model.command.clone(),
        app.model.args.clone(),
        app.model.workdir.clone(),
        app.model.output_file.clone(),
        run.parameters.clone(),
        variables,
    ));
    let evaluator = Arc::new(ModelEvaluator::new(
        simulator,
        run.step,
        observed,
        run.calibration_period,
        run.validation_period,
    ));
    let scheduler = build_scheduler(app.optimization.scheduler, app.optimization.workers)?;

    let out_dir = app.calibration.out_dir.clone();
    let reporter = FileReportSink::create(&out_dir, run.step, run.validation_period.is_some())
        .with_context(|| format!("preparing output directory {}", out_dir.display()))?;
    let parameters = JsonlParameterStore::create(out_dir.join("parameters.jsonl"))?;

    let mut engine = CalibrationEngine::new(
        run,
        evaluator,
        scheduler,
        Box::new(parameters),
        Box::new(reporter),
    )?;
    let result = engine.run(LogProgressCallback)?;

    println!("{}", result.logbook);
    if let Some((generation, hv)) = result.hypervolumes.last() {
        println!("Final hypervolume (generation {}): {:.4}", generation, hv);
    }
    println!("{}", result.summary.timing_text());
    println!("Results written to {}", out_dir.display());
    Ok(())
}
