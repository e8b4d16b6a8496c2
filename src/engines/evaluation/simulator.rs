use crate::data::CsvConnector;
use crate::data::connectors::DATETIME_COLUMN;
use crate::error::{CalibrationError, Result};
use crate::types::{ExecutionTiming, ParameterDef, TimeSeries};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Series produced by one model run
#[derive(Debug, Clone, Default)]
pub struct ModelOutput {
    pub series: BTreeMap<String, TimeSeries>,
    pub timing: ExecutionTiming,
}

/// The hydrological model, treated as an opaque deterministic function of the
/// parameter vector. Implementations are shared between worker threads.
pub trait Simulator: Send + Sync {
    fn run(&self, parameters: &[f64]) -> Result<ModelOutput>;
}

/// Placeholder replaced by a unique run number in output paths
pub const RUN_ID_PLACEHOLDER: &str = "{run}";

/// Runs an external executable once per parameter vector.
///
/// The command receives its configured arguments followed by one
/// `NAME=value` argument per parameter and `OUTPUT=<path>`. It must write a
/// CSV with a `datetime` column and one column per simulated variable to that
/// path. Lines of its standard output of the form `IO_TIME=<s>`,
/// `COMP_TIME=<s>` and `SIMU_TIME=<s>` are picked up as timing; the wall time
/// is always measured here.
pub struct CommandSimulator {
    command: String,
    args: Vec<String>,
    workdir: Option<PathBuf>,
    output_file: String,
    parameters: Vec<ParameterDef>,
    variables: Vec<String>,
    run_counter: AtomicUsize,
}

impl CommandSimulator {
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        workdir: Option<PathBuf>,
        output_file: impl Into<String>,
        parameters: Vec<ParameterDef>,
        variables: Vec<String>,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            workdir,
            output_file: output_file.into(),
            parameters,
            variables,
            run_counter: AtomicUsize::new(0),
        }
    }

    /// Output name as passed to the model, relative to its working directory.
    /// Unique per run: without a `{run}` placeholder the run number is
    /// appended to the file stem, so concurrent runs never share a file.
    fn output_name(&self, run: usize) -> PathBuf {
        if self.output_file.contains(RUN_ID_PLACEHOLDER) {
            return PathBuf::from(self.output_file.replace(RUN_ID_PLACEHOLDER, &run.to_string()));
        }
        let file = Path::new(&self.output_file);
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let unique = match file.extension() {
            Some(ext) => format!("{}_{}.{}", stem, run, ext.to_string_lossy()),
            None => format!("{}_{}", stem, run),
        };
        file.with_file_name(unique)
    }

    /// Where the output of run `run` is read from
    fn output_path(&self, run: usize) -> PathBuf {
        let name = self.output_name(run);
        match &self.workdir {
            Some(dir) => dir.join(name),
            None => name,
        }
    }

    fn collect_output(&self, output: &Output, output_path: &Path, runtime: f64) -> Result<ModelOutput> {
        if !output.status.success() {
            return Err(CalibrationError::Simulator(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let mut timing = parse_timing(&String::from_utf8_lossy(&output.stdout));
        timing.runtime = runtime;

        let df = CsvConnector::load(output_path)
            .map_err(|e| CalibrationError::Simulator(format!("no model output: {}", e)))?;
        let series = CsvConnector::extract_series(&df, DATETIME_COLUMN, &self.variables)?;

        Ok(ModelOutput { series, timing })
    }
}

impl Simulator for CommandSimulator {
    fn run(&self, parameters: &[f64]) -> Result<ModelOutput> {
        if parameters.len() != self.parameters.len() {
            return Err(CalibrationError::Simulator(format!(
                "expected {} parameter values, got {}",
                self.parameters.len(),
                parameters.len()
            )));
        }

        let run = self.run_counter.fetch_add(1, Ordering::Relaxed);
        let output_path = self.output_path(run);

        let mut command = Command::new(&self.command);
        command.args(&self.args);
        for (def, value) in self.parameters.iter().zip(parameters) {
            command.arg(format!("{}={}", def.name, value));
        }
        command.arg(format!("OUTPUT={}", self.output_name(run).display()));
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }

        let start = Instant::now();
        let output = command
            .output()
            .map_err(|e| CalibrationError::Simulator(format!("failed to launch {}: {}", self.command, e)))?;
        let runtime = start.elapsed().as_secs_f64();

        let result = self.collect_output(&output, &output_path, runtime);
        if output_path.exists() {
            if let Err(e) = std::fs::remove_file(&output_path) {
                log::debug!("Could not remove {}: {}", output_path.display(), e);
            }
        }
        result
    }
}

fn parse_timing(stdout: &str) -> ExecutionTiming {
    let mut timing = ExecutionTiming::default();
    for line in stdout.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        let Ok(value) = value.trim().parse::<f64>() else {
            continue;
        };
        match key.trim() {
            "IO_TIME" => timing.io_time = value,
            "COMP_TIME" => timing.comp_time = value,
            "SIMU_TIME" => timing.simu_time = value,
            _ => {}
        }
    }
    timing
}
