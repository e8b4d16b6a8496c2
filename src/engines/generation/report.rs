//! Reporting hand-off of the generational driver.
//!
//! The driver pushes per-generation records and a final summary into a
//! [`ReportSink`]; nothing flows back into the optimization.

use crate::engines::evaluation::CalibrationStep;
use crate::engines::generation::individual::Individual;
use crate::engines::metrics::{Logbook, Metric, PeriodEfficiency};
use crate::error::Result;
use crate::types::{ExecutionTiming, Provenance};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Per-generation convergence record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub generation: usize,
    /// Model runs dispatched in this generation
    pub new_runs: usize,
    pub failed_runs: usize,
    /// Wall time of the evaluation batch, seconds
    pub exec_time: f64,
    /// Sum of the individual model run times, seconds
    pub runtime_sum: f64,
    pub hypervolume: f64,
    pub population_size: usize,
}

/// Aggregates over the whole run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Sampling and persisting the initial population, seconds
    pub init_time: f64,
    /// Sum of the batch evaluation timespans, seconds
    pub exec_time: f64,
    /// Sum of the individual model run times, seconds
    pub runtime_sum: f64,
    /// Whole run, seconds
    pub wall_time: f64,
    pub runs_per_generation: BTreeMap<usize, usize>,
    pub model_timings: Vec<ExecutionTiming>,
    pub generations_completed: usize,
    pub early_terminated: bool,
}

impl RunSummary {
    pub fn total_runs(&self) -> usize {
        self.runs_per_generation.values().sum()
    }

    /// Column-wise MAX, MIN, AVG and SUM of IO/COMP/SIMU/RUNTIME over all runs
    pub fn timing_table(&self) -> Option<[[f64; 4]; 4]> {
        if self.model_timings.is_empty() {
            return None;
        }
        let mut max = [f64::NEG_INFINITY; 4];
        let mut min = [f64::INFINITY; 4];
        let mut sum = [0.0; 4];
        for timing in &self.model_timings {
            for (i, v) in timing.as_array().iter().enumerate() {
                max[i] = max[i].max(*v);
                min[i] = min[i].min(*v);
                sum[i] += v;
            }
        }
        let n = self.model_timings.len() as f64;
        let avg = sum.map(|s| s / n);
        Some([max, min, avg, sum])
    }

    pub fn timing_text(&self) -> String {
        let mut text = String::from("Running time of all model runs:\n\tIO\tCOMP\tSIMU\tRUNTIME\n");
        if let Some(table) = self.timing_table() {
            for (name, row) in ["MAX", "MIN", "AVG", "SUM"].iter().zip(table.iter()) {
                let cells: Vec<String> = row.iter().map(|v| format!("{:.3}", v)).collect();
                text.push_str(&format!("{}\t{}\n", name, cells.join("\t")));
            }
        }
        text.push_str(&format!("Initialization time: {:.3}s\n", self.init_time));
        text.push_str(&format!("Model execution time: {:.3}s\n", self.exec_time));
        text.push_str(&format!("Sum of model run time: {:.3}s\n", self.runtime_sum));
        text
    }
}

/// Survivor entry of the per-generation population dump
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationEntry {
    pub provenance: Provenance,
    pub parameters: Vec<f64>,
    pub fitness: Vec<f64>,
    pub calibration: Option<PeriodEfficiency>,
    pub validation: Option<PeriodEfficiency>,
}

impl From<&Individual> for PopulationEntry {
    fn from(ind: &Individual) -> Self {
        Self {
            provenance: ind.provenance,
            parameters: ind.genes.clone(),
            fitness: ind.objectives().to_vec(),
            calibration: ind.record.as_ref().map(|r| r.calibration.clone()),
            validation: ind.record.as_ref().and_then(|r| r.validation.clone()),
        }
    }
}

/// Final survivors' fitness matrix, the input of an external Pareto plotter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParetoFront {
    pub labels: Vec<String>,
    pub fitness: Vec<Vec<f64>>,
}

pub trait ReportSink {
    /// Survivors of `generation`, after selection
    fn on_population(&mut self, generation: usize, population: &[Individual], labels: &[String]) -> Result<()>;

    fn on_generation(&mut self, report: &GenerationReport) -> Result<()>;

    fn on_finish(
        &mut self,
        summary: &RunSummary,
        logbook: &Logbook,
        population: &[Individual],
        labels: &[String],
    ) -> Result<()>;
}

/// Keeps every report in memory
#[derive(Debug, Default)]
pub struct MemoryReportSink {
    pub populations: Vec<(usize, Vec<Provenance>)>,
    pub generations: Vec<GenerationReport>,
    pub summary: Option<RunSummary>,
}

impl ReportSink for MemoryReportSink {
    fn on_population(&mut self, generation: usize, population: &[Individual], _labels: &[String]) -> Result<()> {
        self.populations
            .push((generation, population.iter().map(|i| i.provenance).collect()));
        Ok(())
    }

    fn on_generation(&mut self, report: &GenerationReport) -> Result<()> {
        self.generations.push(report.clone());
        Ok(())
    }

    fn on_finish(
        &mut self,
        summary: &RunSummary,
        _logbook: &Logbook,
        _population: &[Individual],
        _labels: &[String],
    ) -> Result<()> {
        self.summary = Some(summary.clone());
        Ok(())
    }
}

/// Writes the text logs and JSON dumps of a run into an output directory
pub struct FileReportSink {
    out_dir: PathBuf,
    step: CalibrationStep,
    with_validation: bool,
}

impl FileReportSink {
    pub const HYPERVOLUME_LOG: &'static str = "hypervolume.txt";
    pub const CALIBRATION_LOG: &'static str = "calibration_log.txt";
    pub const LOGBOOK: &'static str = "logbook.txt";
    pub const EXEC_TIMES: &'static str = "exec_time_allmodelruns.txt";
    pub const PARETO_FRONT: &'static str = "pareto_front.json";
    pub const SIMDATA_DIR: &'static str = "simdata";

    /// Creates the directory layout and truncates previous logs
    pub fn create<P: AsRef<Path>>(out_dir: P, step: CalibrationStep, with_validation: bool) -> Result<Self> {
        let out_dir = out_dir.as_ref().to_path_buf();
        fs::create_dir_all(out_dir.join(Self::SIMDATA_DIR))?;
        fs::write(out_dir.join(Self::HYPERVOLUME_LOG), "")?;
        fs::write(out_dir.join(Self::CALIBRATION_LOG), "")?;
        Ok(Self {
            out_dir,
            step,
            with_validation,
        })
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    fn append(&self, file: &str, text: &str) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.out_dir.join(file))?;
        f.write_all(text.as_bytes())?;
        Ok(())
    }

    fn calibration_table(&self, generation: usize, population: &[Individual]) -> String {
        let metrics = [Metric::Nse, Metric::Rsr, Metric::Pbias, Metric::RSquare];
        let variables = self.step.variables();

        let mut text = format!("###### Generation: {} ######\n", generation);
        text.push_str("generation-calibrationID\t");
        for var in &variables {
            text.push_str(&PeriodEfficiency::output_header(var, &metrics, "Cali"));
        }
        if self.with_validation {
            for var in &variables {
                text.push_str(&PeriodEfficiency::output_header(var, &metrics, "Vali"));
            }
        }
        text.push_str("gene_values\n");

        for ind in population {
            text.push_str(&format!("{}\t", ind.provenance));
            if let Some(record) = &ind.record {
                for var in &variables {
                    text.push_str(&record.calibration.output_efficiency(var, &metrics));
                }
                if self.with_validation {
                    let vali = record.validation.clone().unwrap_or_default();
                    for var in &variables {
                        text.push_str(&vali.output_efficiency(var, &metrics));
                    }
                }
            }
            let genes: Vec<String> = ind.genes.iter().map(|g| format!("{:.6}", g)).collect();
            text.push_str(&format!("[{}]\n", genes.join(", ")));
        }
        text
    }
}

impl ReportSink for FileReportSink {
    fn on_population(&mut self, generation: usize, population: &[Individual], _labels: &[String]) -> Result<()> {
        let entries: Vec<PopulationEntry> = population.iter().map(PopulationEntry::from).collect();
        let path = self
            .out_dir
            .join(Self::SIMDATA_DIR)
            .join(format!("gen_{}.json", generation));
        fs::write(path, serde_json::to_string_pretty(&entries)?)?;

        self.append(Self::CALIBRATION_LOG, &self.calibration_table(generation, population))
    }

    fn on_generation(&mut self, report: &GenerationReport) -> Result<()> {
        let line = format!(
            "Gen: {}, New model runs: {}, Execute timespan: {:.4}, \
             Sum of model run timespan: {:.4}, Hypervolume: {:.4}\n",
            report.generation, report.new_runs, report.exec_time, report.runtime_sum, report.hypervolume
        );
        self.append(Self::HYPERVOLUME_LOG, &line)
    }

    fn on_finish(
        &mut self,
        summary: &RunSummary,
        logbook: &Logbook,
        population: &[Individual],
        labels: &[String],
    ) -> Result<()> {
        fs::write(self.out_dir.join(Self::LOGBOOK), logbook.to_string())?;

        let exec_times: String = summary
            .model_timings
            .iter()
            .map(|t| {
                let cells: Vec<String> = t.as_array().iter().map(|v| format!("{:.4}", v)).collect();
                format!("{}\n", cells.join(" "))
            })
            .collect();
        fs::write(self.out_dir.join(Self::EXEC_TIMES), exec_times)?;

        let front = ParetoFront {
            labels: labels.to_vec(),
            fitness: population.iter().map(|i| i.objectives().to_vec()).collect(),
        };
        fs::write(
            self.out_dir.join(Self::PARETO_FRONT),
            serde_json::to_string_pretty(&front)?,
        )?;
        Ok(())
    }
}
