pub mod individual;
pub mod operators;
pub mod pareto;
pub mod calibration_engine;
pub mod progress;
pub mod report;

pub use individual::{Fitness, Individual, SimulationRecord};
pub use calibration_engine::{
    merge_unique, CalibrationEngine, CalibrationResult, EnginePhase, ProgressCallback,
};
pub use progress::{ChannelProgressCallback, LogProgressCallback, ProgressMessage};
pub use report::{FileReportSink, GenerationReport, MemoryReportSink, ReportSink, RunSummary};
