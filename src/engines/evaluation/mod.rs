pub mod objectives;
pub mod simulator;
pub mod evaluator;
pub mod scheduler;

pub use objectives::{CalibrationStep, ObjectiveSpec};
pub use simulator::{CommandSimulator, ModelOutput, Simulator};
pub use evaluator::{Evaluation, FitnessEvaluator, ModelEvaluator};
pub use scheduler::{
    build_scheduler, BatchOutcome, ParallelScheduler, Scheduler, SchedulerKind, SequentialScheduler,
};
