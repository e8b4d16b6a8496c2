pub mod efficiency;
pub mod statistics;
pub mod hypervolume;

pub use efficiency::{EfficiencyMetrics, Metric, ObsSimPair, PeriodEfficiency};
pub use statistics::{FitnessStatistics, Logbook, LogbookRecord};
pub use hypervolume::{hypervolume, reference_point};
