pub mod traits;
pub mod optimization;
pub mod calibration;
pub mod model;
pub mod manager;
pub mod run;

pub use manager::{AppConfig, ConfigManager};
pub use optimization::OptimizationConfig;
pub use calibration::{CalibrationConfig, PeriodConfig};
pub use model::ModelConfig;
pub use run::RunConfig;
pub use traits::ConfigSection;
