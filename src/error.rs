use crate::types::Provenance;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Model run failed for individual {provenance}: {reason}")]
    ModelRun { provenance: Provenance, reason: String },

    #[error(
        "Population collapsed during {operation} of generation {generation}: \
         {remaining} viable individual(s) left, at least 2 are required. \
         Check the parameter ranges or change the sampling strategy"
    )]
    PopulationCollapse {
        generation: usize,
        operation: String,
        remaining: usize,
    },

    #[error("Simulator error: {0}")]
    Simulator(String),

    #[error("Observation error: {0}")]
    Observation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CalibrationError>;
