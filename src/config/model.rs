use super::traits::ConfigSection;
use crate::error::CalibrationError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How to launch the hydrological model and where its data lives
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub command: String,
    pub args: Vec<String>,
    pub workdir: Option<PathBuf>,
    /// CSV written by the model, relative to `workdir`. `{run}` is replaced by
    /// a unique run number; without it the number is appended to the file stem
    pub output_file: String,
    pub observation_file: PathBuf,
}

impl ConfigSection for ModelConfig {
    fn section_name() -> &'static str {
        "model"
    }

    fn validate(&self) -> Result<(), CalibrationError> {
        if self.command.trim().is_empty() {
            return Err(Self::invalid("Model command must be set"));
        }
        if self.output_file.trim().is_empty() {
            return Err(Self::invalid("Model output file must be set"));
        }
        if self.observation_file.as_os_str().is_empty() {
            return Err(Self::invalid("Observation file must be set"));
        }
        Ok(())
    }
}
