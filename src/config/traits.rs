use crate::error::CalibrationError;
use serde::{Deserialize, Serialize};

/// Trait for configuration sections
pub trait ConfigSection: Serialize + for<'de> Deserialize<'de> + Default + Clone {
    fn section_name() -> &'static str;
    fn validate(&self) -> Result<(), CalibrationError>;

    /// Configuration error tagged with the section name
    fn invalid(message: impl AsRef<str>) -> CalibrationError {
        CalibrationError::Configuration(format!("[{}] {}", Self::section_name(), message.as_ref()))
    }
}
