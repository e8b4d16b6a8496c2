use super::{
    calibration::CalibrationConfig,
    model::ModelConfig,
    optimization::OptimizationConfig,
    traits::ConfigSection,
};
use crate::error::CalibrationError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Prefix of environment variables overriding file settings,
/// e.g. `HYDROCAL__OPTIMIZATION__NPOP=40`
pub const ENV_PREFIX: &str = "HYDROCAL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub optimization: OptimizationConfig,
    pub calibration: CalibrationConfig,
    pub model: ModelConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), CalibrationError> {
        self.optimization.validate()?;
        self.calibration.validate()?;
        self.model.validate()?;
        Ok(())
    }
}

pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(AppConfig::default())),
        }
    }

    /// Load a TOML (or JSON) file layered with `HYDROCAL__*` environment overrides
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CalibrationError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| CalibrationError::Configuration(format!("Failed to read config: {}", e)))?;

        let config: AppConfig = settings
            .try_deserialize()
            .map_err(|e| CalibrationError::Configuration(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        *self.write_lock()? = config;
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CalibrationError> {
        let config = self.get()?;
        let toml_str = toml::to_string_pretty(&config)
            .map_err(|e| CalibrationError::Configuration(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path, toml_str)
            .map_err(|e| CalibrationError::Configuration(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn get(&self) -> Result<AppConfig, CalibrationError> {
        self.config
            .read()
            .map(|c| c.clone())
            .map_err(|_| CalibrationError::Configuration("Config lock poisoned".to_string()))
    }

    /// Apply `f` and keep the result only if it validates
    pub fn update<F>(&self, f: F) -> Result<(), CalibrationError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = self.write_lock()?;
        let mut candidate = config.clone();
        f(&mut candidate);
        candidate.validate()?;
        *config = candidate;
        Ok(())
    }

    fn write_lock(&self) -> Result<std::sync::RwLockWriteGuard<'_, AppConfig>, CalibrationError> {
        self.config
            .write()
            .map_err(|_| CalibrationError::Configuration("Config lock poisoned".to_string()))
    }
}
