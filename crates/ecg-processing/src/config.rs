//! Configuration management for the conditioning pipeline

use crate::filters::FilterConfig;
use crate::quality::QualityThresholds;
use crate::resample::ResampleConfig;
use crate::tensor::TensorConfig;
use ecg_core::{EcgError, EcgResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Every tunable of the pipeline. Missing sections fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub quality: QualityThresholds,
    pub filter: FilterConfig,
    pub resample: ResampleConfig,
    pub tensor: TensorConfig,
}

impl PipelineConfig {
    /// Validate every section
    pub fn validate(&self) -> EcgResult<()> {
        self.quality.validate()?;
        self.filter.validate()?;
        self.resample.validate()?;
        self.tensor.validate()?;
        Ok(())
    }

    /// Export configuration to JSON
    pub fn to_json(&self) -> EcgResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| EcgError::Configuration {
            message: format!("Failed to serialize configuration: {}", e),
        })
    }

    /// Import configuration from JSON
    pub fn from_json(json: &str) -> EcgResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| EcgError::Configuration {
            message: format!("Failed to deserialize configuration: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> EcgResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| EcgError::Configuration {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        Self::from_json(&json)
    }
}
