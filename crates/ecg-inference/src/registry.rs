//! Known models and where to reach them

use ecg_core::{EcgError, EcgResult};
use ecg_processing::ModelInfo;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Id of the built-in model
pub const DEFAULT_MODEL_ID: &str = "default";

/// Endpoint used when none is configured
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080/invocations";

/// One deployable model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    /// Display name
    pub name: String,
    /// URL the tensor is posted to
    pub endpoint: String,
    pub description: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl ModelConfig {
    /// The CNN1D + LSTM anomaly detector the pipeline is shaped for
    pub fn cnn_lstm_v1(endpoint: impl Into<String>) -> Self {
        let metadata = BTreeMap::from([
            ("architecture".to_string(), json!("CNN1D + LSTM")),
            ("input_shape".to_string(), json!([1, 2000, 3])),
            ("sampling_rate".to_string(), json!("200 Hz")),
            ("duration".to_string(), json!("10 seconds")),
        ]);

        Self {
            id: DEFAULT_MODEL_ID.to_string(),
            name: "CNN1D-LSTM ECG v1".to_string(),
            endpoint: endpoint.into(),
            description: "CNN1D + LSTM model for ECG anomaly detection".to_string(),
            metadata,
        }
    }

    /// Report view of this model
    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            name: self.name.clone(),
            endpoint: self.endpoint.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Models by id; the first registered one is the default
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRegistry {
    models: Vec<ModelConfig>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModelRegistry {
    /// Registry with no models
    pub fn empty() -> Self {
        Self { models: Vec::new() }
    }

    /// Registry holding the built-in model at [`DEFAULT_ENDPOINT`]
    pub fn builtin() -> Self {
        Self {
            models: vec![ModelConfig::cnn_lstm_v1(DEFAULT_ENDPOINT)],
        }
    }

    /// Add a model, replacing any model with the same id
    pub fn register(&mut self, model: ModelConfig) -> Option<ModelConfig> {
        match self.models.iter_mut().find(|m| m.id == model.id) {
            Some(existing) => Some(std::mem::replace(existing, model)),
            None => {
                self.models.push(model);
                None
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.id == id)
    }

    pub fn default_model(&self) -> Option<&ModelConfig> {
        self.models.first()
    }

    /// Look up `id`, or the default model when `id` is `None`
    pub fn resolve(&self, id: Option<&str>) -> EcgResult<&ModelConfig> {
        let model = match id {
            Some(id) => self.get(id),
            None => self.default_model(),
        };
        model.ok_or_else(|| EcgError::Inference {
            message: format!("unknown model '{}'", id.unwrap_or(DEFAULT_MODEL_ID)),
        })
    }

    /// Point model `id` at another endpoint
    pub fn with_endpoint(mut self, id: &str, endpoint: impl Into<String>) -> EcgResult<Self> {
        let model = self
            .models
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| EcgError::Configuration {
                message: format!("cannot set endpoint of unknown model '{}'", id),
            })?;
        model.endpoint = endpoint.into();
        Ok(self)
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelConfig> {
        self.models.iter()
    }
}
