//! ECG-Inference: Model registry, inference client and the service that
//! hands conditioned tensors to a model

pub mod registry;
pub mod client;
pub mod service;

pub use registry::{ModelConfig, ModelRegistry, DEFAULT_ENDPOINT, DEFAULT_MODEL_ID};
pub use client::{HttpInferenceClient, InferenceClient, InferenceResponse, DEFAULT_TIMEOUT};
pub use service::{EcgService, ServiceStats};
