//! Pipeline plus inference: what a caller submits a recording to

use crate::client::InferenceClient;
use crate::registry::ModelRegistry;
use ecg_core::{format, EcgResult, RawEcgRecord, SignalEntity};
use ecg_processing::{ModelInfo, ModelTensor, Pipeline, PipelineReport, Prediction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Running totals across processed recordings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub records_processed: u64,
    /// Recordings that made it through every stage
    pub ready_for_inference: u64,
    pub predictions: u64,
    pub inference_failures: u64,
    pub total_processing_time_us: u64,
}

impl ServiceStats {
    pub fn average_latency_us(&self) -> u64 {
        self.total_processing_time_us
            .checked_div(self.records_processed)
            .unwrap_or(0)
    }
}

/// Runs the pipeline and, when it succeeds, asks the model for a prediction.
///
/// Inference problems never fail a request: they are logged and the report
/// comes back without a prediction.
pub struct EcgService<C> {
    pipeline: Pipeline,
    registry: ModelRegistry,
    client: C,
    stats: Arc<Mutex<ServiceStats>>,
}

impl<C: InferenceClient> EcgService<C> {
    pub fn new(pipeline: Pipeline, registry: ModelRegistry, client: C) -> Self {
        Self {
            pipeline,
            registry,
            client,
            stats: Arc::new(Mutex::new(ServiceStats::default())),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub async fn stats(&self) -> ServiceStats {
        self.stats.lock().await.clone()
    }

    /// Parse CSV text and process it
    pub async fn process_csv(&self, text: &str, model_id: Option<&str>) -> EcgResult<PipelineReport> {
        let record = format::parse_csv(text)?;
        self.process(&record, model_id).await
    }

    /// Process a raw recording. Fails only when the recording cannot be
    /// turned into a signal.
    pub async fn process(&self, record: &RawEcgRecord, model_id: Option<&str>) -> EcgResult<PipelineReport> {
        let started = Instant::now();
        let report = self.pipeline.run_record(record)?;
        Ok(self.finish(report, model_id, started).await)
    }

    /// Process an already built signal
    pub async fn process_signal(&self, signal: SignalEntity, model_id: Option<&str>) -> PipelineReport {
        let started = Instant::now();
        let report = self.pipeline.run(signal);
        self.finish(report, model_id, started).await
    }

    async fn finish(&self, report: PipelineReport, model_id: Option<&str>, started: Instant) -> PipelineReport {
        let ready = report.is_ready_for_inference();
        let report = self.infer(report, model_id).await;

        let mut stats = self.stats.lock().await;
        stats.records_processed += 1;
        stats.total_processing_time_us += started.elapsed().as_micros() as u64;
        if ready {
            stats.ready_for_inference += 1;
            if report.prediction.is_some() {
                stats.predictions += 1;
            } else {
                stats.inference_failures += 1;
            }
        }

        report
    }

    async fn infer(&self, report: PipelineReport, model_id: Option<&str>) -> PipelineReport {
        if !report.is_ready_for_inference() {
            tracing::debug!(report_id = %report.id, "Pipeline did not finish, skipping inference");
            return report;
        }
        let Some(tensor) = report.tensor.as_ref() else {
            return report;
        };

        match self.predict(tensor, model_id).await {
            Ok((prediction, model)) => report.attach_inference(prediction, model),
            Err(e) => {
                tracing::error!(
                    report_id = %report.id,
                    error = %e,
                    "Inference failed, returning report without prediction"
                );
                report
            }
        }
    }

    async fn predict(&self, tensor: &ModelTensor, model_id: Option<&str>) -> EcgResult<(Prediction, ModelInfo)> {
        let model = self.registry.resolve(model_id)?;
        let response = self.client.predict(tensor, model).await?;
        let prediction = Prediction::from_score(response.score());

        tracing::info!(
            model = %model.id,
            score = prediction.score,
            class = ?prediction.class,
            "Inference complete"
        );
        Ok((prediction, model.info()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InferenceResponse;
    use crate::registry::ModelConfig;
    use async_trait::async_trait;
    use ecg_core::EcgError;
    use ecg_processing::PredictionClass;
    use ecg_simulation::{EcgConfig, EcgSimulator, NoiseConfig, SignalPattern};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every call with a fixed response, or fails when there is none
    struct FixedClient {
        response: Option<InferenceResponse>,
        calls: AtomicUsize,
    }

    impl FixedClient {
        fn answering(probability: f64) -> Self {
            Self {
                response: Some(InferenceResponse {
                    probability: Some(probability),
                    ..Default::default()
                }),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                response: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InferenceClient for FixedClient {
        async fn predict(&self, tensor: &ModelTensor, _model: &ModelConfig) -> EcgResult<InferenceResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(tensor.shape(), [1, 2000, 3]);
            self.response.clone().ok_or_else(|| EcgError::Inference {
                message: "endpoint unreachable".to_string(),
            })
        }
    }

    fn service(client: FixedClient) -> EcgService<FixedClient> {
        EcgService::new(Pipeline::default(), ModelRegistry::builtin(), client)
    }

    /// 10 s of a noisy 1 mV tone at 500 Hz, labeled anomalous
    fn tone() -> RawEcgRecord {
        let config = EcgConfig {
            noise: NoiseConfig {
                gaussian_std: 150.0,
                ..NoiseConfig::silent()
            },
            label: Some(1),
            seed: Some(5),
            ..EcgConfig::clean(SignalPattern::Sinusoidal {
                frequency: 1.0,
                amplitude: 1000.0,
            })
        };
        EcgSimulator::new(config).unwrap().generate(10.0).unwrap()
    }

    #[tokio::test]
    async fn test_prediction_attached() {
        let service = service(FixedClient::answering(0.9));
        let report = service.process(&tone(), None).await.unwrap();

        let prediction = report.prediction.as_ref().unwrap();
        assert_eq!(prediction.class, PredictionClass::Anomalous);
        assert_eq!(prediction.score, 0.9);
        assert_eq!(report.model.name, "CNN1D-LSTM ECG v1");
        assert!(report.ground_truth.unwrap().is_anomalous);
        assert_eq!(service.client().calls(), 1);
    }

    #[tokio::test]
    async fn test_low_score_is_normal() {
        let report = service(FixedClient::answering(0.5)).process(&tone(), None).await.unwrap();
        assert_eq!(report.prediction.unwrap().class, PredictionClass::Normal);
    }

    #[tokio::test]
    async fn test_inference_failure_is_isolated() {
        let service = service(FixedClient::failing());
        let report = service.process(&tone(), None).await.unwrap();

        assert!(report.prediction.is_none());
        assert!(!report.model.is_available());
        assert_eq!(report.tensor_shape, Some([1, 2000, 3]));

        let stats = service.stats().await;
        assert_eq!(stats.records_processed, 1);
        assert_eq!(stats.inference_failures, 1);
        assert_eq!(stats.predictions, 0);
    }

    #[tokio::test]
    async fn test_unknown_model_is_isolated() {
        let service = service(FixedClient::answering(0.9));
        let report = service.process(&tone(), Some("missing")).await.unwrap();

        assert!(report.prediction.is_none());
        assert_eq!(report.model.name, "N/A");
        assert_eq!(service.client().calls(), 0);
    }

    #[tokio::test]
    async fn test_rejected_signal_skips_inference() {
        let service = service(FixedClient::answering(0.9));
        let flat = EcgSimulator::new(EcgConfig::clean(SignalPattern::Flat { level: 0.0 }))
            .unwrap()
            .generate(10.0)
            .unwrap();
        let report = service.process(&flat, None).await.unwrap();

        assert!(report.stages.quality.rejection_reason().is_some());
        assert!(report.prediction.is_none());
        assert_eq!(service.client().calls(), 0);

        let stats = service.stats().await;
        assert_eq!(stats.records_processed, 1);
        assert_eq!(stats.ready_for_inference, 0);
        assert_eq!(stats.inference_failures, 0);
    }

    #[tokio::test]
    async fn test_process_csv() {
        let mut csv = Vec::new();
        format::write_csv(&tone(), &mut csv).unwrap();
        let text = String::from_utf8(csv).unwrap();

        let service = service(FixedClient::answering(0.2));
        let report = service.process_csv(&text, Some("default")).await.unwrap();
        assert_eq!(report.prediction.unwrap().class, PredictionClass::Normal);
        assert_eq!(report.ground_truth.unwrap().label, 1);

        let err = service.process_csv("II,V1,V5\n1,2,3\n", None).await.unwrap_err();
        assert!(err.is_input_error());
    }

    #[tokio::test]
    async fn test_process_signal_counts() {
        let service = service(FixedClient::answering(0.7));
        let signal = tone().to_signal().unwrap();
        let report = service.process_signal(signal, None).await;
        assert!(report.prediction.is_some());

        let stats = service.stats().await;
        assert_eq!(stats.predictions, 1);
        assert_eq!(stats.average_latency_us(), stats.total_processing_time_us);
    }
}
