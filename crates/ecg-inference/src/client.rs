//! Inference collaborator: trait plus the HTTP implementation

use crate::registry::ModelConfig;
use async_trait::async_trait;
use ecg_core::{EcgError, EcgResult};
use ecg_processing::ModelTensor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Default bound on one inference request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Model response. Only `probability` and `prediction` are interpreted;
/// anything else is kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    #[serde(default)]
    pub probability: Option<f64>,
    #[serde(default)]
    pub prediction: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl InferenceResponse {
    /// `probability`, else `prediction`, else 0
    pub fn score(&self) -> f64 {
        self.probability.or(self.prediction).unwrap_or(0.0)
    }
}

/// Something that turns a tensor into a model response
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// One attempt; no retries
    async fn predict(&self, tensor: &ModelTensor, model: &ModelConfig) -> EcgResult<InferenceResponse>;
}

#[derive(Serialize)]
struct InferenceRequest<'a> {
    signals: &'a ModelTensor,
}

/// POSTs `{"signals": tensor}` as JSON to the model endpoint
#[derive(Debug, Clone)]
pub struct HttpInferenceClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpInferenceClient {
    pub fn new(timeout: Duration) -> EcgResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| EcgError::Configuration {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn send(&self, tensor: &ModelTensor, endpoint: &str) -> reqwest::Result<InferenceResponse> {
        self.client
            .post(endpoint)
            .json(&InferenceRequest { signals: tensor })
            .send()
            .await?
            .error_for_status()?
            .json::<InferenceResponse>()
            .await
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn predict(&self, tensor: &ModelTensor, model: &ModelConfig) -> EcgResult<InferenceResponse> {
        tracing::debug!(model = %model.id, endpoint = %model.endpoint, shape = ?tensor.shape(), "Invoking model");

        match tokio::time::timeout(self.timeout, self.send(tensor, &model.endpoint)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(EcgError::Inference {
                message: format!("request to {} failed: {}", model.endpoint, e),
            }),
            Err(_) => Err(EcgError::Inference {
                message: format!(
                    "request to {} timed out after {} ms",
                    model.endpoint,
                    self.timeout.as_millis()
                ),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecg_processing::TensorPackager;
    use ecg_core::{SamplingRate, SignalEntity};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    fn tensor() -> ModelTensor {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, 0.5, -0.5]).collect();
        let signal = SignalEntity::from_rows(&rows, SamplingRate::new(200.0).unwrap()).unwrap();
        TensorPackager::default().pack(&signal)
    }

    fn header_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n")
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = header_end(&buf) {
                let headers = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let length = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Answer one request with `status` and `body` after `delay`
    async fn serve_once(status: &'static str, body: &'static str, delay: Duration) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            tokio::time::sleep(delay).await;
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            request
        });
        (format!("http://{}/invocations", addr), handle)
    }

    #[test]
    fn test_score_fallbacks() {
        let both = InferenceResponse {
            probability: Some(0.8),
            prediction: Some(1.0),
            ..Default::default()
        };
        assert_eq!(both.score(), 0.8);

        let prediction_only: InferenceResponse = serde_json::from_str(r#"{"prediction": 1}"#).unwrap();
        assert_eq!(prediction_only.score(), 1.0);

        let neither: InferenceResponse = serde_json::from_str(r#"{"label": "normal"}"#).unwrap();
        assert_eq!(neither.score(), 0.0);
        assert_eq!(neither.extra["label"], "normal");
    }

    #[tokio::test]
    async fn test_posts_signals_payload() {
        let (endpoint, server) = serve_once("200 OK", r#"{"probability": 0.93}"#, Duration::ZERO).await;
        let client = HttpInferenceClient::new(DEFAULT_TIMEOUT).unwrap();
        let model = ModelConfig::cnn_lstm_v1(endpoint);

        let response = client.predict(&tensor(), &model).await.unwrap();
        assert_eq!(response.probability, Some(0.93));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /invocations"));
        assert!(request.contains(r#"{"signals":[[[0.0,0.5,-0.5],[1.0,0.5,-0.5]"#));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let (endpoint, _server) = serve_once("500 Internal Server Error", r#"{"error": "boom"}"#, Duration::ZERO).await;
        let client = HttpInferenceClient::new(DEFAULT_TIMEOUT).unwrap();
        let err = client
            .predict(&tensor(), &ModelConfig::cnn_lstm_v1(endpoint))
            .await
            .unwrap_err();
        assert!(matches!(err, EcgError::Inference { .. }));
    }

    #[tokio::test]
    async fn test_timeout_is_honored() {
        let (endpoint, _server) = serve_once("200 OK", r#"{"probability": 0.1}"#, Duration::from_secs(5)).await;
        let client = HttpInferenceClient::new(Duration::from_millis(100)).unwrap();

        let started = std::time::Instant::now();
        let err = client
            .predict(&tensor(), &ModelConfig::cnn_lstm_v1(endpoint))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        // Bind then drop so nothing listens on the port
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let client = HttpInferenceClient::new(Duration::from_secs(5)).unwrap();
        let model = ModelConfig::cnn_lstm_v1(format!("http://{}/invocations", addr));
        assert!(client.predict(&tensor(), &model).await.is_err());
    }
}
