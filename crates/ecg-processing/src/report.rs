//! Pipeline report: everything a consumer needs to inspect one run

use crate::filters::FilterDetails;
use crate::normalize::NormalizationDetails;
use crate::quality::QualityDetails;
use crate::resample::ResampleDetails;
use crate::stage::{StageKind, StageResult, StageStatus, StageTiming};
use crate::tensor::{ModelTensor, PackageDetails};
use chrono::{DateTime, Utc};
use ecg_core::{GroundTruth, SignalEntity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Placeholder for model fields when no prediction was made
pub const NOT_AVAILABLE: &str = "N/A";

/// Scores strictly above this are anomalous
pub const ANOMALY_THRESHOLD: f64 = 0.5;

/// Predicted class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionClass {
    Anomalous,
    Normal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub class: PredictionClass,
    pub score: f64,
}

impl Prediction {
    /// Classify with the default threshold
    pub fn from_score(score: f64) -> Self {
        Self::with_threshold(score, ANOMALY_THRESHOLD)
    }

    pub fn with_threshold(score: f64, threshold: f64) -> Self {
        let class = if score > threshold {
            PredictionClass::Anomalous
        } else {
            PredictionClass::Normal
        };
        Self { class, score }
    }
}

/// Model that produced the prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ModelInfo {
    pub fn not_available() -> Self {
        Self {
            name: NOT_AVAILABLE.to_string(),
            endpoint: NOT_AVAILABLE.to_string(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.name != NOT_AVAILABLE
    }
}

impl Default for ModelInfo {
    fn default() -> Self {
        Self::not_available()
    }
}

/// One result per stage, in execution order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReports {
    pub quality: StageResult<QualityDetails>,
    pub filtering: StageResult<FilterDetails>,
    pub normalization: StageResult<NormalizationDetails>,
    pub resampling: StageResult<ResampleDetails>,
    pub packaging: StageResult<PackageDetails>,
}

impl StageReports {
    /// Status message of each stage, in order
    pub fn summary(&self) -> Vec<(StageKind, StageStatus, String)> {
        vec![
            (StageKind::Quality, self.quality.status(), self.quality.message()),
            (StageKind::Filter, self.filtering.status(), self.filtering.message()),
            (StageKind::Normalize, self.normalization.status(), self.normalization.message()),
            (StageKind::Resample, self.resampling.status(), self.resampling.message()),
            (StageKind::Package, self.packaging.status(), self.packaging.message()),
        ]
    }

    /// First stage that did not finish with `Ok`
    pub fn first_failure(&self) -> Option<StageKind> {
        self.summary()
            .into_iter()
            .find(|(_, status, _)| *status != StageStatus::Ok)
            .map(|(kind, _, _)| kind)
    }
}

/// Complete outcome of one pipeline run.
///
/// Signals that were never computed are `None`. The report is final once
/// returned; [`PipelineReport::attach_inference`] consumes it and hands back
/// the completed version.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub signal_original: SignalEntity,
    pub signal_filtered: Option<SignalEntity>,
    pub signal_normalized: Option<SignalEntity>,
    pub signal_resampled: Option<SignalEntity>,
    pub tensor_shape: Option<[usize; 3]>,
    pub tensor: Option<ModelTensor>,
    pub stages: StageReports,
    pub prediction: Option<Prediction>,
    pub model: ModelInfo,
    pub ground_truth: Option<GroundTruth>,
    pub timings: Vec<StageTiming>,
}

impl PipelineReport {
    /// True when every stage succeeded and a tensor is available
    pub fn is_ready_for_inference(&self) -> bool {
        self.tensor.is_some() && self.stages.first_failure().is_none()
    }

    pub fn attach_inference(self, prediction: Prediction, model: ModelInfo) -> Self {
        Self {
            prediction: Some(prediction),
            model,
            ..self
        }
    }

    pub fn with_ground_truth(self, ground_truth: Option<GroundTruth>) -> Self {
        Self {
            ground_truth,
            ..self
        }
    }

    /// Total time spent in the stages, in microseconds
    pub fn total_elapsed_us(&self) -> u64 {
        self.timings.iter().map(|t| t.elapsed_us).sum()
    }

    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}
