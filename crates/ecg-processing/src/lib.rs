//! ECG-Processing: Conditioning pipeline for three-lead ECG
//!
//! Quality gate, mains notch and bandpass filtering, per-channel z-score,
//! resampling and tensor packaging, with a per-stage report.

pub mod stage;
pub mod quality;
pub mod filters;
pub mod normalize;
pub mod resample;
pub mod tensor;
pub mod config;
pub mod report;
pub mod pipeline;

pub use pipeline::Pipeline;
pub use stage::{
    RejectionReason, SignalStage, StageKind, StageResult, StageStatus, StageTiming,
};
pub use quality::{QualityDetails, QualityGate, QualityThresholds};
pub use filters::{BiquadCoefficients, FilterConfig, FilterDetails, FilterStage, FilterType};
pub use normalize::{zscore, NormalizationDetails, NormalizationStage};
pub use resample::{ResampleConfig, ResampleDetails, ResampleStage};
pub use tensor::{ModelTensor, PackageDetails, TensorConfig, TensorPackager};
pub use config::PipelineConfig;
pub use report::{ModelInfo, PipelineReport, Prediction, PredictionClass, StageReports};
