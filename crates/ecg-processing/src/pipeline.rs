//! Conditioning pipeline: quality gate, filter, normalize, resample, package
//!
//! Stages run strictly in order and only advance on success. The first
//! failure stops the run; every stage after it is reported as skipped and
//! the signals it would have produced stay `None`.

use crate::config::PipelineConfig;
use crate::filters::{FilterDetails, FilterStage};
use crate::normalize::{NormalizationDetails, NormalizationStage, NO_METHOD};
use crate::quality::QualityGate;
use crate::report::{ModelInfo, PipelineReport, StageReports};
use crate::resample::{ResampleDetails, ResampleStage};
use crate::stage::{SignalStage, StageKind, StageResult, StageTimer, StageTiming};
use crate::tensor::{ModelTensor, PackageDetails, TensorPackager};
use chrono::Utc;
use ecg_core::{EcgResult, RawEcgRecord, SignalEntity};
use uuid::Uuid;

/// Stage outputs collected while the pipeline runs
#[derive(Default)]
struct RunState {
    filtered: Option<SignalEntity>,
    normalized: Option<SignalEntity>,
    resampled: Option<SignalEntity>,
    tensor: Option<ModelTensor>,
    filtering: Option<StageResult<FilterDetails>>,
    normalization: Option<StageResult<NormalizationDetails>>,
    resampling: Option<StageResult<ResampleDetails>>,
    packaging: Option<StageResult<PackageDetails>>,
    timings: Vec<StageTiming>,
}

/// ECG conditioning pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    quality: QualityGate,
    filter: FilterStage,
    normalize: NormalizationStage,
    resample: ResampleStage,
    packager: TensorPackager,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::from_valid_config(PipelineConfig::default())
    }
}

impl Pipeline {
    /// Create a pipeline from a validated configuration
    pub fn new(config: PipelineConfig) -> EcgResult<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: PipelineConfig) -> Self {
        Self {
            quality: QualityGate::new(config.quality.clone()),
            filter: FilterStage::new(config.filter.clone()),
            normalize: NormalizationStage,
            resample: ResampleStage::new(config.resample.clone()),
            packager: TensorPackager::new(config.tensor.clone()),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Convert a raw record and run it, carrying its ground truth into the report
    pub fn run_record(&self, record: &RawEcgRecord) -> EcgResult<PipelineReport> {
        let signal = record.to_signal()?;
        Ok(self.run(signal).with_ground_truth(record.ground_truth))
    }

    /// Run every stage on `signal`. Never fails: stage problems are part of
    /// the report.
    pub fn run(&self, signal: SignalEntity) -> PipelineReport {
        let report_id = Uuid::new_v4();
        tracing::info!(
            %report_id,
            samples = signal.samples_per_channel(),
            channels = signal.channel_count(),
            rate = signal.sampling_rate().hz(),
            "Pipeline started"
        );

        let mut state = RunState::default();

        let timer = StageTimer::start(StageKind::Quality);
        let quality = self.quality.check(&signal);
        state.timings.push(timer.finish());

        let outcome = if quality.is_ok() {
            self.run_transforms(&signal, &mut state)
        } else {
            Err(StageKind::Quality)
        };

        match outcome {
            Ok(()) => tracing::info!(%report_id, "Pipeline finished"),
            Err(failed) => tracing::warn!(%report_id, %failed, "Pipeline stopped early"),
        }

        // Only stages that never ran are filled in, and those imply a failure
        let cause = outcome.err().unwrap_or(StageKind::Quality);
        let samples = signal.samples_per_channel();
        let rate = signal.sampling_rate().hz();

        let stages = StageReports {
            quality,
            filtering: settle(state.filtering, cause, FilterDetails::default),
            normalization: settle(state.normalization, cause, || NormalizationDetails {
                method: NO_METHOD.to_string(),
            }),
            resampling: settle(state.resampling, cause, || ResampleDetails {
                fs_final: rate,
                original_samples: samples,
                final_samples: samples,
            }),
            packaging: settle(state.packaging, cause, PackageDetails::default),
        };

        PipelineReport {
            id: report_id,
            generated_at: Utc::now(),
            signal_original: signal,
            signal_filtered: state.filtered,
            signal_normalized: state.normalized,
            signal_resampled: state.resampled,
            tensor_shape: state.tensor.as_ref().map(ModelTensor::shape),
            tensor: state.tensor,
            stages,
            prediction: None,
            model: ModelInfo::not_available(),
            ground_truth: None,
            timings: state.timings,
        }
    }

    /// Filter through packaging; returns the stage that failed, if any
    fn run_transforms(&self, original: &SignalEntity, state: &mut RunState) -> Result<(), StageKind> {
        let (filtered, result) = timed(&self.filter, original, &mut state.timings);
        let filtered = keep(&mut state.filtered, &mut state.filtering, filtered, result, StageKind::Filter)?;

        let (normalized, result) = timed(&self.normalize, filtered, &mut state.timings);
        let normalized = keep(
            &mut state.normalized,
            &mut state.normalization,
            normalized,
            result,
            StageKind::Normalize,
        )?;

        let (resampled, result) = timed(&self.resample, normalized, &mut state.timings);
        let resampled = keep(&mut state.resampled, &mut state.resampling, resampled, result, StageKind::Resample)?;

        let timer = StageTimer::start(StageKind::Package);
        let tensor = self.packager.pack(resampled);
        state.timings.push(timer.finish());

        state.packaging = Some(StageResult::ok(
            "tensor packaged",
            PackageDetails {
                shape: Some(tensor.shape()),
            },
        ));
        state.tensor = Some(tensor);
        Ok(())
    }
}

fn timed<S: SignalStage>(
    stage: &S,
    input: &SignalEntity,
    timings: &mut Vec<StageTiming>,
) -> (SignalEntity, StageResult<S::Details>) {
    let timer = StageTimer::start(stage.kind());
    let outcome = stage.run(input);
    timings.push(timer.finish());
    outcome
}

/// Store a stage's output and result. The output is kept even when the stage
/// failed (it is then the untouched input).
fn keep<'a, D>(
    signal_slot: &'a mut Option<SignalEntity>,
    result_slot: &mut Option<StageResult<D>>,
    signal: SignalEntity,
    result: StageResult<D>,
    kind: StageKind,
) -> Result<&'a SignalEntity, StageKind> {
    let ok = result.is_ok();
    *result_slot = Some(result);
    let stored = signal_slot.insert(signal);
    if ok {
        Ok(stored)
    } else {
        Err(kind)
    }
}

fn settle<D>(
    result: Option<StageResult<D>>,
    cause: StageKind,
    fallback: impl FnOnce() -> D,
) -> StageResult<D> {
    result.unwrap_or_else(|| StageResult::Skipped {
        cause,
        details: fallback(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{RejectionReason, StageStatus};
    use ecg_core::{format, SamplingRate};
    use ecg_simulation::{EcgConfig, EcgSimulator, NoiseConfig, SignalPattern};

    fn simulate(config: EcgConfig, duration: f64) -> SignalEntity {
        EcgSimulator::new(config).unwrap().generate_signal(duration).unwrap()
    }

    /// 1 mV test tone on every lead with white noise
    fn tone(sampling_rate: f64) -> EcgConfig {
        EcgConfig {
            sampling_rate,
            noise: NoiseConfig {
                gaussian_std: 150.0,
                ..NoiseConfig::silent()
            },
            mains_frequency: None,
            seed: Some(7),
            ..EcgConfig::clean(SignalPattern::Sinusoidal {
                frequency: 1.0,
                amplitude: 1000.0,
            })
        }
    }

    fn assert_skipped(report: &PipelineReport, cause: StageKind) {
        for (kind, status, message) in report.stages.summary() {
            if kind.downstream().count() < cause.downstream().count() {
                assert_eq!(status, StageStatus::Error, "{} should be skipped", kind);
                assert_eq!(message, format!("not processed due to {} failure", cause.label()));
            }
        }
    }

    #[test]
    fn test_clean_tone_reaches_tensor() {
        let report = Pipeline::default().run(simulate(tone(500.0), 10.0));

        for (kind, status, message) in report.stages.summary() {
            assert_eq!(status, StageStatus::Ok, "{} failed: {}", kind, message);
        }
        assert!(report.is_ready_for_inference());
        assert_eq!(report.tensor_shape, Some([1, 2000, 3]));

        let tensor = report.tensor.as_ref().unwrap();
        assert!(!tensor.has_non_finite());
        assert_eq!(report.stages.resampling.details().fs_final, 200.0);
        assert_eq!(report.stages.resampling.details().original_samples, 5000);
        assert_eq!(report.signal_resampled.as_ref().unwrap().samples_per_channel(), 2000);
        assert_eq!(report.timings.len(), 5);
        assert!(report.prediction.is_none());
        assert!(!report.model.is_available());
    }

    #[test]
    fn test_synthetic_rhythm_passes() {
        let config = EcgConfig {
            seed: Some(42),
            ..EcgConfig::default()
        };
        let report = Pipeline::default().run(simulate(config, 10.0));

        assert_eq!(report.stages.first_failure(), None, "{:?}", report.stages.summary());
        assert_eq!(report.tensor_shape, Some([1, 2000, 3]));
        assert_eq!(
            report.stages.filtering.details().notch_frequency_hz,
            Some(60.0)
        );
    }

    #[test]
    fn test_flat_line_rejected() {
        let signal = simulate(EcgConfig::clean(SignalPattern::Flat { level: 0.0 }), 10.0);
        let report = Pipeline::default().run(signal);

        assert_eq!(report.stages.quality.status(), StageStatus::Rejected);
        assert_eq!(report.stages.quality.rejection_reason(), Some(RejectionReason::LowStdDev));
        assert!(report.stages.quality.message().contains("standard deviation"));
        assert_skipped(&report, StageKind::Quality);

        assert!(report.signal_filtered.is_none());
        assert!(report.signal_normalized.is_none());
        assert!(report.signal_resampled.is_none());
        assert!(report.tensor.is_none());
        assert!(report.tensor_shape.is_none());
        assert_eq!(report.timings.len(), 1);
        assert!(!report.is_ready_for_inference());
    }

    #[test]
    fn test_half_missing_rejected() {
        let config = EcgConfig {
            dropout_proportion: 0.5,
            seed: Some(3),
            ..EcgConfig::default()
        };
        let report = Pipeline::default().run(simulate(config, 10.0));

        assert_eq!(report.stages.quality.rejection_reason(), Some(RejectionReason::ExcessiveNan));
        assert!(report.stages.quality.message().contains("NaN proportion"));
        assert!(report.tensor.is_none());
    }

    #[test]
    fn test_empty_signal_rejected() {
        let empty = SignalEntity::from_channels(&[vec![], vec![], vec![]], SamplingRate::default()).unwrap();
        let report = Pipeline::default().run(empty);

        assert_eq!(report.stages.quality.rejection_reason(), Some(RejectionReason::EmptySignal));
        assert_eq!(report.stages.first_failure(), Some(StageKind::Quality));
        let resampling = report.stages.resampling.details();
        assert_eq!(resampling.fs_final, 500.0);
        assert_eq!(resampling.final_samples, 0);
    }

    #[test]
    fn test_skipped_stages_serialize_as_error() {
        let signal = simulate(EcgConfig::clean(SignalPattern::Flat { level: 0.0 }), 10.0);
        let report = Pipeline::default().run(signal);
        let value: serde_json::Value = serde_json::from_str(&report.to_json(false).unwrap()).unwrap();

        assert_eq!(value["stages"]["quality"]["status"], "REJECTED");
        assert_eq!(value["stages"]["quality"]["reason"], "low_std_dev");
        assert_eq!(value["stages"]["filtering"]["status"], "ERROR");
        assert_eq!(value["stages"]["filtering"]["skipped_due_to"], "quality");
        assert_eq!(value["stages"]["normalization"]["method"], "none");
        assert_eq!(value["stages"]["resampling"]["fs_final"], 500.0);
        assert_eq!(value["stages"]["resampling"]["original_samples"], 5000);
        assert!(value["stages"]["packaging"]["shape"].is_null());
        assert!(value["signal_filtered"].is_null());
        assert!(value["prediction"].is_null());
        assert_eq!(value["model"]["name"], "N/A");
    }

    #[test]
    fn test_filter_failure_keeps_input() {
        // 50 Hz mains sits above Nyquist at 80 Hz
        let signal = simulate(tone(80.0), 10.0);
        let report = Pipeline::default().run(signal.clone());

        assert!(report.stages.quality.is_ok());
        assert_eq!(report.stages.filtering.status(), StageStatus::Error);
        assert!(!report.stages.filtering.message().is_empty());
        assert_eq!(report.signal_filtered.as_ref(), Some(&signal));
        assert!(report.signal_normalized.is_none());
        assert!(report.signal_resampled.is_none());
        assert!(report.tensor.is_none());
        assert_skipped(&report, StageKind::Filter);

        let resampling = report.stages.resampling.details();
        assert_eq!(resampling.fs_final, 80.0);
        assert_eq!(resampling.original_samples, 800);
        assert_eq!(report.stages.first_failure(), Some(StageKind::Filter));
    }

    #[test]
    fn test_mains_at_nyquist_reaches_tensor() {
        // 50 Hz mains is exactly Nyquist at 100 Hz
        let report = Pipeline::default().run(simulate(tone(100.0), 10.0));

        assert!(report.stages.filtering.is_ok(), "{}", report.stages.filtering.message());
        assert_eq!(report.stages.filtering.details().notch_frequency_hz, Some(50.0));
        let filtered = report.signal_filtered.as_ref().unwrap();
        assert!(filtered.data().iter().all(|v| v.is_finite()));

        assert_eq!(report.stages.first_failure(), None, "{:?}", report.stages.summary());
        assert_eq!(report.stages.resampling.details().original_samples, 1000);
        assert_eq!(report.tensor_shape, Some([1, 2000, 3]));
        assert!(report.is_ready_for_inference());
    }

    #[test]
    fn test_run_record_carries_ground_truth() {
        let config = EcgConfig {
            seed: Some(11),
            label: Some(1),
            ..tone(500.0)
        };
        let record = EcgSimulator::new(config).unwrap().generate(10.0).unwrap();

        let mut csv = Vec::new();
        format::write_csv(&record, &mut csv).unwrap();
        let parsed = format::read_csv(csv.as_slice()).unwrap();

        let report = Pipeline::default().run_record(&parsed).unwrap();
        assert!(report.is_ready_for_inference());
        let truth = report.ground_truth.unwrap();
        assert_eq!(truth.label, 1);
        assert!(truth.is_anomalous);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PipelineConfig::default();
        config.tensor.target_length = 0;
        assert!(Pipeline::new(config).is_err());
        assert!(Pipeline::new(PipelineConfig::default()).is_ok());
    }
}
