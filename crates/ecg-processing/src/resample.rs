//! Linear-interpolation resampling to the model's input rate

use crate::filters::interleave;
use crate::stage::{SignalStage, StageKind};
use ecg_core::{EcgError, EcgResult, SamplingRate, SignalEntity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleConfig {
    /// Output rate in Hz
    pub target_rate: f64,
    /// Rates closer than this to the target are passed through (Hz)
    pub tolerance: f64,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            target_rate: 200.0,
            tolerance: 0.1,
        }
    }
}

impl ResampleConfig {
    pub fn validate(&self) -> EcgResult<()> {
        SamplingRate::new(self.target_rate).map_err(|_| EcgError::Configuration {
            message: format!("target rate must be positive, got {}", self.target_rate),
        })?;
        if self.tolerance.is_nan() || self.tolerance < 0.0 {
            return Err(EcgError::Configuration {
                message: format!("tolerance must be non-negative, got {}", self.tolerance),
            });
        }
        Ok(())
    }
}

/// Reported by the resampling stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampleDetails {
    /// Rate of the output signal
    pub fs_final: f64,
    pub original_samples: usize,
    pub final_samples: usize,
}

/// Number of output samples for `samples` inputs going from `from_hz` to `to_hz`
pub fn target_sample_count(samples: usize, from_hz: f64, to_hz: f64) -> usize {
    (samples as f64 / from_hz * to_hz).round() as usize
}

/// Resample one channel to `count` samples by linear interpolation.
///
/// Positions past the last input sample take its value.
pub fn resample_channel(values: &[f64], from_hz: f64, to_hz: f64, count: usize) -> Vec<f64> {
    let Some(&last) = values.last() else {
        return Vec::new();
    };
    let n = values.len();

    (0..count)
        .map(|i| {
            let t = i as f64 / to_hz * from_hz;
            let idx = t.floor() as usize;
            if idx >= n - 1 {
                last
            } else {
                let frac = t - idx as f64;
                values[idx] * (1.0 - frac) + values[idx + 1] * frac
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct ResampleStage {
    config: ResampleConfig,
}

impl ResampleStage {
    pub fn new(config: ResampleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResampleConfig {
        &self.config
    }
}

impl SignalStage for ResampleStage {
    type Details = ResampleDetails;

    fn kind(&self) -> StageKind {
        StageKind::Resample
    }

    fn apply(&self, input: &SignalEntity) -> EcgResult<(SignalEntity, ResampleDetails)> {
        let target = SamplingRate::new(self.config.target_rate)?;
        let original = input.sampling_rate();
        let samples = input.samples_per_channel();

        if (original.hz() - target.hz()).abs() < self.config.tolerance {
            return Ok((
                input.clone(),
                ResampleDetails {
                    fs_final: target.hz(),
                    original_samples: samples,
                    final_samples: samples,
                },
            ));
        }

        let count = target_sample_count(samples, original.hz(), target.hz());
        let channels: Vec<Vec<f64>> = input
            .all_channels()
            .iter()
            .map(|c| resample_channel(c, original.hz(), target.hz(), count))
            .collect();

        // An empty input yields no samples regardless of the computed count
        let produced = channels.first().map_or(0, Vec::len);
        let data = interleave(&channels, produced);
        let output = SignalEntity::new(data, input.metadata.with_sampling_rate(target))?;

        tracing::debug!(
            from_hz = original.hz(),
            to_hz = target.hz(),
            samples,
            resampled = produced,
            "Resampled signal"
        );

        Ok((
            output,
            ResampleDetails {
                fs_final: target.hz(),
                original_samples: samples,
                final_samples: produced,
            },
        ))
    }

    fn fallback_details(&self, input: &SignalEntity) -> ResampleDetails {
        ResampleDetails {
            fs_final: input.sampling_rate().hz(),
            original_samples: input.samples_per_channel(),
            final_samples: input.samples_per_channel(),
        }
    }

    fn success_message(&self) -> String {
        format!("resampled to {} Hz", self.config.target_rate)
    }
}
