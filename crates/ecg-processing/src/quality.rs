//! Quality gate: decides whether a raw recording is worth conditioning

use crate::stage::{RejectionReason, StageResult};
use ecg_core::{ChannelStats, EcgError, EcgResult, Lead, SignalEntity, LEAD_COUNT};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Acceptance thresholds for the quality gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Minimum recording length in seconds
    pub min_duration_s: f64,
    /// Maximum share of NaN/infinite values per channel
    pub max_nan_proportion: f64,
    /// Minimum population standard deviation per channel
    pub min_std_dev: f64,
    /// Maximum share of repeated values (after rounding to 3 decimals)
    pub max_flat_proportion: f64,
    /// Window around each extreme, as a share of the channel range
    pub saturation_window: f64,
    /// Maximum share of values inside the extreme windows
    pub max_saturation_proportion: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_duration_s: 5.0,
            max_nan_proportion: 0.10,
            min_std_dev: 0.01,
            max_flat_proportion: 0.50,
            saturation_window: 0.05,
            max_saturation_proportion: 0.10,
        }
    }
}

impl QualityThresholds {
    pub fn validate(&self) -> EcgResult<()> {
        let proportions = [
            ("max_nan_proportion", self.max_nan_proportion),
            ("max_flat_proportion", self.max_flat_proportion),
            ("saturation_window", self.saturation_window),
            ("max_saturation_proportion", self.max_saturation_proportion),
        ];
        for (name, value) in proportions {
            if !(0.0..=1.0).contains(&value) {
                return Err(EcgError::Configuration {
                    message: format!("{} must be within [0, 1], got {}", name, value),
                });
            }
        }

        if [self.min_duration_s, self.min_std_dev]
            .iter()
            .any(|v| v.is_nan() || *v < 0.0)
        {
            return Err(EcgError::Configuration {
                message: "minimum duration and standard deviation must be non-negative".to_string(),
            });
        }

        Ok(())
    }
}

/// Reported by the quality gate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityDetails {
    /// Recording length in seconds, once the shape checks passed
    pub duration_seconds: Option<f64>,
    pub sampling_rate: Option<f64>,
}

/// Validates shape, duration and per-channel statistics.
///
/// Checks run in a fixed order and the first failing one decides the
/// rejection.
#[derive(Debug, Clone, Default)]
pub struct QualityGate {
    thresholds: QualityThresholds,
}

impl QualityGate {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn check(&self, signal: &SignalEntity) -> StageResult<QualityDetails> {
        let result = self.evaluate(signal);
        match &result {
            StageResult::Rejected { reason, message, .. } => {
                tracing::warn!(?reason, %message, "Signal rejected by quality gate");
            }
            _ => tracing::debug!("Signal passed quality gate"),
        }
        result
    }

    fn evaluate(&self, signal: &SignalEntity) -> StageResult<QualityDetails> {
        let t = &self.thresholds;

        if signal.samples_per_channel() == 0 {
            return reject(RejectionReason::EmptySignal, "empty signal".to_string(), QualityDetails::default());
        }

        if signal.channel_count() != LEAD_COUNT {
            return reject(
                RejectionReason::InvalidChannelCount,
                format!("expected {} channels, found {}", LEAD_COUNT, signal.channel_count()),
                QualityDetails::default(),
            );
        }

        let rate = signal.sampling_rate().hz();
        let duration = signal.duration_seconds();
        let details = QualityDetails {
            duration_seconds: Some(duration),
            sampling_rate: Some(rate),
        };

        if duration < t.min_duration_s {
            return reject(
                RejectionReason::InsufficientDuration,
                format!(
                    "signal too short: {:.2} s at {} Hz (minimum {} s)",
                    duration, rate, t.min_duration_s
                ),
                details,
            );
        }

        for channel in 0..signal.channel_count() {
            // Channel index is always in range here
            let values = signal.channel_data(channel).unwrap_or_default();
            if let Some((reason, message)) = self.check_channel(channel, &values) {
                return reject(reason, message, details);
            }
        }

        StageResult::ok("signal valid", details)
    }

    fn check_channel(&self, channel: usize, values: &[f64]) -> Option<(RejectionReason, String)> {
        let t = &self.thresholds;
        let name = channel_name(channel);
        let stats = ChannelStats::calculate(values);

        if stats.finite_count == 0 {
            return Some((
                RejectionReason::NoValidValues,
                format!("channel {} has no valid values", name),
            ));
        }

        let nan_proportion = stats.non_finite_proportion();
        if nan_proportion > t.max_nan_proportion {
            return Some((
                RejectionReason::ExcessiveNan,
                format!(
                    "channel {} has too many invalid values: NaN proportion {:.1}% (maximum {:.1}%)",
                    name,
                    nan_proportion * 100.0,
                    t.max_nan_proportion * 100.0
                ),
            ));
        }

        if stats.std_dev < t.min_std_dev {
            return Some((
                RejectionReason::LowStdDev,
                format!(
                    "channel {} standard deviation too low: {:.6} (minimum {})",
                    name, stats.std_dev, t.min_std_dev
                ),
            ));
        }

        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();

        let distinct: HashSet<u64> = finite.iter().map(|&v| flatness_key(v)).collect();
        let flat_proportion = 1.0 - distinct.len() as f64 / finite.len() as f64;
        if flat_proportion > t.max_flat_proportion {
            return Some((
                RejectionReason::TooManyConstantValues,
                format!(
                    "channel {} has too many constant values: {:.1}%",
                    name,
                    flat_proportion * 100.0
                ),
            ));
        }

        let range = stats.range();
        if range > 0.0 {
            let window = range * t.saturation_window;
            let saturated = finite
                .iter()
                .filter(|v| (*v - stats.max).abs() < window || (*v - stats.min).abs() < window)
                .count();
            let saturation = saturated as f64 / finite.len() as f64;
            if saturation > t.max_saturation_proportion {
                return Some((
                    RejectionReason::Saturated,
                    format!("channel {} appears saturated: {:.1}%", name, saturation * 100.0),
                ));
            }
        }

        None
    }
}

fn reject(
    reason: RejectionReason,
    message: String,
    details: QualityDetails,
) -> StageResult<QualityDetails> {
    StageResult::Rejected {
        reason,
        message,
        details,
    }
}

fn channel_name(channel: usize) -> String {
    Lead::from_channel(channel)
        .map(|lead| lead.to_string())
        .unwrap_or_else(|| channel.to_string())
}

/// Value rounded to 0.001 with halves going up, as f64 bits so large values
/// never saturate. Both zeros share a key.
fn flatness_key(value: f64) -> u64 {
    let rounded = (value * 1000.0 + 0.5).floor();
    if rounded == 0.0 {
        0.0f64.to_bits()
    } else {
        rounded.to_bits()
    }
}
