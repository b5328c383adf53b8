//! Per-channel z-score normalization

use crate::filters::interleave;
use crate::stage::{SignalStage, StageKind};
use ecg_core::{ChannelStats, EcgResult, SignalEntity};
use serde::{Deserialize, Serialize};

/// Method reported when normalization succeeded
pub const ZSCORE_METHOD: &str = "z-score (per channel)";
/// Method reported when the signal was left untouched
pub const NO_METHOD: &str = "none";

/// Reported by the normalization stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationDetails {
    pub method: String,
}

/// Z-score one channel.
///
/// Mean and standard deviation come from the finite values only. A zero
/// deviation is treated as 1 and non-finite samples become 0. A channel with
/// no finite values is returned unchanged.
pub fn zscore(values: &[f64]) -> Vec<f64> {
    let stats = ChannelStats::calculate(values);
    if stats.finite_count == 0 {
        return values.to_vec();
    }

    let std_dev = if stats.std_dev == 0.0 { 1.0 } else { stats.std_dev };
    values
        .iter()
        .map(|&v| if v.is_finite() { (v - stats.mean) / std_dev } else { 0.0 })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizationStage;

impl SignalStage for NormalizationStage {
    type Details = NormalizationDetails;

    fn kind(&self) -> StageKind {
        StageKind::Normalize
    }

    fn apply(&self, input: &SignalEntity) -> EcgResult<(SignalEntity, NormalizationDetails)> {
        let channels: Vec<Vec<f64>> = input.all_channels().iter().map(|c| zscore(c)).collect();
        let data = interleave(&channels, input.samples_per_channel());
        let output = SignalEntity::new(data, input.metadata.clone())?;

        Ok((
            output,
            NormalizationDetails {
                method: ZSCORE_METHOD.to_string(),
            },
        ))
    }

    fn fallback_details(&self, _input: &SignalEntity) -> NormalizationDetails {
        NormalizationDetails {
            method: NO_METHOD.to_string(),
        }
    }

    fn success_message(&self) -> String {
        "signal normalized".to_string()
    }
}
