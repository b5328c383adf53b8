//! Raw recordings as they arrive from the outside world

use crate::ecg_types::{EcgMetadata, SamplingRate, LEAD_COUNT};
use crate::error::EcgResult;
use crate::signal_entity::SignalEntity;
use serde::{Deserialize, Serialize};

/// Raw three-lead recording.
///
/// Lead arrays may have different lengths; conversion to a signal uses the
/// shortest. The time column only feeds the sampling-rate estimate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEcgRecord {
    /// Timestamps in seconds
    pub time_s: Vec<f64>,
    #[serde(rename = "II")]
    pub lead_ii: Vec<f64>,
    #[serde(rename = "V1")]
    pub lead_v1: Vec<f64>,
    #[serde(rename = "V5")]
    pub lead_v5: Vec<f64>,
    /// Reference label shipped with the recording, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_truth: Option<GroundTruth>,
}

impl RawEcgRecord {
    /// Record from lead arrays and a time column
    pub fn new(time_s: Vec<f64>, lead_ii: Vec<f64>, lead_v1: Vec<f64>, lead_v5: Vec<f64>) -> Self {
        RawEcgRecord {
            time_s,
            lead_ii,
            lead_v1,
            lead_v5,
            ground_truth: None,
        }
    }

    /// Attach a reference label
    pub fn with_ground_truth(mut self, ground_truth: GroundTruth) -> Self {
        self.ground_truth = Some(ground_truth);
        self
    }

    /// Sampling rate derived from the time column
    pub fn sampling_rate(&self) -> SamplingRate {
        SamplingRate::from_time_column(&self.time_s)
    }

    /// Usable sample count (shortest lead)
    pub fn sample_count(&self) -> usize {
        self.lead_ii
            .len()
            .min(self.lead_v1.len())
            .min(self.lead_v5.len())
    }

    /// Convert to an interleaved three-channel signal
    pub fn to_signal(&self) -> EcgResult<SignalEntity> {
        let samples = self.sample_count();
        let mut data = Vec::with_capacity(samples * LEAD_COUNT);
        for i in 0..samples {
            data.push(self.lead_ii[i]);
            data.push(self.lead_v1[i]);
            data.push(self.lead_v5[i]);
        }

        SignalEntity::new(data, EcgMetadata::three_lead(self.sampling_rate()))
    }
}

/// Reference annotation for a recording (0 = normal, 1 = anomalous)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundTruth {
    pub label: u8,
    pub is_anomalous: bool,
}

impl GroundTruth {
    /// From a numeric label; only label 1 is anomalous
    pub fn from_label(label: u8) -> Self {
        GroundTruth {
            label,
            is_anomalous: label == 1,
        }
    }

    /// From an anomaly flag
    pub fn from_flag(is_anomalous: bool) -> Self {
        GroundTruth {
            label: u8::from(is_anomalous),
            is_anomalous,
        }
    }

    /// Resolve the two annotation columns; the numeric label wins when both exist
    pub fn resolve(label: Option<u8>, flag: Option<bool>) -> Option<Self> {
        match (label, flag) {
            (Some(label), Some(flag)) => {
                let resolved = GroundTruth::from_label(label);
                if resolved.is_anomalous != flag {
                    tracing::warn!(
                        label,
                        is_anomalous = flag,
                        "Inconsistent annotations, using numeric label"
                    );
                }
                Some(resolved)
            }
            (Some(label), None) => Some(GroundTruth::from_label(label)),
            (None, Some(flag)) => Some(GroundTruth::from_flag(flag)),
            (None, None) => None,
        }
    }
}
