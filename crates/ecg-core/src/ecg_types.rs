//! ECG-specific signal types and metadata

use serde::{Deserialize, Serialize};
use crate::error::{EcgError, EcgResult};

/// Default rate used when the time column cannot provide one
pub const DEFAULT_SAMPLING_RATE_HZ: f64 = 500.0;

/// Number of leads the pipeline accepts
pub const LEAD_COUNT: usize = 3;

/// ECG leads carried by a recording, in channel order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lead {
    II,
    V1,
    V5,
}

impl Lead {
    /// All leads in channel order
    pub const ALL: [Lead; LEAD_COUNT] = [Lead::II, Lead::V1, Lead::V5];

    /// Channel index of this lead
    pub fn channel(self) -> usize {
        match self {
            Lead::II => 0,
            Lead::V1 => 1,
            Lead::V5 => 2,
        }
    }

    /// Lead for a channel index
    pub fn from_channel(index: usize) -> Option<Lead> {
        Lead::ALL.get(index).copied()
    }

    /// Column name used in CSV exports
    pub fn column_name(self) -> &'static str {
        match self {
            Lead::II => "II",
            Lead::V1 => "V1",
            Lead::V5 => "V5",
        }
    }
}

impl std::fmt::Display for Lead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column_name())
    }
}

/// Sampling rate in Hz; always finite and positive
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct SamplingRate(f64);

impl SamplingRate {
    /// Validate a rate
    pub fn new(hz: f64) -> EcgResult<Self> {
        if hz.is_finite() && hz > 0.0 {
            Ok(SamplingRate(hz))
        } else {
            Err(EcgError::InvalidSamplingRate { rate: hz })
        }
    }

    /// Derive the rate from the spacing of the first two timestamps.
    ///
    /// Falls back to [`DEFAULT_SAMPLING_RATE_HZ`] when there are fewer than two
    /// timestamps or the spacing does not give a usable rate.
    pub fn from_time_column(times: &[f64]) -> Self {
        if let [t0, t1, ..] = times {
            let dt = t1 - t0;
            if dt > 0.0 {
                if let Ok(rate) = SamplingRate::new(1.0 / dt) {
                    return rate;
                }
            }
        }
        SamplingRate::default()
    }

    /// Rate in Hz
    pub fn hz(self) -> f64 {
        self.0
    }
}

impl Default for SamplingRate {
    fn default() -> Self {
        SamplingRate(DEFAULT_SAMPLING_RATE_HZ)
    }
}

impl TryFrom<f64> for SamplingRate {
    type Error = EcgError;

    fn try_from(hz: f64) -> EcgResult<Self> {
        SamplingRate::new(hz)
    }
}

impl From<SamplingRate> for f64 {
    fn from(rate: SamplingRate) -> f64 {
        rate.0
    }
}

impl std::fmt::Display for SamplingRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Hz", self.0)
    }
}

/// ECG signal metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcgMetadata {
    /// Sampling rate
    pub sampling_rate: SamplingRate,
    /// Number of channels per sample
    pub channel_count: usize,
}

impl EcgMetadata {
    /// Metadata for a standard three-lead recording
    pub fn three_lead(sampling_rate: SamplingRate) -> Self {
        EcgMetadata {
            sampling_rate,
            channel_count: LEAD_COUNT,
        }
    }

    /// Metadata with an arbitrary channel count
    pub fn new(sampling_rate: SamplingRate, channel_count: usize) -> Self {
        EcgMetadata {
            sampling_rate,
            channel_count,
        }
    }

    /// Same metadata at a different rate
    pub fn with_sampling_rate(&self, sampling_rate: SamplingRate) -> Self {
        EcgMetadata {
            sampling_rate,
            ..self.clone()
        }
    }
}

impl Default for EcgMetadata {
    fn default() -> Self {
        EcgMetadata::three_lead(SamplingRate::default())
    }
}
