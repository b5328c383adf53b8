//! Fixed-shape model input

use ecg_core::{EcgError, EcgResult, SignalEntity, LEAD_COUNT};
use serde::{Deserialize, Serialize, Serializer};

/// Packaging parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TensorConfig {
    /// Samples per channel in the tensor
    pub target_length: usize,
    /// Channel count used when the signal carries none
    pub default_channels: usize,
}

impl Default for TensorConfig {
    fn default() -> Self {
        Self {
            target_length: 2000,
            default_channels: LEAD_COUNT,
        }
    }
}

impl TensorConfig {
    pub fn validate(&self) -> EcgResult<()> {
        if self.target_length == 0 || self.default_channels == 0 {
            return Err(EcgError::Configuration {
                message: "tensor length and default channel count must be greater than 0"
                    .to_string(),
            });
        }
        Ok(())
    }
}

/// `[1, length, channels]` tensor, stored row-major.
///
/// Serializes as nested arrays `[[[c0, c1, c2], ...]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTensor {
    data: Vec<f64>,
    length: usize,
    channels: usize,
}

impl ModelTensor {
    /// Zero-filled tensor
    pub fn zeros(length: usize, channels: usize) -> Self {
        Self {
            data: vec![0.0; length * channels],
            length,
            channels,
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        [1, self.length, self.channels]
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Value at time step `t`, channel `c`
    pub fn get(&self, t: usize, c: usize) -> Option<f64> {
        if t < self.length && c < self.channels {
            self.data.get(t * self.channels + c).copied()
        } else {
            None
        }
    }

    /// Time steps as channel slices
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.data.chunks(self.channels.max(1))
    }

    pub fn has_non_finite(&self) -> bool {
        self.data.iter().any(|v| !v.is_finite())
    }
}

struct TensorRows<'a>(&'a ModelTensor);

impl Serialize for TensorRows<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.rows())
    }
}

impl Serialize for ModelTensor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq([TensorRows(self)])
    }
}

/// Pads or truncates a signal into a [`ModelTensor`]
#[derive(Debug, Clone, Default)]
pub struct TensorPackager {
    config: TensorConfig,
}

impl TensorPackager {
    pub fn new(config: TensorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TensorConfig {
        &self.config
    }

    /// Copy up to `target_length` samples, zero for anything missing or
    /// non-finite. No scaling or clipping.
    pub fn pack(&self, signal: &SignalEntity) -> ModelTensor {
        let channels = match signal.channel_count() {
            0 => self.config.default_channels,
            n => n,
        };
        let mut tensor = ModelTensor::zeros(self.config.target_length, channels);

        for (row, sample) in tensor.data.chunks_mut(channels.max(1)).zip(signal.rows()) {
            for (slot, &value) in row.iter_mut().zip(sample) {
                if value.is_finite() {
                    *slot = value;
                }
            }
        }

        tracing::debug!(
            shape = ?tensor.shape(),
            samples = signal.samples_per_channel(),
            "Packaged tensor"
        );
        tensor
    }
}

/// Reported by the packaging stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageDetails {
    pub shape: Option<[usize; 3]>,
}
