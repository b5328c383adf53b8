//! SignalEntity: Core container for multi-lead ECG data

use crate::ecg_types::{EcgMetadata, SamplingRate};
use crate::error::{EcgError, EcgResult};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

/// Container for ECG signal data.
///
/// Samples are stored interleaved (`[s0c0, s0c1, s0c2, s1c0, ...]`) so every
/// sample has exactly `channel_count` values. A signal is never modified once
/// built; stages produce new entities.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEntity {
    /// Unique identifier for this signal entity
    pub id: Uuid,
    /// Interleaved sample data
    data: Vec<f64>,
    /// Signal metadata
    pub metadata: EcgMetadata,
}

impl SignalEntity {
    /// Create new signal entity with interleaved data and metadata
    pub fn new(data: Vec<f64>, metadata: EcgMetadata) -> EcgResult<Self> {
        let channels = metadata.channel_count;
        if channels == 0 && !data.is_empty() {
            return Err(EcgError::InvalidSignalData {
                reason: "signal with zero channels cannot carry data".to_string(),
            });
        }
        if channels > 0 && data.len() % channels != 0 {
            return Err(EcgError::InvalidSignalData {
                reason: format!(
                    "Data length {} is not a multiple of {} channels",
                    data.len(),
                    channels
                ),
            });
        }

        Ok(SignalEntity {
            id: Uuid::new_v4(),
            data,
            metadata,
        })
    }

    /// Build a signal from per-channel vectors of equal length
    pub fn from_channels(channels: &[Vec<f64>], sampling_rate: SamplingRate) -> EcgResult<Self> {
        let samples = channels.first().map_or(0, Vec::len);
        if let Some(bad) = channels.iter().position(|c| c.len() != samples) {
            return Err(EcgError::InvalidSignalData {
                reason: format!(
                    "Channel {} has {} samples, expected {}",
                    bad,
                    channels[bad].len(),
                    samples
                ),
            });
        }

        let mut data = Vec::with_capacity(samples * channels.len());
        for sample_idx in 0..samples {
            for channel in channels {
                data.push(channel[sample_idx]);
            }
        }

        SignalEntity::new(data, EcgMetadata::new(sampling_rate, channels.len()))
    }

    /// Build a signal from sample rows; every row must have the same width
    pub fn from_rows(rows: &[Vec<f64>], sampling_rate: SamplingRate) -> EcgResult<Self> {
        let width = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().position(|r| r.len() != width) {
            return Err(EcgError::InvalidSignalData {
                reason: format!(
                    "Sample {} has {} channels, expected {}",
                    bad,
                    rows[bad].len(),
                    width
                ),
            });
        }

        let data = rows.iter().flatten().copied().collect();
        SignalEntity::new(data, EcgMetadata::new(sampling_rate, width))
    }

    /// Get total number of values across all channels
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if entity is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Interleaved sample data
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Get number of samples per channel
    pub fn samples_per_channel(&self) -> usize {
        if self.metadata.channel_count == 0 {
            0
        } else {
            self.data.len() / self.metadata.channel_count
        }
    }

    /// Get sampling rate
    pub fn sampling_rate(&self) -> SamplingRate {
        self.metadata.sampling_rate
    }

    /// Get channel count
    pub fn channel_count(&self) -> usize {
        self.metadata.channel_count
    }

    /// Duration in seconds implied by sample count and rate
    pub fn duration_seconds(&self) -> f64 {
        self.samples_per_channel() as f64 / self.metadata.sampling_rate.hz()
    }

    /// One sample (all channels) by index
    pub fn sample(&self, index: usize) -> Option<&[f64]> {
        let channels = self.metadata.channel_count;
        let start = index.checked_mul(channels)?;
        self.data.get(start..start + channels).filter(|s| !s.is_empty())
    }

    /// Iterate over samples as channel slices
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        // Zero-channel signals are always empty, max(1) only keeps chunks() happy.
        self.data.chunks(self.metadata.channel_count.max(1))
    }

    /// Get data for a specific channel
    pub fn channel_data(&self, channel_index: usize) -> EcgResult<Vec<f64>> {
        let channels = self.metadata.channel_count;
        if channel_index >= channels {
            return Err(EcgError::ChannelOutOfRange {
                index: channel_index,
                channel_count: channels,
            });
        }

        Ok(self
            .data
            .iter()
            .skip(channel_index)
            .step_by(channels)
            .copied()
            .collect())
    }

    /// Get all channel data as separate vectors
    pub fn all_channels(&self) -> Vec<Vec<f64>> {
        let channels = self.metadata.channel_count;
        let mut out = vec![Vec::with_capacity(self.samples_per_channel()); channels];
        for row in self.rows() {
            for (channel, value) in out.iter_mut().zip(row) {
                channel.push(*value);
            }
        }
        out
    }

    /// Calculate statistics over the finite values of one channel
    pub fn channel_stats(&self, channel_index: usize) -> EcgResult<ChannelStats> {
        let data = self.channel_data(channel_index)?;
        Ok(ChannelStats::calculate(&data))
    }

    /// True if any value is NaN or infinite
    pub fn has_non_finite(&self) -> bool {
        self.data.iter().any(|v| !v.is_finite())
    }
}

impl Serialize for SignalEntity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.rows())
    }
}

/// Statistics for one channel, computed over finite values only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    /// All values, finite or not
    pub total_count: usize,
    /// Finite values the statistics were computed from
    pub finite_count: usize,
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl ChannelStats {
    /// Statistics over the finite values of `data`.
    ///
    /// With no finite values every statistic is `0.0` and `finite_count` is 0.
    pub fn calculate(data: &[f64]) -> Self {
        let finite: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();

        if finite.is_empty() {
            return Self {
                total_count: data.len(),
                finite_count: 0,
                mean: 0.0,
                std_dev: 0.0,
                min: 0.0,
                max: 0.0,
            };
        }

        let n = finite.len() as f64;
        let mean = finite.iter().sum::<f64>() / n;
        let variance = finite.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

        let min = finite.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let max = finite.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

        Self {
            total_count: data.len(),
            finite_count: finite.len(),
            mean,
            std_dev: variance.sqrt(),
            min,
            max,
        }
    }

    /// Values that are NaN or infinite
    pub fn non_finite_count(&self) -> usize {
        self.total_count - self.finite_count
    }

    /// Share of non-finite values (0.0 for an empty channel)
    pub fn non_finite_proportion(&self) -> f64 {
        if self.total_count == 0 {
            0.0
        } else {
            self.non_finite_count() as f64 / self.total_count as f64
        }
    }

    /// Peak-to-peak range of the finite values
    pub fn range(&self) -> f64 {
        self.max - self.min
    }
}
