//! Three-lead ECG simulator with realistic noise sources

use crate::signal_patterns::SignalPattern;
use ecg_core::{input_error, EcgError, EcgResult, GroundTruth, Lead, RawEcgRecord, SamplingRate, SignalEntity};
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Configuration for ECG simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcgConfig {
    /// Sampling rate in Hz
    pub sampling_rate: f64,
    /// Waveform to generate
    pub pattern: SignalPattern,
    /// Noise configuration
    pub noise: NoiseConfig,
    /// Power line interference (50/60Hz)
    pub mains_frequency: Option<f64>,
    /// Share of samples replaced by NaN (0.0 to 1.0)
    pub dropout_proportion: f64,
    /// Finite values are clipped to +/- this level
    pub clip_level: f64,
    /// Reference label attached to generated records
    pub label: Option<u8>,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
}

/// Noise configuration, amplitudes in microvolts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseConfig {
    /// Gaussian noise standard deviation (0.0 = no noise)
    pub gaussian_std: f64,
    /// Baseline wander amplitude
    pub baseline_wander: f64,
    /// Baseline wander frequency in Hz (respiration)
    pub wander_frequency: f64,
    /// Mains interference amplitude
    pub mains_amplitude: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            gaussian_std: 20.0,
            baseline_wander: 50.0,
            wander_frequency: 0.3,
            mains_amplitude: 30.0,
        }
    }
}

impl NoiseConfig {
    /// No noise at all
    pub fn silent() -> Self {
        Self {
            gaussian_std: 0.0,
            baseline_wander: 0.0,
            wander_frequency: 0.0,
            mains_amplitude: 0.0,
        }
    }
}

impl Default for EcgConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 500.0,
            pattern: SignalPattern::default(),
            noise: NoiseConfig::default(),
            mains_frequency: Some(60.0),
            dropout_proportion: 0.0,
            clip_level: 5000.0,
            label: None,
            seed: None,
        }
    }
}

impl EcgConfig {
    /// Noise-free recording of `pattern`
    pub fn clean(pattern: SignalPattern) -> Self {
        Self {
            pattern,
            noise: NoiseConfig::silent(),
            mains_frequency: None,
            ..Self::default()
        }
    }

    fn validate(&self) -> EcgResult<()> {
        SamplingRate::new(self.sampling_rate)?;
        if !(0.0..=1.0).contains(&self.dropout_proportion) {
            return Err(EcgError::Configuration {
                message: format!(
                    "dropout proportion must be within [0, 1], got {}",
                    self.dropout_proportion
                ),
            });
        }
        if self.clip_level.is_nan() || self.clip_level <= 0.0 {
            return Err(EcgError::Configuration {
                message: format!("clip level must be positive, got {}", self.clip_level),
            });
        }
        Ok(())
    }
}

/// ECG signal simulator
pub struct EcgSimulator {
    config: EcgConfig,
    rng: rand::rngs::StdRng,
    normal_dist: Normal<f64>,
    time_offset: f64,
}

impl EcgSimulator {
    /// Create new ECG simulator with configuration
    pub fn new(config: EcgConfig) -> EcgResult<Self> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
            None => rand::rngs::StdRng::from_entropy(),
        };
        let normal_dist = Normal::new(0.0, config.noise.gaussian_std).map_err(|e| {
            EcgError::Configuration {
                message: format!("Failed to create normal distribution: {}", e),
            }
        })?;

        Ok(EcgSimulator {
            config,
            rng,
            normal_dist,
            time_offset: 0.0,
        })
    }

    /// Generate a raw recording (with time column) for the given duration
    pub fn generate(&mut self, duration: f64) -> EcgResult<RawEcgRecord> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(input_error!("duration must be a non-negative number of seconds, got {}", duration));
        }

        let rate = self.config.sampling_rate;
        let samples = (duration * rate).round() as usize;
        let dt = 1.0 / rate;

        let mut record = RawEcgRecord::default();
        record.time_s.reserve(samples);
        for lead in [&mut record.lead_ii, &mut record.lead_v1, &mut record.lead_v5] {
            lead.reserve(samples);
        }

        for sample_idx in 0..samples {
            let time = self.time_offset + sample_idx as f64 * dt;
            record.time_s.push(time);

            for lead in Lead::ALL {
                let value = self.generate_sample(time, lead);
                match lead {
                    Lead::II => record.lead_ii.push(value),
                    Lead::V1 => record.lead_v1.push(value),
                    Lead::V5 => record.lead_v5.push(value),
                }
            }
        }

        // Update time offset for continuous generation
        self.time_offset += samples as f64 * dt;

        if let Some(label) = self.config.label {
            record.ground_truth = Some(GroundTruth::from_label(label));
        }

        tracing::debug!(
            samples,
            pattern = self.config.pattern.description(),
            "Generated synthetic ECG"
        );

        Ok(record)
    }

    /// Generate directly as a three-channel signal at the configured rate
    pub fn generate_signal(&mut self, duration: f64) -> EcgResult<SignalEntity> {
        let record = self.generate(duration)?;
        let rate = SamplingRate::new(self.config.sampling_rate)?;
        let channels = vec![record.lead_ii, record.lead_v1, record.lead_v5];
        SignalEntity::from_channels(&channels, rate)
    }

    fn generate_sample(&mut self, time: f64, lead: Lead) -> f64 {
        if self.config.dropout_proportion > 0.0
            && self.rng.gen::<f64>() < self.config.dropout_proportion
        {
            return f64::NAN;
        }

        let mut value = self.config.pattern.value_at_time(time, lead);
        value += self.add_noise(time);

        if let Some(frequency) = self.config.mains_frequency {
            value += self.add_mains_interference(time, frequency);
        }

        value.clamp(-self.config.clip_level, self.config.clip_level)
    }

    /// Gaussian noise plus respiratory baseline wander
    fn add_noise(&mut self, time: f64) -> f64 {
        let noise = &self.config.noise;
        let wander = noise.baseline_wander
            * (2.0 * std::f64::consts::PI * noise.wander_frequency * time).sin();

        self.normal_dist.sample(&mut self.rng) + wander
    }

    fn add_mains_interference(&self, time: f64, frequency: f64) -> f64 {
        self.config.noise.mains_amplitude * (2.0 * std::f64::consts::PI * frequency * time).sin()
    }

    /// Reset time offset (useful for restarting simulation)
    pub fn reset_time(&mut self) {
        self.time_offset = 0.0;
    }

    /// Get current configuration
    pub fn config(&self) -> &EcgConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecg_core::ChannelStats;

    fn seeded(mut config: EcgConfig) -> EcgSimulator {
        config.seed = Some(7);
        EcgSimulator::new(config).unwrap()
    }

    #[test]
    fn test_ecg_simulator_basic() {
        let mut simulator = seeded(EcgConfig::default());
        let record = simulator.generate(2.0).unwrap();

        assert_eq!(record.sample_count(), 1000);
        assert_eq!(record.time_s.len(), 1000);
        assert!((record.sampling_rate().hz() - 500.0).abs() < 1e-6);

        let signal = record.to_signal().unwrap();
        assert_eq!(signal.channel_count(), 3);
        for channel in 0..3 {
            let stats = signal.channel_stats(channel).unwrap();
            assert!(stats.std_dev > 10.0);
            assert!(stats.min >= -5000.0 && stats.max <= 5000.0);
        }
    }

    #[test]
    fn test_seed_is_reproducible() {
        let a = seeded(EcgConfig::default()).generate(1.0).unwrap();
        let b = seeded(EcgConfig::default()).generate(1.0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_continuous_generation() {
        let mut simulator = seeded(EcgConfig::default());
        let first = simulator.generate(1.0).unwrap();
        let second = simulator.generate(1.0).unwrap();
        assert!((second.time_s[0] - 1.0).abs() < 1e-9);
        assert!(first.time_s[499] < second.time_s[0]);

        simulator.reset_time();
        let third = simulator.generate(0.1).unwrap();
        assert_eq!(third.time_s[0], 0.0);
    }

    #[test]
    fn test_dropout_injects_nan() {
        let mut config = EcgConfig::default();
        config.dropout_proportion = 0.5;
        let signal = seeded(config).generate_signal(10.0).unwrap();

        let lead = signal.channel_data(0).unwrap();
        let stats = ChannelStats::calculate(&lead);
        assert!(stats.non_finite_proportion() > 0.4);
        assert!(stats.non_finite_proportion() < 0.6);
    }

    #[test]
    fn test_clean_flat_line() {
        let config = EcgConfig::clean(SignalPattern::Flat { level: 0.0 });
        let signal = seeded(config).generate_signal(1.0).unwrap();
        assert!(signal.data().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_label_attached() {
        let mut config = EcgConfig::default();
        config.label = Some(1);
        let record = seeded(config).generate(0.5).unwrap();
        assert_eq!(record.ground_truth, Some(GroundTruth::from_label(1)));
    }

    #[test]
    fn test_invalid_config() {
        let mut config = EcgConfig::default();
        config.sampling_rate = 0.0;
        assert!(EcgSimulator::new(config).is_err());

        let mut config = EcgConfig::default();
        config.dropout_proportion = 1.5;
        assert!(EcgSimulator::new(config).is_err());

        let mut config = EcgConfig::default();
        config.noise.gaussian_std = -1.0;
        assert!(EcgSimulator::new(config).is_err());
    }

    #[test]
    fn test_invalid_duration() {
        let mut simulator = EcgSimulator::new(EcgConfig::default()).unwrap();
        let err = simulator.generate(-1.0).unwrap_err();
        assert!(err.is_input_error());
        assert!(simulator.generate(f64::NAN).is_err());
        assert_eq!(simulator.generate(0.0).unwrap().sample_count(), 0);
    }
}
