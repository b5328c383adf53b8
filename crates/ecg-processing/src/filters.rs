//! Digital filters for ECG conditioning
//!
//! Mains interference is removed with a biquad notch; out-of-band noise with
//! a first-order RC high-pass cascaded into a first-order RC low-pass. Filter
//! state is a small `Copy` struct threaded through the samples of a channel,
//! so every channel starts from a clean history.

use crate::stage::{SignalStage, StageKind};
use ecg_core::{EcgError, EcgResult, SignalEntity};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Filters applied by the filter stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    /// Biquad band-reject at the mains frequency
    Notch,
    /// One-pole high-pass into one-pole low-pass
    Bandpass,
}

impl FilterType {
    pub fn label(self) -> &'static str {
        match self {
            FilterType::Notch => "notch",
            FilterType::Bandpass => "bandpass",
        }
    }
}

/// Filter configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Rates above this use the high mains frequency (Hz)
    pub mains_threshold_hz: f64,
    /// Notch frequency for rates above the threshold (Hz)
    pub high_mains_hz: f64,
    /// Notch frequency otherwise (Hz)
    pub low_mains_hz: f64,
    /// Notch quality factor
    pub notch_q: f64,
    /// High-pass cutoff (Hz)
    pub bandpass_low_hz: f64,
    /// Low-pass cutoff (Hz)
    pub bandpass_high_hz: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            mains_threshold_hz: 300.0,
            high_mains_hz: 60.0,
            low_mains_hz: 50.0,
            notch_q: 30.0,
            bandpass_low_hz: 0.5,
            bandpass_high_hz: 40.0,
        }
    }
}

impl FilterConfig {
    /// Mains frequency to notch out for a recording at `sampling_rate`
    pub fn mains_frequency(&self, sampling_rate: f64) -> f64 {
        if sampling_rate > self.mains_threshold_hz {
            self.high_mains_hz
        } else {
            self.low_mains_hz
        }
    }

    pub fn validate(&self) -> EcgResult<()> {
        let positive = [
            ("high_mains_hz", self.high_mains_hz),
            ("low_mains_hz", self.low_mains_hz),
            ("notch_q", self.notch_q),
            ("bandpass_low_hz", self.bandpass_low_hz),
            ("bandpass_high_hz", self.bandpass_high_hz),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(EcgError::Configuration {
                    message: format!("{} must be positive, got {}", name, value),
                });
            }
        }

        if self.bandpass_low_hz >= self.bandpass_high_hz {
            return Err(EcgError::Configuration {
                message: format!(
                    "bandpass low cutoff ({} Hz) must be below high cutoff ({} Hz)",
                    self.bandpass_low_hz, self.bandpass_high_hz
                ),
            });
        }

        Ok(())
    }
}

/// Normalized biquad coefficients (a0 = 1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoefficients {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoefficients {
    /// Band-reject centred on `frequency`
    pub fn notch(frequency: f64, q: f64, sampling_rate: f64) -> EcgResult<Self> {
        if !(frequency > 0.0 && q > 0.0 && sampling_rate.is_finite()) {
            return Err(EcgError::StageFailed {
                stage: "filter",
                message: format!("invalid notch parameters: {} Hz, Q {}", frequency, q),
            });
        }
        // At exactly Nyquist the notch degenerates to a pass-through
        if frequency > sampling_rate / 2.0 {
            return Err(EcgError::StageFailed {
                stage: "filter",
                message: format!(
                    "notch frequency {} Hz is above Nyquist for {} Hz sampling",
                    frequency, sampling_rate
                ),
            });
        }

        let omega = 2.0 * PI * frequency / sampling_rate;
        let alpha = omega.sin() / (2.0 * q);
        let cos_omega = omega.cos();

        let a0 = 1.0 + alpha;
        Ok(Self {
            b0: 1.0 / a0,
            b1: -2.0 * cos_omega / a0,
            b2: 1.0 / a0,
            a1: -2.0 * cos_omega / a0,
            a2: (1.0 - alpha) / a0,
        })
    }

    /// Run the filter over one channel from a zeroed history
    pub fn apply(&self, input: &[f64]) -> Vec<f64> {
        input
            .iter()
            .scan(BiquadState::default(), |state, &x| {
                let (next, y) = state.step(self, x);
                *state = next;
                Some(y)
            })
            .collect()
    }
}

/// Two samples of input and output history
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    /// y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]
    pub fn step(self, c: &BiquadCoefficients, x: f64) -> (Self, f64) {
        let y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        let next = BiquadState {
            x1: x,
            x2: self.x1,
            y1: y,
            y2: self.y1,
        };
        (next, y)
    }
}

/// Previous input and output of a one-pole section
#[derive(Debug, Clone, Copy, PartialEq)]
struct OnePoleState {
    input: f64,
    output: f64,
}

impl OnePoleState {
    /// First output equals the first input
    fn primed(x0: f64) -> Self {
        Self { input: x0, output: x0 }
    }

    fn highpass(self, alpha: f64, x: f64) -> Self {
        Self {
            input: x,
            output: alpha * (self.output + x - self.input),
        }
    }

    fn lowpass(self, alpha: f64, x: f64) -> Self {
        Self {
            input: x,
            output: self.output + alpha * (x - self.output),
        }
    }
}

fn time_constant(cutoff_hz: f64) -> f64 {
    1.0 / (2.0 * PI * cutoff_hz)
}

fn run_one_pole(input: &[f64], step: impl Fn(OnePoleState, f64) -> OnePoleState) -> Vec<f64> {
    let Some((&first, rest)) = input.split_first() else {
        return Vec::new();
    };

    let mut output = Vec::with_capacity(input.len());
    output.push(first);
    let mut state = OnePoleState::primed(first);
    for &x in rest {
        state = step(state, x);
        output.push(state.output);
    }
    output
}

/// First-order RC high-pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnePoleHighpass {
    alpha: f64,
}

impl OnePoleHighpass {
    pub fn new(cutoff_hz: f64, sampling_rate: f64) -> Self {
        let rc = time_constant(cutoff_hz);
        let dt = 1.0 / sampling_rate;
        Self { alpha: rc / (rc + dt) }
    }

    pub fn apply(&self, input: &[f64]) -> Vec<f64> {
        run_one_pole(input, |state, x| state.highpass(self.alpha, x))
    }
}

/// First-order RC low-pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnePoleLowpass {
    alpha: f64,
}

impl OnePoleLowpass {
    pub fn new(cutoff_hz: f64, sampling_rate: f64) -> Self {
        let rc = time_constant(cutoff_hz);
        let dt = 1.0 / sampling_rate;
        Self { alpha: dt / (rc + dt) }
    }

    pub fn apply(&self, input: &[f64]) -> Vec<f64> {
        run_one_pole(input, |state, x| state.lowpass(self.alpha, x))
    }
}

/// High-pass followed by low-pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandpassFilter {
    highpass: OnePoleHighpass,
    lowpass: OnePoleLowpass,
}

impl BandpassFilter {
    pub fn new(low_hz: f64, high_hz: f64, sampling_rate: f64) -> Self {
        Self {
            highpass: OnePoleHighpass::new(low_hz, sampling_rate),
            lowpass: OnePoleLowpass::new(high_hz, sampling_rate),
        }
    }

    pub fn apply(&self, input: &[f64]) -> Vec<f64> {
        self.lowpass.apply(&self.highpass.apply(input))
    }
}

/// Reported by the filter stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterDetails {
    /// Filters in application order; empty when filtering failed
    pub filters_applied: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notch_frequency_hz: Option<f64>,
}

/// Notch then bandpass, channel by channel
#[derive(Debug, Clone, Default)]
pub struct FilterStage {
    config: FilterConfig,
}

impl FilterStage {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }
}

impl SignalStage for FilterStage {
    type Details = FilterDetails;

    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn apply(&self, input: &SignalEntity) -> EcgResult<(SignalEntity, FilterDetails)> {
        self.config.validate()?;

        let rate = input.sampling_rate();
        let mains = self.config.mains_frequency(rate.hz());
        let notch = BiquadCoefficients::notch(mains, self.config.notch_q, rate.hz())?;
        let bandpass = BandpassFilter::new(
            self.config.bandpass_low_hz,
            self.config.bandpass_high_hz,
            rate.hz(),
        );

        let channels: Vec<Vec<f64>> = input
            .all_channels()
            .iter()
            .map(|channel| bandpass.apply(&notch.apply(channel)))
            .collect();

        let data = interleave(&channels, input.samples_per_channel());
        let output = SignalEntity::new(data, input.metadata.clone())?;

        tracing::debug!(mains_hz = mains, rate = rate.hz(), "Applied notch and bandpass");

        Ok((
            output,
            FilterDetails {
                filters_applied: [FilterType::Notch, FilterType::Bandpass]
                    .iter()
                    .map(|f| f.label().to_string())
                    .collect(),
                notch_frequency_hz: Some(mains),
            },
        ))
    }

    fn fallback_details(&self, _input: &SignalEntity) -> FilterDetails {
        FilterDetails::default()
    }

    fn success_message(&self) -> String {
        "filters applied".to_string()
    }
}

/// Channel vectors back to interleaved samples
pub(crate) fn interleave(channels: &[Vec<f64>], samples: usize) -> Vec<f64> {
    let mut data = Vec::with_capacity(samples * channels.len());
    for i in 0..samples {
        data.extend(channels.iter().map(|channel| channel[i]));
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::StageStatus;
    use ecg_core::SamplingRate;
    use rustfft::num_complex::Complex;
    use rustfft::FftPlanner;

    fn tone(frequency: f64, rate: f64, samples: usize) -> Vec<f64> {
        (0..samples)
            .map(|i| (2.0 * PI * frequency * i as f64 / rate).sin())
            .collect()
    }

    /// Power in the FFT bin closest to `frequency`
    fn bin_power(data: &[f64], frequency: f64, rate: f64) -> f64 {
        let mut buffer: Vec<Complex<f64>> = data.iter().map(|&x| Complex::new(x, 0.0)).collect();
        let fft = FftPlanner::<f64>::new().plan_fft_forward(buffer.len());
        fft.process(&mut buffer);

        let bin = (frequency * data.len() as f64 / rate).round() as usize;
        buffer[bin].norm_sqr()
    }

    #[test]
    fn test_notch_coefficients() {
        let c = BiquadCoefficients::notch(60.0, 30.0, 500.0).unwrap();
        let omega = 2.0 * PI * 60.0 / 500.0;
        let alpha = omega.sin() / 60.0;

        assert!((c.b0 - 1.0 / (1.0 + alpha)).abs() < 1e-12);
        assert_eq!(c.b0, c.b2);
        assert_eq!(c.b1, c.a1);
        // Unity gain at DC
        let dc_gain = (c.b0 + c.b1 + c.b2) / (1.0 + c.a1 + c.a2);
        assert!((dc_gain - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_notch_removes_mains() {
        let rate = 500.0;
        let input = tone(60.0, rate, 5000);
        let notch = BiquadCoefficients::notch(60.0, 30.0, rate).unwrap();
        let output = notch.apply(&input);

        // Skip the settling transient, compare the last 5 seconds
        let before = bin_power(&input[2500..], 60.0, rate);
        let after = bin_power(&output[2500..], 60.0, rate);
        assert!(after < 0.1 * before, "residual {} of {}", after, before);
    }

    #[test]
    fn test_notch_keeps_cardiac_band() {
        let rate = 500.0;
        let input = tone(10.0, rate, 5000);
        let notch = BiquadCoefficients::notch(60.0, 30.0, rate).unwrap();
        let output = notch.apply(&input);

        let before = bin_power(&input[2500..], 10.0, rate);
        let after = bin_power(&output[2500..], 10.0, rate);
        assert!(after > 0.9 * before);
    }

    #[test]
    fn test_notch_rejects_frequency_above_nyquist() {
        assert!(BiquadCoefficients::notch(50.0, 30.0, 90.0).is_err());
        assert!(BiquadCoefficients::notch(0.0, 30.0, 500.0).is_err());
    }

    #[test]
    fn test_notch_at_nyquist_passes_signal() {
        let input = tone(5.0, 100.0, 1000);
        let notch = BiquadCoefficients::notch(50.0, 30.0, 100.0).unwrap();
        let output = notch.apply(&input);

        assert!(output.iter().all(|v| v.is_finite()));
        for (x, y) in input.iter().zip(&output) {
            assert!((x - y).abs() < 1e-6, "{} vs {}", x, y);
        }
    }

    #[test]
    fn test_one_pole_initial_conditions() {
        let input = vec![2.0, 2.0, 2.0, 2.0];
        let rate = 500.0;

        let hp = OnePoleHighpass::new(0.5, rate).apply(&input);
        assert_eq!(hp[0], 2.0);
        assert!(hp[1] < 2.0 && hp[1] > 0.0);
        assert!(hp[3] < hp[2]);

        // Constant input is a fixed point of the low-pass
        let lp = OnePoleLowpass::new(40.0, rate).apply(&input);
        assert_eq!(lp, input);

        assert!(OnePoleHighpass::new(0.5, rate).apply(&[]).is_empty());
    }

    #[test]
    fn test_highpass_removes_offset() {
        let rate = 500.0;
        let input = vec![5.0; 5000];
        let output = OnePoleHighpass::new(0.5, rate).apply(&input);
        assert!(output[4999].abs() < 1e-3);
    }

    #[test]
    fn test_nan_propagates_through_history() {
        let mut input = tone(5.0, 500.0, 100);
        input[10] = f64::NAN;
        let notch = BiquadCoefficients::notch(60.0, 30.0, 500.0).unwrap();
        let output = notch.apply(&input);

        assert!(output[..10].iter().all(|v| v.is_finite()));
        assert!(output[10..].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_mains_selection() {
        let config = FilterConfig::default();
        assert_eq!(config.mains_frequency(500.0), 60.0);
        assert_eq!(config.mains_frequency(300.0), 50.0);
        assert_eq!(config.mains_frequency(250.0), 50.0);
    }

    #[test]
    fn test_filter_stage_reports_filters() {
        let rate = SamplingRate::new(500.0).unwrap();
        let channels = vec![tone(5.0, 500.0, 1000); 3];
        let signal = SignalEntity::from_channels(&channels, rate).unwrap();

        let (filtered, result) = FilterStage::default().run(&signal);
        assert!(result.is_ok());
        assert_eq!(result.details().filters_applied, vec!["notch", "bandpass"]);
        assert_eq!(result.details().notch_frequency_hz, Some(60.0));
        assert_eq!(filtered.samples_per_channel(), 1000);
        assert_eq!(filtered.sampling_rate(), rate);
        assert_ne!(filtered.data(), signal.data());
    }

    #[test]
    fn test_filter_stage_error_passes_input_through() {
        // 50 Hz notch cannot run at 80 Hz sampling
        let rate = SamplingRate::new(80.0).unwrap();
        let channels = vec![tone(5.0, 80.0, 400); 3];
        let signal = SignalEntity::from_channels(&channels, rate).unwrap();

        let (output, result) = FilterStage::default().run(&signal);
        assert_eq!(result.status(), StageStatus::Error);
        assert!(result.details().filters_applied.is_empty());
        assert_eq!(output, signal);
    }

    #[test]
    fn test_config_validation() {
        assert!(FilterConfig::default().validate().is_ok());

        let mut config = FilterConfig::default();
        config.bandpass_low_hz = 50.0;
        assert!(config.validate().is_err());
    }
}
