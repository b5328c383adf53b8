//! Pre-defined ECG waveform patterns
//!
//! Amplitudes are in microvolts.

use ecg_core::Lead;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// One wave of a heartbeat, modelled as a Gaussian bump around the R peak
struct Wave {
    /// Peak height relative to the R wave
    height: f64,
    /// Width (standard deviation) in seconds
    width: f64,
    /// Offset from the R peak in seconds
    offset: f64,
    /// Part of the QRS complex (scaled by the lead's QRS gain)
    qrs: bool,
}

const BEAT_WAVES: [Wave; 5] = [
    Wave { height: 0.12, width: 0.025, offset: -0.20, qrs: false },
    Wave { height: -0.10, width: 0.010, offset: -0.03, qrs: true },
    Wave { height: 1.00, width: 0.012, offset: 0.0, qrs: true },
    Wave { height: -0.25, width: 0.010, offset: 0.03, qrs: true },
    Wave { height: 0.30, width: 0.040, offset: 0.30, qrs: false },
];

/// Where the R peak sits inside each RR interval
const R_PEAK_PHASE: f64 = 0.35;

/// Synthetic waveform generators
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalPattern {
    /// P-QRS-T beats at a fixed heart rate
    Pqrst {
        heart_rate_bpm: f64,
        /// R-wave amplitude on lead II
        amplitude: f64,
    },
    /// Zero-mean sine, same on every lead
    Sinusoidal { frequency: f64, amplitude: f64 },
    /// Constant level (dead electrode)
    Flat { level: f64 },
    /// Square wave pinned at +/- amplitude (clipped amplifier)
    Saturated { frequency: f64, amplitude: f64 },
}

impl SignalPattern {
    /// Clean value of `lead` at `time` seconds
    pub fn value_at_time(&self, time: f64, lead: Lead) -> f64 {
        match *self {
            SignalPattern::Pqrst { heart_rate_bpm, amplitude } => {
                if heart_rate_bpm <= 0.0 {
                    return 0.0;
                }
                let rr = 60.0 / heart_rate_bpm;
                let from_r_peak = time.rem_euclid(rr) - R_PEAK_PHASE * rr;
                let (qrs_gain, pt_gain) = lead_gains(lead);

                BEAT_WAVES
                    .iter()
                    .map(|wave| {
                        let gain = if wave.qrs { qrs_gain } else { pt_gain };
                        let x = (from_r_peak - wave.offset) / wave.width;
                        gain * wave.height * (-0.5 * x * x).exp()
                    })
                    .sum::<f64>()
                    * amplitude
            }

            SignalPattern::Sinusoidal { frequency, amplitude } => {
                amplitude * (2.0 * PI * frequency * time).sin()
            }

            SignalPattern::Flat { level } => level,

            SignalPattern::Saturated { frequency, amplitude } => {
                if (2.0 * PI * frequency * time).sin() >= 0.0 {
                    amplitude
                } else {
                    -amplitude
                }
            }
        }
    }

    /// Get pattern description
    pub fn description(&self) -> &'static str {
        match self {
            SignalPattern::Pqrst { .. } => "Sinus rhythm",
            SignalPattern::Sinusoidal { .. } => "Sinusoidal test tone",
            SignalPattern::Flat { .. } => "Flat line",
            SignalPattern::Saturated { .. } => "Saturated amplifier",
        }
    }

    /// Create common preset patterns
    pub fn presets() -> Vec<(&'static str, SignalPattern)> {
        vec![
            ("Resting", SignalPattern::Pqrst { heart_rate_bpm: 60.0, amplitude: 1000.0 }),
            ("Normal", SignalPattern::Pqrst { heart_rate_bpm: 72.0, amplitude: 1000.0 }),
            ("Tachycardia", SignalPattern::Pqrst { heart_rate_bpm: 130.0, amplitude: 900.0 }),
            ("Test Tone", SignalPattern::Sinusoidal { frequency: 1.0, amplitude: 1000.0 }),
            ("Lead Off", SignalPattern::Flat { level: 0.0 }),
            ("Clipped", SignalPattern::Saturated { frequency: 1.0, amplitude: 1000.0 }),
        ]
    }
}

impl Default for SignalPattern {
    fn default() -> Self {
        SignalPattern::Pqrst {
            heart_rate_bpm: 72.0,
            amplitude: 1000.0,
        }
    }
}

/// QRS and P/T gains per lead. V1 sees an inverted, smaller QRS.
fn lead_gains(lead: Lead) -> (f64, f64) {
    match lead {
        Lead::II => (1.0, 1.0),
        Lead::V1 => (-0.6, 0.4),
        Lead::V5 => (1.2, 1.1),
    }
}
