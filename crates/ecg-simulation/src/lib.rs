//! ECG-Simulation: synthetic three-lead ECG generation
//!
//! Produces reproducible recordings for demos and end-to-end tests.

pub mod signal_patterns;
pub mod ecg_simulator;

pub use ecg_simulator::*;
pub use signal_patterns::*;
