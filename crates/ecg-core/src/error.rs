//! Error handling for the ECG pipeline
//!
//! One error type shared by every crate in the workspace. Quality rejections
//! and per-stage faults are reported as data in the pipeline report; only the
//! variants below ever cross a crate boundary as `Err`.

use core::fmt;

/// Result type alias for ECG pipeline operations
pub type EcgResult<T> = Result<T, EcgError>;

/// Error type for all ECG pipeline operations
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum EcgError {
    /// Malformed raw input (fails before the pipeline starts)
    InvalidInput {
        /// Description of the input problem
        reason: String,
    },

    /// Sampling rate that is not finite or not positive
    InvalidSamplingRate {
        /// Offending rate in Hz
        rate: f64,
    },

    /// Text format could not be parsed
    Format {
        /// Line number in the source (1-based, header is line 1) when known
        line: Option<u64>,
        /// Description of the format issue
        reason: String,
    },

    /// Signal data inconsistent with its metadata
    InvalidSignalData {
        /// Description of the data issue
        reason: String,
    },

    /// Channel index outside the signal
    ChannelOutOfRange {
        /// Requested channel
        index: usize,
        /// Channels available
        channel_count: usize,
    },

    /// A transform stage could not produce its output
    StageFailed {
        /// Stage name
        stage: &'static str,
        /// What went wrong
        message: String,
    },

    /// The external inference collaborator failed
    Inference {
        /// Failure description
        message: String,
    },

    /// Invalid configuration value
    Configuration {
        /// Description of the configuration error
        message: String,
    },
}

impl fmt::Display for EcgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcgError::InvalidInput { reason } => {
                write!(f, "Invalid input: {}", reason)
            }
            EcgError::InvalidSamplingRate { rate } => {
                write!(f, "Invalid sampling rate: {}Hz (must be finite and positive)", rate)
            }
            EcgError::Format { line: Some(line), reason } => {
                write!(f, "Format error at line {}: {}", line, reason)
            }
            EcgError::Format { line: None, reason } => {
                write!(f, "Format error: {}", reason)
            }
            EcgError::InvalidSignalData { reason } => {
                write!(f, "Invalid signal data: {}", reason)
            }
            EcgError::ChannelOutOfRange { index, channel_count } => {
                write!(f, "Channel index {} out of range ({} channels)",
                       index, channel_count)
            }
            EcgError::StageFailed { stage, message } => {
                write!(f, "Stage '{}' failed: {}", stage, message)
            }
            EcgError::Inference { message } => {
                write!(f, "Inference error: {}", message)
            }
            EcgError::Configuration { message } => {
                write!(f, "Configuration error: {}", message)
            }
        }
    }
}

impl std::error::Error for EcgError {}

impl EcgError {
    /// True for errors caused by the caller's input rather than by the pipeline
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            EcgError::InvalidInput { .. }
                | EcgError::InvalidSamplingRate { .. }
                | EcgError::Format { .. }
        )
    }
}

impl From<csv::Error> for EcgError {
    fn from(err: csv::Error) -> Self {
        EcgError::Format {
            line: err.position().map(|p| p.line()),
            reason: err.to_string(),
        }
    }
}

/// Convenience macro for creating input errors
#[macro_export]
macro_rules! input_error {
    ($($arg:tt)+) => {
        $crate::error::EcgError::InvalidInput {
            reason: format!($($arg)+),
        }
    };
}
