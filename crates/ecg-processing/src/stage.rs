//! Stage contract shared by every step of the pipeline

use ecg_core::{EcgResult, SignalEntity};
use serde::{Deserialize, Serialize, Serializer};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

/// Pipeline steps in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Quality,
    Filter,
    Normalize,
    Resample,
    Package,
}

impl StageKind {
    /// All stages in execution order
    pub const ORDER: [StageKind; 5] = [
        StageKind::Quality,
        StageKind::Filter,
        StageKind::Normalize,
        StageKind::Resample,
        StageKind::Package,
    ];

    /// Name used in reports and messages
    pub fn label(self) -> &'static str {
        match self {
            StageKind::Quality => "quality",
            StageKind::Filter => "filtering",
            StageKind::Normalize => "normalization",
            StageKind::Resample => "resampling",
            StageKind::Package => "packaging",
        }
    }

    /// Stages that come after this one
    pub fn downstream(self) -> impl Iterator<Item = StageKind> {
        Self::ORDER.into_iter().skip_while(move |k| *k != self).skip(1)
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Why the quality gate refused a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    EmptySignal,
    InvalidChannelCount,
    InsufficientDuration,
    NoValidValues,
    ExcessiveNan,
    LowStdDev,
    TooManyConstantValues,
    Saturated,
}

impl RejectionReason {
    /// Short human-readable description
    pub fn description(self) -> &'static str {
        match self {
            RejectionReason::EmptySignal => "empty signal",
            RejectionReason::InvalidChannelCount => "invalid channel count",
            RejectionReason::InsufficientDuration => "insufficient duration",
            RejectionReason::NoValidValues => "no valid values",
            RejectionReason::ExcessiveNan => "NaN proportion exceeded",
            RejectionReason::LowStdDev => "signal too flat (possible artifact)",
            RejectionReason::TooManyConstantValues => "too many constant values",
            RejectionReason::Saturated => "signal saturated",
        }
    }
}

/// Serialized status of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StageStatus {
    Ok,
    Rejected,
    Error,
}

/// Outcome of one stage, with stage-specific details
#[derive(Debug, Clone, PartialEq)]
pub enum StageResult<D> {
    /// Stage ran and produced its output
    Ok { message: String, details: D },
    /// Quality gate refused the signal
    Rejected {
        reason: RejectionReason,
        message: String,
        details: D,
    },
    /// Stage ran but could not produce its output
    Error { message: String, details: D },
    /// Stage never ran because an upstream stage failed
    Skipped { cause: StageKind, details: D },
}

impl<D> StageResult<D> {
    pub fn ok(message: impl Into<String>, details: D) -> Self {
        StageResult::Ok {
            message: message.into(),
            details,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, StageResult::Ok { .. })
    }

    /// Skipped stages report as errors
    pub fn status(&self) -> StageStatus {
        match self {
            StageResult::Ok { .. } => StageStatus::Ok,
            StageResult::Rejected { .. } => StageStatus::Rejected,
            StageResult::Error { .. } | StageResult::Skipped { .. } => StageStatus::Error,
        }
    }

    pub fn message(&self) -> String {
        match self {
            StageResult::Ok { message, .. }
            | StageResult::Rejected { message, .. }
            | StageResult::Error { message, .. } => message.clone(),
            StageResult::Skipped { cause, .. } => skipped_message(*cause),
        }
    }

    pub fn details(&self) -> &D {
        match self {
            StageResult::Ok { details, .. }
            | StageResult::Rejected { details, .. }
            | StageResult::Error { details, .. }
            | StageResult::Skipped { details, .. } => details,
        }
    }

    pub fn rejection_reason(&self) -> Option<RejectionReason> {
        match self {
            StageResult::Rejected { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

fn skipped_message(cause: StageKind) -> String {
    format!("not processed due to {} failure", cause.label())
}

/// Wire shape of a stage result: status, message, optional reason and the
/// details flattened alongside.
#[derive(Serialize)]
struct StageRecord<'a, D> {
    status: StageStatus,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<RejectionReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skipped_due_to: Option<StageKind>,
    #[serde(flatten)]
    details: &'a D,
}

impl<D: Serialize> Serialize for StageResult<D> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let skipped_due_to = match self {
            StageResult::Skipped { cause, .. } => Some(*cause),
            _ => None,
        };
        StageRecord {
            status: self.status(),
            message: self.message(),
            reason: self.rejection_reason(),
            skipped_due_to,
            details: self.details(),
        }
        .serialize(serializer)
    }
}

/// A transform step: signal in, new signal out.
///
/// `run` never fails. Errors and panics inside `apply` come back as an
/// `Error` result paired with the untouched input.
pub trait SignalStage {
    /// Stage-specific report details
    type Details;

    fn kind(&self) -> StageKind;

    /// Produce the transformed signal
    fn apply(&self, input: &SignalEntity) -> EcgResult<(SignalEntity, Self::Details)>;

    /// Details reported when `apply` did not succeed
    fn fallback_details(&self, input: &SignalEntity) -> Self::Details;

    /// Message reported on success
    fn success_message(&self) -> String;

    fn run(&self, input: &SignalEntity) -> (SignalEntity, StageResult<Self::Details>) {
        let stage = self.kind();
        tracing::debug!(%stage, samples = input.samples_per_channel(), "Stage started");

        let failure = match catch_unwind(AssertUnwindSafe(|| self.apply(input))) {
            Ok(Ok((output, details))) => {
                tracing::debug!(%stage, samples = output.samples_per_channel(), "Stage finished");
                return (output, StageResult::ok(self.success_message(), details));
            }
            Ok(Err(e)) => e.to_string(),
            Err(payload) => format!("stage {} panicked: {}", stage, panic_message(payload.as_ref())),
        };

        tracing::warn!(%stage, error = %failure, "Stage failed, passing input through");
        (
            input.clone(),
            StageResult::Error {
                message: failure,
                details: self.fallback_details(input),
            },
        )
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Wall-clock time spent in one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: StageKind,
    pub elapsed_us: u64,
}

/// Helper for timing stages
pub struct StageTimer {
    stage: StageKind,
    start_time: Instant,
}

impl StageTimer {
    pub fn start(stage: StageKind) -> Self {
        Self {
            stage,
            start_time: Instant::now(),
        }
    }

    /// Finish timing and return the measurement
    pub fn finish(self) -> StageTiming {
        StageTiming {
            stage: self.stage,
            elapsed_us: self.start_time.elapsed().as_micros() as u64,
        }
    }
}
