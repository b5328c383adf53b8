//! ECG-Core: Foundation types for ECG signal conditioning
//!
//! Signal container, lead/rate metadata, raw recordings and CSV ingestion.

pub mod signal_entity;
pub mod ecg_types;
pub mod error;
pub mod raw;
pub mod format;

pub use signal_entity::*;
pub use ecg_types::*;
pub use raw::{GroundTruth, RawEcgRecord};
pub use error::{EcgError, EcgResult};
