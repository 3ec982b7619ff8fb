use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Severity level of a conversion warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningSeverity {
    /// Informational: defaults applied, non-critical adjustments
    Info,
    /// Warning: recovered errors, degraded annotations requiring review
    Warning,
    /// Error: content dropped or left unannotated
    Error,
}

/// Category classification for warning grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCategory {
    /// Tick-to-division conversion required rounding
    PrecisionLoss,
    /// A per-note or memory performance target was missed
    Performance,
    /// An iteration or size cap terminated a scan early
    SafetyCap,
    /// A conflict between annotations was resolved or dropped
    Coordination,
    /// Structural fallback during emission (skipped records, padding rests)
    Emission,
}

/// Non-fatal issue encountered during conversion
///
/// Carries enough context to point at the measure or voice involved without
/// failing the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionWarning {
    pub severity: WarningSeverity,
    pub category: WarningCategory,
    pub message: String,
    /// Specific measure context (1-indexed), if applicable
    pub measure_number: Option<u32>,
    /// Voice within the part (1-indexed), if applicable
    pub voice_number: Option<u8>,
}

impl ConversionWarning {
    pub fn new(severity: WarningSeverity, category: WarningCategory, message: String) -> Self {
        Self {
            severity,
            category,
            message,
            measure_number: None,
            voice_number: None,
        }
    }

    /// Set measure context (builder pattern)
    pub fn with_measure(mut self, measure_number: u32) -> Self {
        self.measure_number = Some(measure_number);
        self
    }

    /// Set voice context (builder pattern)
    pub fn with_voice(mut self, voice_number: u8) -> Self {
        self.voice_number = Some(voice_number);
        self
    }
}

/// Error during MIDI-to-MusicXML conversion
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Phase arena exhausted its byte budget
    #[error("arena out of memory in {phase} phase: requested {requested} bytes, {available} available")]
    OutOfMemory {
        phase: String,
        requested: usize,
        available: usize,
    },

    /// Batch is large enough to threaten system stability
    #[error("batch of {notes} notes exceeds safety threshold {threshold}")]
    SystemStabilityRisk { notes: usize, threshold: usize },

    /// Total wall-clock budget exceeded
    #[error("processing exceeded {limit_seconds} s time budget after {elapsed_seconds:.1} s")]
    ProcessingTimeout {
        elapsed_seconds: f64,
        limit_seconds: u64,
    },

    /// A conflict between annotations could not be resolved in strict mode
    #[error("unresolvable coordination conflict: {reason}")]
    CoordinationConflict { reason: String },

    /// Average per-note cost exceeded the configured target
    #[error("processing averaged {actual_ns} ns/note, target is {target_ns} ns/note")]
    PerformanceTargetExceeded { actual_ns: u64, target_ns: u64 },

    /// Input failed domain validation
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// XML writer failure during emission
    #[error("MusicXML emission failed: {message}")]
    EmitError { message: String },
}

impl From<&'static str> for ConvertError {
    fn from(msg: &'static str) -> Self {
        ConvertError::InvalidInput(msg)
    }
}

impl From<quick_xml::Error> for ConvertError {
    fn from(err: quick_xml::Error) -> Self {
        ConvertError::EmitError {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for ConvertError {
    fn from(err: std::io::Error) -> Self {
        ConvertError::EmitError {
            message: err.to_string(),
        }
    }
}
