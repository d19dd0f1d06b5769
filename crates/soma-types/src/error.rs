//! Workspace-wide error taxonomy.
//!
//! Every error that crosses a crate boundary is a [`SomaError`].  The enum is
//! serialisable so transport layers can ship it to the brain verbatim, and
//! [`SomaError::kind`] provides the stable machine-readable tag used in wire
//! error payloads.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Global error type spanning command validation, sensor degradation,
/// transport failures, and hardware faults.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SomaError {
    /// The command failed validation and never reached hardware.
    #[error("invalid command: {reason}")]
    InvalidCommand { reason: String },

    /// A sensor is degraded; the corresponding snapshot field is absent.
    #[error("sensor '{sensor}' unavailable")]
    SensorUnavailable { sensor: String },

    /// The primary control path is confirmed unreachable.
    #[error("transport unreachable: {detail}")]
    TransportUnreachable { detail: String },

    /// Ambiguous face registration: the sample looks like a different,
    /// already-registered identity.
    #[error("ambiguous face registration for '{name}'")]
    DuplicateLowConfidence { name: String },

    /// Hardware reported a fault while a command was being applied.
    #[error("execution failure on {component}: {detail}")]
    ExecutionFailure { component: String, detail: String },

    /// Persistent store failure (SQLite).
    #[error("storage error: {0}")]
    Storage(String),

    /// Payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl SomaError {
    /// Shorthand for an [`SomaError::InvalidCommand`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        SomaError::InvalidCommand {
            reason: reason.into(),
        }
    }

    /// Stable machine-readable tag for wire payloads and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SomaError::InvalidCommand { .. } => "invalid_command",
            SomaError::SensorUnavailable { .. } => "sensor_unavailable",
            SomaError::TransportUnreachable { .. } => "transport_unreachable",
            SomaError::DuplicateLowConfidence { .. } => "duplicate_low_confidence",
            SomaError::ExecutionFailure { .. } => "execution_failure",
            SomaError::Storage(_) => "storage",
            SomaError::Serialization(_) => "serialization",
        }
    }
}
