//! Error types for Vigil Fusion

use thiserror::Error;

/// Errors produced at the ingestion boundary.
///
/// The engine itself never fails: a payload that cannot be turned into a
/// typed event is dropped by the caller with a diagnostic log entry, and
/// processing continues with the next one.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to parse telemetry payload: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Missing device identifier in movement payload")]
    MissingDeviceId,

    #[error("Unrecognized topic: {0}")]
    UnknownTopic(String),

    #[error("Unknown movement event kind: {0}")]
    UnknownEventKind(String),
}
