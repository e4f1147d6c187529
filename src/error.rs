//! Error types for Motion Flux

use thiserror::Error;

/// Errors surfaced by the ingestion pipeline.
///
/// Conditions that are expected during normal capture (empty windows, malformed
/// stream lines, one-sided windows) are not errors; they are skipped and logged.
#[derive(Debug, Error)]
pub enum WearableError {
    #[error("Wearable pipeline is disabled")]
    FeatureDisabled,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session already flushed: {0}")]
    SessionClosed(String),

    #[error("Unrecognized sample payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WearableError {
    /// Whether retrying the same call without changing anything could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, WearableError::Database(_) | WearableError::Storage(_))
    }
}
