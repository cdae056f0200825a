//! Error types for Healthsync

use thiserror::Error;

/// Errors a single metric source can report.
///
/// These never escape an aggregation session: the session logs them and
/// settles the metric to its default value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    #[error("Metric unavailable: {0}")]
    Unavailable(String),

    #[error("Not authorized to read metric: {0}")]
    NotAuthorized(String),

    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    #[error("Source timed out after {0}ms")]
    Timeout(u64),

    #[error("Source failed: {0}")]
    Other(String),
}

/// Errors that can occur outside of the per-source layer
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid date (expected YYYY-MM-DD): {0}")]
    InvalidDate(String),

    #[error("Invalid difficulty: {0}")]
    InvalidDifficulty(String),

    #[error("More than one source registered for {0}")]
    DuplicateSource(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Failed to read {path}: {message}")]
    IoError { path: String, message: String },

    #[error("HTTP client error: {0}")]
    ClientError(String),
}
