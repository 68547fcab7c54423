//! Error types for the export layer.

use fieldsync_job::JobError;
use fieldsync_model::ModelError;
use thiserror::Error;

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Errors that can occur while exporting submissions.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Missing or invalid configuration; fails before anything is written.
    #[error("configuration error: {0}")]
    Config(String),

    /// A submission could not be decrypted.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Form or submission model error.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// File system error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writer error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// GeoJSON serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ExportError> for JobError {
    fn from(error: ExportError) -> Self {
        JobError::failed(error)
    }
}
