//! Error types for the model layer.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while reading forms, submissions or metadata.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The document is not well-formed XML.
    #[error("malformed xml: {0}")]
    Xml(String),

    /// The document is XML but not a usable form definition.
    #[error("invalid form: {0}")]
    InvalidForm(String),

    /// The document is XML but not a usable submission.
    #[error("invalid submission: {0}")]
    InvalidSubmission(String),

    /// File system error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid value type (form key, cursor).
    #[error(transparent)]
    Types(#[from] fieldsync_types::Error),

    /// Metadata store error.
    #[error("metadata store error: {0}")]
    Store(String),
}
