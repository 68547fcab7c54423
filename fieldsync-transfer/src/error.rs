//! Error types for the transfer layer.

use fieldsync_job::JobError;
use fieldsync_model::ModelError;
use thiserror::Error;

/// Result type for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;

/// Errors that can occur while talking to a form server.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The server answered with a redirect; usually a wrong base URL.
    #[error("unexpected redirect ({status}) to {location}")]
    Redirect { status: u16, location: String },

    /// Credentials missing or rejected.
    #[error("unauthorized ({status}): {reason}")]
    Unauthorized { status: u16, reason: String },

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The resource already exists on the server.
    #[error("already exists: {0}")]
    Conflict(String),

    /// Any other non-success response.
    #[error("http error {status} {reason}: {body}")]
    Http {
        status: u16,
        reason: String,
        body: String,
    },

    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// The server sent something we could not understand.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Missing or invalid configuration; fails before any request is made.
    #[error("configuration error: {0}")]
    Config(String),

    /// The operation is not supported for this server or form.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Cancellation was requested.
    #[error("cancelled")]
    Cancelled,

    /// Form or submission model error.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Invalid value type.
    #[error(transparent)]
    Types(#[from] fieldsync_types::Error),

    /// File system error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TransferError {
    /// True for "already exists" answers, which uploads treat as success.
    pub fn is_conflict(&self) -> bool {
        matches!(self, TransferError::Conflict(_))
    }
}

impl From<TransferError> for JobError {
    fn from(error: TransferError) -> Self {
        match error {
            TransferError::Cancelled => JobError::Cancelled,
            other => JobError::failed(other),
        }
    }
}
