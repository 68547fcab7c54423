//! Error types for jobs.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for job steps.
pub type JobResult<T> = Result<T, JobError>;

/// Errors that end a job.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    /// The job was cancelled before it could produce a value.
    #[error("job cancelled")]
    Cancelled,

    /// A step failed.
    #[error("{0}")]
    Failed(FailureCause),

    /// A step panicked.
    #[error("job panicked: {0}")]
    Panicked(String),
}

impl JobError {
    /// Wraps any error as a step failure, keeping it available for downcasting.
    pub fn failed<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        JobError::Failed(FailureCause(Arc::new(error)))
    }

    /// Creates a step failure from a plain message.
    pub fn message(message: impl Into<String>) -> Self {
        JobError::failed(MessageError(message.into()))
    }

    /// Returns true if the job ended because of cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobError::Cancelled)
    }

    /// Returns the underlying step error if it is of type `E`.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        match self {
            JobError::Failed(cause) => cause.0.downcast_ref::<E>(),
            _ => None,
        }
    }
}

impl From<std::io::Error> for JobError {
    fn from(error: std::io::Error) -> Self {
        JobError::failed(error)
    }
}

/// The error a failed step produced.
#[derive(Clone)]
pub struct FailureCause(Arc<dyn StdError + Send + Sync>);

impl fmt::Debug for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct MessageError(String);
