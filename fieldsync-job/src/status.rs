use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared cancellation flag observed by every step of a job.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct RunnerStatus {
    cancelled: Arc<AtomicBool>,
}

impl RunnerStatus {
    /// Creates a status that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Requests cancellation. Steps already past their last check run to completion.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}
