//! Progress events for pull and push runs.

use fieldsync_job::EventSink;
use fieldsync_types::FormKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

/// Which operation an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Pull,
    Push,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Pull => "pull",
            Operation::Push => "push",
        })
    }
}

/// Counts reported at the end of every run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSummary {
    pub succeeded: usize,
    pub already_existed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl TransferSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

impl fmt::Display for TransferSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} already existed, {} skipped, {} failed",
            self.succeeded, self.already_existed, self.skipped, self.failed
        )
    }
}

/// A milestone of a pull or push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferEvent {
    Started {
        form: FormKey,
        operation: Operation,
    },
    FormDownloaded {
        form: FormKey,
    },
    FormUploaded {
        form: FormKey,
    },
    FormAlreadyExists {
        form: FormKey,
    },
    AttachmentTransferred {
        form: FormKey,
        name: String,
        index: usize,
        total: usize,
    },
    AttachmentAlreadyExists {
        form: FormKey,
        name: String,
    },
    /// The server lists the attachment but does not have its content.
    AttachmentUnavailable {
        form: FormKey,
        name: String,
    },
    BatchReceived {
        form: FormKey,
        size: usize,
    },
    SubmissionTransferred {
        form: FormKey,
        instance_id: String,
        index: usize,
        total: usize,
    },
    SubmissionAlreadyExists {
        form: FormKey,
        instance_id: String,
    },
    SubmissionAttachmentTransferred {
        form: FormKey,
        instance_id: String,
        name: String,
        index: usize,
        total: usize,
    },
    Cancelled {
        form: FormKey,
        item: String,
    },
    Error {
        form: FormKey,
        item: String,
        reason: String,
    },
    Completed {
        form: FormKey,
        operation: Operation,
        summary: TransferSummary,
    },
}

impl TransferEvent {
    pub fn form(&self) -> &FormKey {
        match self {
            TransferEvent::Started { form, .. }
            | TransferEvent::FormDownloaded { form }
            | TransferEvent::FormUploaded { form }
            | TransferEvent::FormAlreadyExists { form }
            | TransferEvent::AttachmentTransferred { form, .. }
            | TransferEvent::AttachmentAlreadyExists { form, .. }
            | TransferEvent::AttachmentUnavailable { form, .. }
            | TransferEvent::BatchReceived { form, .. }
            | TransferEvent::SubmissionTransferred { form, .. }
            | TransferEvent::SubmissionAlreadyExists { form, .. }
            | TransferEvent::SubmissionAttachmentTransferred { form, .. }
            | TransferEvent::Cancelled { form, .. }
            | TransferEvent::Error { form, .. }
            | TransferEvent::Completed { form, .. } => form,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, TransferEvent::Error { .. })
    }
}

impl fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferEvent::Started { form, operation } => write!(f, "{form}: {operation} started"),
            TransferEvent::FormDownloaded { form } => write!(f, "{form}: form downloaded"),
            TransferEvent::FormUploaded { form } => write!(f, "{form}: form uploaded"),
            TransferEvent::FormAlreadyExists { form } => {
                write!(f, "{form}: form already exists on the server")
            }
            TransferEvent::AttachmentTransferred {
                form,
                name,
                index,
                total,
            } => write!(f, "{form}: attachment {index} of {total} ({name}) transferred"),
            TransferEvent::AttachmentAlreadyExists { form, name } => {
                write!(f, "{form}: attachment {name} already exists")
            }
            TransferEvent::AttachmentUnavailable { form, name } => {
                write!(f, "{form}: attachment {name} is not available on the server")
            }
            TransferEvent::BatchReceived { form, size } => {
                write!(f, "{form}: received {size} submission ids")
            }
            TransferEvent::SubmissionTransferred {
                form,
                index,
                total,
                ..
            } => write!(f, "{form}: submission {index} of {total} transferred"),
            TransferEvent::SubmissionAlreadyExists { form, instance_id } => {
                write!(f, "{form}: submission {instance_id} already exists")
            }
            TransferEvent::SubmissionAttachmentTransferred {
                form,
                instance_id,
                index,
                total,
                ..
            } => write!(
                f,
                "{form}: attachment {index} of {total} of submission {instance_id} transferred"
            ),
            TransferEvent::Cancelled { form, item } => write!(f, "{form}: {item} cancelled"),
            TransferEvent::Error { form, item, reason } => {
                write!(f, "{form}: {item} failed: {reason}")
            }
            TransferEvent::Completed {
                form,
                operation,
                summary,
            } => write!(f, "{form}: {operation} completed ({summary})"),
        }
    }
}

/// Emits events for one form and keeps the run's counters.
///
/// Cheap to clone; clones share counters.
#[derive(Clone)]
pub(crate) struct Tracker {
    form: FormKey,
    operation: Operation,
    sink: Arc<dyn EventSink<TransferEvent>>,
    counters: Arc<Counters>,
}

#[derive(Default)]
struct Counters {
    succeeded: AtomicUsize,
    already_existed: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

impl Tracker {
    pub(crate) fn new(
        form: FormKey,
        operation: Operation,
        sink: Arc<dyn EventSink<TransferEvent>>,
    ) -> Self {
        Self {
            form,
            operation,
            sink,
            counters: Arc::new(Counters::default()),
        }
    }

    pub(crate) fn emit(&self, event: TransferEvent) {
        self.sink.emit(event);
    }

    pub(crate) fn started(&self) {
        self.emit(TransferEvent::Started {
            form: self.form.clone(),
            operation: self.operation,
        });
    }

    /// Emits a success milestone and counts it.
    pub(crate) fn succeeded(&self, event: TransferEvent) {
        self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
        self.emit(event);
    }

    /// Emits an "already exists" milestone and counts it.
    pub(crate) fn already_exists(&self, event: TransferEvent) {
        self.counters.already_existed.fetch_add(1, Ordering::Relaxed);
        self.emit(event);
    }

    pub(crate) fn skipped(&self, event: TransferEvent) {
        self.counters.skipped.fetch_add(1, Ordering::Relaxed);
        self.emit(event);
    }

    pub(crate) fn failed(&self, item: impl Into<String>, reason: impl fmt::Display) {
        let item = item.into();
        warn!("{} {}: {} failed: {}", self.operation, self.form, item, reason);
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        self.emit(TransferEvent::Error {
            form: self.form.clone(),
            item,
            reason: reason.to_string(),
        });
    }

    pub(crate) fn cancelled(&self, item: impl Into<String>) {
        self.counters.skipped.fetch_add(1, Ordering::Relaxed);
        self.emit(TransferEvent::Cancelled {
            form: self.form.clone(),
            item: item.into(),
        });
    }

    pub(crate) fn summary(&self) -> TransferSummary {
        TransferSummary {
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            already_existed: self.counters.already_existed.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn completed(&self) -> TransferSummary {
        let summary = self.summary();
        self.emit(TransferEvent::Completed {
            form: self.form.clone(),
            operation: self.operation,
            summary,
        });
        summary
    }
}
