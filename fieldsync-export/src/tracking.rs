//! Progress events for export runs.

use fieldsync_types::{ExportOutcome, FormKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A milestone of an export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportEvent {
    /// `total` counts the submissions left after date filtering.
    Started {
        form: FormKey,
        total: usize,
    },
    SubmissionSkipped {
        form: FormKey,
        /// `None` when the document was too broken to read an id from.
        instance_id: Option<String>,
        reason: String,
    },
    Progress {
        form: FormKey,
        exported: usize,
        total: usize,
    },
    Cancelled {
        form: FormKey,
    },
    Completed {
        form: FormKey,
        exported: usize,
        total: usize,
        outcome: ExportOutcome,
    },
}

impl ExportEvent {
    pub fn form(&self) -> &FormKey {
        match self {
            ExportEvent::Started { form, .. }
            | ExportEvent::SubmissionSkipped { form, .. }
            | ExportEvent::Progress { form, .. }
            | ExportEvent::Cancelled { form }
            | ExportEvent::Completed { form, .. } => form,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, ExportEvent::SubmissionSkipped { .. })
    }
}

impl fmt::Display for ExportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportEvent::Started { form, total } => {
                write!(f, "{form}: exporting {total} submissions")
            }
            ExportEvent::SubmissionSkipped {
                form,
                instance_id,
                reason,
            } => match instance_id {
                Some(id) => write!(f, "{form}: submission {id} skipped: {reason}"),
                None => write!(f, "{form}: submission skipped: {reason}"),
            },
            ExportEvent::Progress {
                form,
                exported,
                total,
            } => write!(f, "{form}: exported {exported} of {total}"),
            ExportEvent::Cancelled { form } => write!(f, "{form}: export cancelled"),
            ExportEvent::Completed {
                form,
                exported,
                total,
                outcome,
            } => write!(f, "{form}: {outcome} ({exported} of {total})"),
        }
    }
}
