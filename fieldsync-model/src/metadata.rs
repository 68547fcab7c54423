//! What the workspace knows about each form and submission.

use crate::workspace::{SUBMISSION_FILE_NAME, sanitize_instance_id};
use chrono::{DateTime, Utc};
use fieldsync_types::{Cursor, FormKey};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where a form was discovered on a remote server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_url: Option<String>,
}

/// Marker of the newest submission written by an export run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastExportedSubmission {
    pub instance_id: String,
    pub submission_date: DateTime<Utc>,
    pub exported_on: DateTime<Utc>,
}

impl LastExportedSubmission {
    pub fn new(
        instance_id: impl Into<String>,
        submission_date: DateTime<Utc>,
        exported_on: DateTime<Utc>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            submission_date,
            exported_on,
        }
    }
}

/// Everything known locally about one form.
///
/// Pull advances `cursor` and sets `has_been_pulled`; export advances
/// `last_exported`. Records are never deleted by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormMetadata {
    pub key: FormKey,
    pub form_name: String,
    pub form_file: PathBuf,
    #[serde(default)]
    pub is_encrypted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteSource>,
    #[serde(default)]
    pub cursor: Cursor,
    #[serde(default)]
    pub has_been_pulled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_exported: Option<LastExportedSubmission>,
}

impl FormMetadata {
    /// Creates metadata for a newly discovered form.
    pub fn new(key: FormKey, form_name: impl Into<String>, form_file: impl Into<PathBuf>) -> Self {
        Self {
            key,
            form_name: form_name.into(),
            form_file: form_file.into(),
            is_encrypted: false,
            remote: None,
            cursor: Cursor::Empty,
            has_been_pulled: false,
            last_exported: None,
        }
    }

    pub fn with_encrypted(mut self, is_encrypted: bool) -> Self {
        self.is_encrypted = is_encrypted;
        self
    }

    pub fn with_remote(mut self, remote: RemoteSource) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_cursor(mut self, cursor: Cursor) -> Self {
        self.cursor = cursor;
        self
    }

    /// Moves the cursor forward to `candidate`, never backward.
    pub fn advance_cursor(&mut self, candidate: Cursor) {
        let current = std::mem::take(&mut self.cursor);
        self.cursor = current.advance_to(candidate);
    }

    /// Resets the cursor. Only for an explicit user request.
    pub fn clean_cursor(&mut self) {
        self.cursor = Cursor::Empty;
    }

    pub fn mark_pulled(&mut self) {
        self.has_been_pulled = true;
    }

    /// Records an export, keeping whichever submission is newer.
    pub fn mark_exported(&mut self, marker: LastExportedSubmission) {
        let newer = match &self.last_exported {
            Some(previous) => marker.submission_date >= previous.submission_date,
            None => true,
        };
        if newer {
            self.last_exported = Some(marker);
        }
    }

    /// Directory holding the form file.
    pub fn form_dir(&self) -> &Path {
        self.form_file.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Directory holding the form's media attachments.
    pub fn media_dir(&self) -> PathBuf {
        let stem = self
            .form_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.form_dir().join(format!("{stem}-media"))
    }

    pub fn instances_dir(&self) -> PathBuf {
        self.form_dir().join("instances")
    }

    pub fn submission_dir(&self, instance_id: &str) -> PathBuf {
        self.instances_dir().join(sanitize_instance_id(instance_id))
    }

    pub fn submission_file(&self, instance_id: &str) -> PathBuf {
        self.submission_dir(instance_id).join(SUBMISSION_FILE_NAME)
    }

    pub fn form_file_exists(&self) -> bool {
        self.form_file.is_file()
    }
}

/// Everything known locally about one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionMetadata {
    pub key: FormKey,
    pub instance_id: String,
    pub submission_file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_date: Option<DateTime<Utc>>,
}

impl SubmissionMetadata {
    pub fn new(
        key: FormKey,
        instance_id: impl Into<String>,
        submission_file: impl Into<PathBuf>,
        submission_date: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            key,
            instance_id: instance_id.into(),
            submission_file: submission_file.into(),
            submission_date,
        }
    }

    /// Points the record at a new file location after a copy.
    pub fn repoint(&mut self, submission_file: impl Into<PathBuf>) {
        self.submission_file = submission_file.into();
    }

    pub fn submission_dir(&self) -> &Path {
        self.submission_file.parent().unwrap_or_else(|| Path::new("."))
    }
}
