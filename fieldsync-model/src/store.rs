//! Metadata persistence port and its adapters.
//!
//! The pipeline only sees [`MetadataPort`]. Two adapters ship here: an
//! in-memory store for tests and embedding, and a whole-file JSON store.
//! Callers must serialize writes to the same form themselves.

use crate::error::{ModelError, ModelResult};
use crate::metadata::{FormMetadata, SubmissionMetadata};
use fieldsync_types::FormKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// The full contents of a metadata store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataState {
    #[serde(default)]
    forms: BTreeMap<String, FormMetadata>,
    #[serde(default)]
    submissions: BTreeMap<String, BTreeMap<String, SubmissionMetadata>>,
}

impl MetadataState {
    pub fn form(&self, key: &FormKey) -> Option<&FormMetadata> {
        self.forms.get(&key.to_string())
    }

    pub fn form_mut(&mut self, key: &FormKey) -> Option<&mut FormMetadata> {
        self.forms.get_mut(&key.to_string())
    }

    /// Inserts or replaces a form record.
    pub fn upsert_form(&mut self, form: FormMetadata) {
        self.forms.insert(form.key.to_string(), form);
    }

    pub fn forms(&self) -> impl Iterator<Item = &FormMetadata> {
        self.forms.values()
    }

    /// Submissions of a form, ordered by instance id.
    pub fn submissions(&self, key: &FormKey) -> impl Iterator<Item = &SubmissionMetadata> {
        self.submissions
            .get(&key.to_string())
            .into_iter()
            .flat_map(|s| s.values())
    }

    /// Inserts or replaces a submission record.
    pub fn upsert_submission(&mut self, submission: SubmissionMetadata) {
        self.submissions
            .entry(submission.key.to_string())
            .or_default()
            .insert(submission.instance_id.clone(), submission);
    }
}

/// Read/write contract for form and submission metadata.
pub trait MetadataPort: Send + Sync {
    /// Returns a consistent copy of the whole store.
    fn snapshot(&self) -> ModelResult<MetadataState>;

    /// Runs `command` against the store atomically: either every change it
    /// made is kept, or, when it fails, none are.
    fn execute(
        &self,
        command: &mut dyn FnMut(&mut MetadataState) -> ModelResult<()>,
    ) -> ModelResult<()>;

    fn fetch(&self, key: &FormKey) -> ModelResult<Option<FormMetadata>> {
        Ok(self.snapshot()?.form(key).cloned())
    }

    fn fetch_all(&self) -> ModelResult<Vec<FormMetadata>> {
        Ok(self.snapshot()?.forms().cloned().collect())
    }

    fn persist(&self, form: FormMetadata) -> ModelResult<()> {
        let mut pending = Some(form);
        self.execute(&mut |state| {
            if let Some(form) = pending.take() {
                state.upsert_form(form);
            }
            Ok(())
        })
    }

    fn fetch_submissions(&self, key: &FormKey) -> ModelResult<Vec<SubmissionMetadata>> {
        Ok(self.snapshot()?.submissions(key).cloned().collect())
    }

    fn persist_submission(&self, submission: SubmissionMetadata) -> ModelResult<()> {
        let mut pending = Some(submission);
        self.execute(&mut |state| {
            if let Some(submission) = pending.take() {
                state.upsert_submission(submission);
            }
            Ok(())
        })
    }

    /// Resets a form's cursor. Only for an explicit user request.
    fn clean_cursor(&self, key: &FormKey) -> ModelResult<()> {
        self.execute(&mut |state| {
            let form = state
                .form_mut(key)
                .ok_or_else(|| ModelError::Store(format!("unknown form {key}")))?;
            form.clean_cursor();
            Ok(())
        })
    }
}

// ── In-memory ────────────────────────────────────────────────────

/// Keeps metadata in memory only.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    state: Mutex<MetadataState>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataPort for InMemoryMetadataStore {
    fn snapshot(&self) -> ModelResult<MetadataState> {
        Ok(self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn execute(
        &self,
        command: &mut dyn FnMut(&mut MetadataState) -> ModelResult<()>,
    ) -> ModelResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut working = state.clone();
        command(&mut working)?;
        *state = working;
        Ok(())
    }
}

// ── JSON file ────────────────────────────────────────────────────

/// Keeps metadata in one JSON file, rewritten atomically on every change.
#[derive(Debug)]
pub struct JsonFileMetadataStore {
    path: PathBuf,
    state: Mutex<MetadataState>,
}

impl JsonFileMetadataStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> ModelResult<Self> {
        let path = path.into();
        let state = if path.exists() {
            let bytes = std::fs::read(&path)?;
            serde_json::from_slice(&bytes)?
        } else {
            MetadataState::default()
        };
        debug!("opened metadata store at {}", path.display());
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, state: &MetadataState) -> ModelResult<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl MetadataPort for JsonFileMetadataStore {
    fn snapshot(&self) -> ModelResult<MetadataState> {
        Ok(self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn execute(
        &self,
        command: &mut dyn FnMut(&mut MetadataState) -> ModelResult<()>,
    ) -> ModelResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut working = state.clone();
        command(&mut working)?;
        self.write(&working)?;
        *state = working;
        Ok(())
    }
}
