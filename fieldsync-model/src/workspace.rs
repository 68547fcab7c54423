//! On-disk layout of the local workspace.
//!
//! ```text
//! <root>/forms/<form dir>/<form dir>.xml
//!                         <form dir>-media/<attachment>
//!                         instances/<instance dir>/submission.xml
//!                                                  <attachment>
//! ```

use crate::error::ModelResult;
use crate::form::FormModel;
use crate::metadata::{FormMetadata, SubmissionMetadata};
use crate::submission::Submission;
use fieldsync_types::FormKey;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of every stored submission document.
pub const SUBMISSION_FILE_NAME: &str = "submission.xml";

/// Replaces characters that are not allowed in file names.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Directory name for a submission.
///
/// `uuid:<letters, digits, dashes>` becomes `uuid<...>`. Any other id is
/// percent-encoded behind a `~` marker, so distinct ids never share a
/// directory.
pub fn sanitize_instance_id(instance_id: &str) -> String {
    let plain = instance_id.strip_prefix("uuid:").filter(|rest| {
        !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    match plain {
        Some(rest) => format!("uuid{rest}"),
        None => format!("~{}", urlencoding::encode(instance_id).replace('.', "%2E")),
    }
}

/// A local workspace rooted at one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn forms_dir(&self) -> PathBuf {
        self.root.join("forms")
    }

    pub fn form_dir(&self, form_name: &str) -> PathBuf {
        self.forms_dir().join(sanitize_file_name(form_name))
    }

    pub fn form_file(&self, form_name: &str) -> PathBuf {
        let dir_name = sanitize_file_name(form_name);
        self.forms_dir()
            .join(&dir_name)
            .join(format!("{dir_name}.xml"))
    }

    /// Creates metadata for a form that will live in this workspace.
    pub fn form_metadata(&self, key: FormKey, form_name: &str) -> FormMetadata {
        FormMetadata::new(key, form_name, self.form_file(form_name))
    }

    /// Discovers forms already present on disk.
    ///
    /// Directories without a readable form file are skipped with a warning.
    pub fn scan_forms(&self) -> ModelResult<Vec<FormMetadata>> {
        let forms_dir = self.forms_dir();
        if !forms_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut forms = Vec::new();
        for entry in sorted_entries(&forms_dir)? {
            if !entry.is_dir() {
                continue;
            }
            let Some(dir_name) = entry.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let form_file = entry.join(format!("{dir_name}.xml"));
            if !form_file.is_file() {
                continue;
            }
            match FormModel::load(&form_file) {
                Ok(model) => {
                    let key = model.form_key()?;
                    let name = if model.title().is_empty() {
                        dir_name.clone()
                    } else {
                        model.title().to_string()
                    };
                    forms.push(
                        FormMetadata::new(key, name, form_file)
                            .with_encrypted(model.is_encrypted()),
                    );
                }
                Err(e) => warn!("skipping form at {}: {}", form_file.display(), e),
            }
        }
        debug!("found {} local forms", forms.len());
        Ok(forms)
    }

    /// Submission files stored for a form, ordered by directory name.
    pub fn submission_files(&self, form: &FormMetadata) -> ModelResult<Vec<PathBuf>> {
        let instances = form.instances_dir();
        if !instances.is_dir() {
            return Ok(Vec::new());
        }
        Ok(sorted_entries(&instances)?
            .into_iter()
            .map(|dir| dir.join(SUBMISSION_FILE_NAME))
            .filter(|file| file.is_file())
            .collect())
    }

    /// Reads metadata for every stored submission of a form.
    ///
    /// Unparseable submissions are skipped with a warning.
    pub fn scan_submissions(&self, form: &FormMetadata) -> ModelResult<Vec<SubmissionMetadata>> {
        let mut out = Vec::new();
        for file in self.submission_files(form)? {
            match Submission::parse_file(&file) {
                Ok(submission) => out.push(SubmissionMetadata::new(
                    form.key.clone(),
                    submission.instance_id(),
                    file,
                    submission.submission_date(),
                )),
                Err(e) => warn!("skipping submission at {}: {}", file.display(), e),
            }
        }
        Ok(out)
    }

    /// Whether a submission with this instance id is already stored.
    pub fn has_submission(&self, form: &FormMetadata, instance_id: &str) -> bool {
        form.submission_file(instance_id).is_file()
    }
}

fn sorted_entries(dir: &Path) -> ModelResult<Vec<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();
    Ok(entries)
}
