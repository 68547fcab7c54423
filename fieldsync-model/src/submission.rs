//! Parsed submission instances.

use crate::error::{ModelError, ModelResult};
use crate::workspace::SUBMISSION_FILE_NAME;
use crate::xml::{XmlDocument, XmlNodeId};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};

/// File names making up an encrypted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedParts {
    pub encrypted_xml_file: String,
    pub media_files: Vec<String>,
    pub base64_encrypted_key: String,
    pub signature: Option<String>,
}

/// A submission instance document plus the facts the pipeline needs from it.
#[derive(Debug, Clone)]
pub struct Submission {
    document: XmlDocument,
    path: Option<PathBuf>,
    instance_id: String,
    submission_date: Option<DateTime<Utc>>,
    encrypted: Option<EncryptedParts>,
}

impl Submission {
    /// Parses a submission document.
    pub fn parse(xml: &str) -> ModelResult<Self> {
        let document = XmlDocument::parse(xml)?;
        Self::from_document(document, None)
    }

    /// Reads and parses a stored submission file.
    pub fn parse_file(path: &Path) -> ModelResult<Self> {
        let document = XmlDocument::parse_file(path)?;
        Self::from_document(document, Some(path.to_path_buf()))
    }

    /// Wraps an already parsed document, e.g. a decrypted one.
    pub fn from_document(document: XmlDocument, path: Option<PathBuf>) -> ModelResult<Self> {
        let root = document.root();
        let instance_id = document
            .attribute(root, "instanceID")
            .map(str::to_string)
            .or_else(|| {
                document
                    .find(root, "meta/instanceID")
                    .and_then(|n| document.value(n))
                    .map(str::to_string)
            })
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ModelError::InvalidSubmission("missing instance id".to_string()))?;

        let submission_date = document
            .attribute(root, "submissionDate")
            .and_then(parse_submission_date);

        let encrypted = if document.attribute(root, "encrypted") == Some("yes") {
            Some(encrypted_parts(&document, root)?)
        } else {
            None
        };

        Ok(Self {
            document,
            path,
            instance_id,
            submission_date,
            encrypted,
        })
    }

    pub fn document(&self) -> &XmlDocument {
        &self.document
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn submission_date(&self) -> Option<DateTime<Utc>> {
        self.submission_date
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted.is_some()
    }

    pub fn encrypted_parts(&self) -> Option<&EncryptedParts> {
        self.encrypted.as_ref()
    }

    /// Files stored next to the submission document.
    pub fn attachment_files(&self) -> ModelResult<Vec<PathBuf>> {
        let Some(dir) = self.path.as_deref().and_then(Path::parent) else {
            return Ok(Vec::new());
        };
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_document = path.file_name().is_some_and(|n| n == SUBMISSION_FILE_NAME);
            if path.is_file() && !is_document {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn encrypted_parts(doc: &XmlDocument, root: XmlNodeId) -> ModelResult<EncryptedParts> {
    let text = |name: &str| doc.child(root, name).and_then(|n| doc.value(n)).map(str::to_string);

    let encrypted_xml_file = text("encryptedXmlFile").ok_or_else(|| {
        ModelError::InvalidSubmission("encrypted submission has no encryptedXmlFile".to_string())
    })?;
    let base64_encrypted_key = text("base64EncryptedKey").ok_or_else(|| {
        ModelError::InvalidSubmission("encrypted submission has no base64EncryptedKey".to_string())
    })?;
    let media_files = doc
        .children_named(root, "media")
        .flat_map(|media| doc.children_named(media, "file").collect::<Vec<_>>())
        .filter_map(|file| doc.value(file).map(str::to_string))
        .collect();

    Ok(EncryptedParts {
        encrypted_xml_file,
        media_files,
        base64_encrypted_key,
        signature: text("base64EncryptedElementSignature"),
    })
}

/// Parses the submission timestamps servers put on instance documents.
///
/// Accepts RFC 3339, ISO-8601 with a compact offset, the legacy
/// `Sun Jan 01 10:00:00 UTC 2023` form and bare dates.
pub fn parse_submission_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%a %b %d %H:%M:%S UTC %Y") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
