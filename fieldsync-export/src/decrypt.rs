//! Decryption port for encrypted submissions.
//!
//! The export stage never decrypts by itself. A [`Decryptor`] turns an
//! encrypted submission (its manifest plus the files next to it) into a
//! plaintext one; failures are treated like parse failures.

use crate::error::{ExportError, ExportResult};
use fieldsync_model::Submission;
use std::fmt;
use std::path::Path;

/// The private key matching a form's `base64RsaPublicKey`, PEM encoded.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey(String);

impl PrivateKey {
    pub fn from_pem(pem: impl Into<String>) -> Self {
        Self(pem.into())
    }

    /// Reads a PEM file.
    pub fn read(path: &Path) -> ExportResult<Self> {
        let pem = std::fs::read_to_string(path)?;
        if pem.trim().is_empty() {
            return Err(ExportError::Config(format!(
                "private key file {} is empty",
                path.display()
            )));
        }
        Ok(Self(pem))
    }

    pub fn pem(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(***)")
    }
}

/// A decrypted submission.
#[derive(Debug, Clone)]
pub struct Decrypted {
    pub submission: Submission,
    /// Whether the submission's signature matched.
    pub is_validated: bool,
}

/// Decrypts submissions of encrypted forms.
pub trait Decryptor: Send + Sync {
    fn decrypt(&self, submission: &Submission, key: &PrivateKey) -> ExportResult<Decrypted>;
}

/// Used when no decryption capability is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDecryption;

impl Decryptor for NoDecryption {
    fn decrypt(&self, submission: &Submission, _key: &PrivateKey) -> ExportResult<Decrypted> {
        Err(ExportError::Decryption(format!(
            "no decryptor configured for submission {}",
            submission.instance_id()
        )))
    }
}

impl<F> Decryptor for F
where
    F: Fn(&Submission, &PrivateKey) -> ExportResult<Decrypted> + Send + Sync,
{
    fn decrypt(&self, submission: &Submission, key: &PrivateKey) -> ExportResult<Decrypted> {
        self(submission, key)
    }
}
