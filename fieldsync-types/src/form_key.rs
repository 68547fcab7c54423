//! Form identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a form: its id plus an optional version.
///
/// Equality and ordering are over `(id, version)`, with an absent version
/// sorting before any present one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FormKey {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

impl FormKey {
    /// Creates a form key. Fails when the id is blank.
    pub fn new(id: impl Into<String>, version: Option<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(crate::Error::EmptyFormId);
        }
        let version = version.filter(|v| !v.trim().is_empty());
        Ok(Self { id, version })
    }

    /// Creates an unversioned form key.
    pub fn of(id: impl Into<String>) -> crate::Result<Self> {
        Self::new(id, None)
    }

    /// Returns the form id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the form version, if any.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

impl fmt::Display for FormKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}[{}]", self.id, version),
            None => write!(f, "{}", self.id),
        }
    }
}

impl FromStr for FormKey {
    type Err = crate::Error;

    /// Parses the `Display` form: `id` or `id[version]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_suffix(']').and_then(|rest| rest.rsplit_once('[')) {
            Some((id, version)) => Self::new(id, Some(version.to_string())),
            None => Self::of(s),
        }
    }
}
