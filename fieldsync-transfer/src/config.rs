//! Transfer configuration.

use fieldsync_types::Cursor;
use serde::{Deserialize, Serialize};

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Connection pool size. Also bounds parallel submission transfers.
    pub max_connections: usize,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            connect_timeout_secs: 10,
            max_connections: 8,
            user_agent: format!("fieldsync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Options for one pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullOptions {
    /// Also fetch submissions the server marks incomplete (Aggregate only).
    pub include_incomplete: bool,
    /// Page size for Aggregate submission enumeration.
    pub max_entries_per_batch: usize,
    /// Explicit starting point; wins over the stored cursor when non-empty.
    pub resume_from: Option<Cursor>,
}

impl Default for PullOptions {
    fn default() -> Self {
        Self {
            include_incomplete: false,
            max_entries_per_batch: 100,
            resume_from: None,
        }
    }
}

impl PullOptions {
    pub fn with_include_incomplete(mut self, include: bool) -> Self {
        self.include_incomplete = include;
        self
    }

    pub fn with_max_entries_per_batch(mut self, entries: usize) -> Self {
        self.max_entries_per_batch = entries.max(1);
        self
    }

    pub fn with_resume_from(mut self, cursor: Cursor) -> Self {
        self.resume_from = Some(cursor);
        self
    }
}

/// Default request body cap: 10 MiB.
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Options for one push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushOptions {
    /// Upload the form even if the server already has it.
    pub force_send_form: bool,
    /// Largest request body allowed when grouping attachments.
    pub max_payload_bytes: u64,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            force_send_form: false,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

impl PushOptions {
    pub fn with_force_send_form(mut self, force: bool) -> Self {
        self.force_send_form = force;
        self
    }

    pub fn with_max_payload_bytes(mut self, bytes: u64) -> Self {
        self.max_payload_bytes = bytes;
        self
    }
}
