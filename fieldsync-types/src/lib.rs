//! Core value types for fieldsync.
//!
//! This crate defines the small, immutable types shared by every other
//! fieldsync crate:
//! - Form identity (`FormKey`)
//! - Resume tokens tracking how far a form has been synchronized (`Cursor`)
//! - The outcome of an export run (`ExportOutcome`)
//!
//! Nothing here performs I/O.

mod cursor;
mod form_key;
mod outcome;

pub use cursor::{AggregateCursor, Cursor, CursorType};
pub use form_key::FormKey;
pub use outcome::ExportOutcome;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when building or decoding value types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("form has no id")]
    EmptyFormId,

    #[error("unknown cursor type: {0}")]
    UnknownCursorType(String),

    #[error("invalid {kind} cursor value: {reason}")]
    InvalidCursor { kind: &'static str, reason: String },
}
