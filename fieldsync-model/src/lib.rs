//! Form and submission model for fieldsync.
//!
//! Defines the in-memory shapes every pipeline stage shares:
//! - [`XmlDocument`]: an arena-backed, read-only XML tree (forms and submissions)
//! - [`FormModel`]: the field tree of a form definition, with repeat groups,
//!   data types and pre-resolved choice lists
//! - [`FormMetadata`] / [`SubmissionMetadata`]: what is known about each form
//!   and submission in the local workspace
//! - [`MetadataPort`]: the narrow persistence contract for that metadata
//! - [`Workspace`]: the on-disk layout of pulled forms and submissions
//!
//! Trees use indices instead of references: every node stores its parent and
//! children as ids into the owning arena.

mod error;
mod form;
mod metadata;
mod store;
mod submission;
mod workspace;
mod xml;

pub use error::{ModelError, ModelResult};
pub use form::{Choice, DataType, Field, FieldId, FormModel};
pub use metadata::{FormMetadata, LastExportedSubmission, RemoteSource, SubmissionMetadata};
pub use store::{InMemoryMetadataStore, JsonFileMetadataStore, MetadataPort, MetadataState};
pub use submission::{EncryptedParts, Submission, parse_submission_date};
pub use workspace::{SUBMISSION_FILE_NAME, Workspace, sanitize_file_name, sanitize_instance_id};
pub use xml::{XmlDocument, XmlNode, XmlNodeId};
