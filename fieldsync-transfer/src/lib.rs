//! Pull and push engines for fieldsync.
//!
//! Moves forms and submissions between a local [`Workspace`] and a remote
//! form server. Two server families are supported:
//! - **Aggregate**: OpenRosa form list, cursor-paged submission ids and
//!   multipart uploads capped by a payload size
//! - **Central**: REST API with projects, session tokens and one request
//!   per attachment
//!
//! Every operation returns a [`Job`](fieldsync_job::Job). Per-item failures
//! are reported as [`TransferEvent::Error`] and the run continues; only
//! problems that make the whole form untransferable fail the job.
//!
//! [`Workspace`]: fieldsync_model::Workspace

mod config;
mod context;
mod error;
mod http;
mod pull;
mod push;
mod server;
mod tracking;

pub use config::{DEFAULT_MAX_PAYLOAD_BYTES, HttpConfig, PullOptions, PushOptions};
pub use context::TransferContext;
pub use error::{TransferError, TransferResult};
pub use http::{
    Credentials, HttpClient, HttpMethod, HttpRequest, HttpResponse, MultipartPart,
    ReqwestHttpClient, RequestBody,
};
pub use pull::{list_remote_forms, pull, pull_all};
pub use push::{LocalFile, create_groups_of_max_size, list_files, push};
pub use server::{
    DownloadedSubmission, RemoteAttachment, RemoteClient, RemoteForm, RemoteFormSource,
    RemoteServer, UploadOutcome,
};
pub use tracking::{Operation, TransferEvent, TransferSummary};
