//! Cancellable async jobs for fieldsync.
//!
//! Every network operation in fieldsync is expressed as a [`Job`]: a deferred
//! chain of async steps that all observe one shared [`RunnerStatus`].
//! Cancellation is cooperative. Calling [`JobHandle::cancel`] only raises a
//! flag; steps check it before each discrete unit of work and report the
//! skipped items through their own progress events.
//!
//! Progress is delivered through [`EventSink`]s, which keep engines free of
//! any particular logging or UI transport.
//!
//! # Example
//!
//! ```
//! use fieldsync_job::Job;
//!
//! # #[tokio::main(flavor = "multi_thread")]
//! # async fn main() {
//! let job = Job::supply(|_status| async { Ok(20) })
//!     .then_apply(|_status, n| async move { Ok(n + 1) })
//!     .map(|n| n * 2);
//!
//! let result = job.launch().join().await.unwrap();
//! assert_eq!(result, 42);
//! # }
//! ```

mod error;
mod job;
mod sink;
mod status;

pub use error::{JobError, JobResult};
pub use job::{Job, JobHandle};
pub use sink::{EventSink, FnSink, NoopSink, RecordingSink, TracingSink};
pub use status::RunnerStatus;
