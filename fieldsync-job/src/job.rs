//! The job type and its combinators.

use crate::error::{JobError, JobResult};
use crate::status::RunnerStatus;
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use std::future::Future;
use tokio::task::{JoinError, JoinHandle};
use tracing::debug;

type Body<T> = Box<dyn FnOnce(RunnerStatus) -> BoxFuture<'static, JobResult<T>> + Send>;

/// A deferred unit of async work producing a `T`.
///
/// Nothing runs until the job is launched (or driven inline with
/// [`Job::run_with`]). Sequenced steps never overlap: each step starts only
/// after its predecessor's future has resolved. A step that returns an error
/// fails the whole job and later steps do not run.
pub struct Job<T> {
    body: Body<T>,
}

impl Job<()> {
    /// Creates a job from a body whose result is discarded.
    pub fn run<F, Fut>(body: F) -> Self
    where
        F: FnOnce(RunnerStatus) -> Fut + Send + 'static,
        Fut: Future<Output = JobResult<()>> + Send + 'static,
    {
        Job::supply(body)
    }
}

impl<T: Send + 'static> Job<T> {
    /// Creates a job from a body that produces a value.
    pub fn supply<F, Fut>(body: F) -> Self
    where
        F: FnOnce(RunnerStatus) -> Fut + Send + 'static,
        Fut: Future<Output = JobResult<T>> + Send + 'static,
    {
        Self {
            body: Box::new(move |status| body(status).boxed()),
        }
    }

    /// Creates a job that immediately yields `value`.
    pub fn completed(value: T) -> Self {
        Self::supply(move |_| async move { Ok(value) })
    }

    /// Creates a job that immediately fails with `error`.
    pub fn failed(error: JobError) -> Self {
        Self::supply(move |_| async move { Err(error) })
    }

    /// Runs `step` after this job, discarding this job's value.
    pub fn then_run<F, Fut>(self, step: F) -> Job<()>
    where
        F: FnOnce(RunnerStatus) -> Fut + Send + 'static,
        Fut: Future<Output = JobResult<()>> + Send + 'static,
    {
        self.then_supply(step)
    }

    /// Runs `step` after this job and yields its value instead.
    pub fn then_supply<U, F, Fut>(self, step: F) -> Job<U>
    where
        U: Send + 'static,
        F: FnOnce(RunnerStatus) -> Fut + Send + 'static,
        Fut: Future<Output = JobResult<U>> + Send + 'static,
    {
        self.then_apply(move |status, _| step(status))
    }

    /// Runs `step` after this job, handing it this job's value.
    pub fn then_accept<F, Fut>(self, step: F) -> Job<()>
    where
        F: FnOnce(RunnerStatus, T) -> Fut + Send + 'static,
        Fut: Future<Output = JobResult<()>> + Send + 'static,
    {
        self.then_apply(step)
    }

    /// Runs `step` after this job, transforming its value asynchronously.
    pub fn then_apply<U, F, Fut>(self, step: F) -> Job<U>
    where
        U: Send + 'static,
        F: FnOnce(RunnerStatus, T) -> Fut + Send + 'static,
        Fut: Future<Output = JobResult<U>> + Send + 'static,
    {
        let first = self.body;
        Job {
            body: Box::new(move |status| {
                async move {
                    let value = first(status.clone()).await?;
                    step(status, value).await
                }
                .boxed()
            }),
        }
    }

    /// Transforms this job's value synchronously.
    pub fn map<U, F>(self, f: F) -> Job<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.then_apply(move |_, value| async move { Ok(f(value)) })
    }

    /// Drives this job to completion on the current task.
    pub async fn run_with(self, status: RunnerStatus) -> JobResult<T> {
        (self.body)(status).await
    }

    /// Spawns this job onto the tokio runtime.
    pub fn launch(self) -> JobHandle<T> {
        let status = RunnerStatus::new();
        let task = tokio::spawn(self.run_with(status.clone()));
        JobHandle { status, task }
    }

    /// Spawns this job and reports its outcome to one of two callbacks.
    ///
    /// The returned handle resolves once the callback has run.
    pub fn launch_with<S, E>(self, on_success: S, on_failure: E) -> JobHandle<()>
    where
        S: FnOnce(T) + Send + 'static,
        E: FnOnce(JobError) + Send + 'static,
    {
        let status = RunnerStatus::new();
        let inner = tokio::spawn(self.run_with(status.clone()));
        let task = tokio::spawn(async move {
            match flatten_join(inner.await) {
                Ok(value) => on_success(value),
                Err(error) => {
                    debug!("job failed: {}", error);
                    on_failure(error);
                }
            }
            Ok(())
        });
        JobHandle { status, task }
    }
}

impl<T: Send + 'static> Job<T> {
    /// Runs every job concurrently and collects their values in input order.
    ///
    /// Fails with [`JobError::Cancelled`] if cancellation was requested before
    /// all members finished, or with the first member failure otherwise.
    pub fn all_of(jobs: Vec<Job<T>>) -> Job<Vec<T>> {
        Job::supply(move |status: RunnerStatus| async move {
            let tasks: Vec<_> = jobs
                .into_iter()
                .map(|job| tokio::spawn(job.run_with(status.clone())))
                .collect();
            let results = join_all(tasks).await;
            if status.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            results.into_iter().map(flatten_join).collect()
        })
    }
}

impl<A: Send + 'static, B: Send + 'static> Job<(A, B)> {
    /// Runs two jobs concurrently and joins their values.
    pub fn all_of2(a: Job<A>, b: Job<B>) -> Self {
        Job::supply(move |status: RunnerStatus| async move {
            let ta = tokio::spawn(a.run_with(status.clone()));
            let tb = tokio::spawn(b.run_with(status.clone()));
            let (ra, rb) = futures::join!(ta, tb);
            if status.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            Ok((flatten_join(ra)?, flatten_join(rb)?))
        })
    }
}

impl<A: Send + 'static, B: Send + 'static, C: Send + 'static> Job<(A, B, C)> {
    /// Runs three jobs concurrently and joins their values.
    pub fn all_of3(a: Job<A>, b: Job<B>, c: Job<C>) -> Self {
        Job::supply(move |status: RunnerStatus| async move {
            let ta = tokio::spawn(a.run_with(status.clone()));
            let tb = tokio::spawn(b.run_with(status.clone()));
            let tc = tokio::spawn(c.run_with(status.clone()));
            let (ra, rb, rc) = futures::join!(ta, tb, tc);
            if status.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            Ok((flatten_join(ra)?, flatten_join(rb)?, flatten_join(rc)?))
        })
    }
}

/// Handle to a launched job.
pub struct JobHandle<T> {
    status: RunnerStatus,
    task: JoinHandle<JobResult<T>>,
}

impl<T> JobHandle<T> {
    /// Requests cooperative cancellation.
    pub fn cancel(&self) {
        self.status.cancel();
    }

    /// Returns true once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.status.is_cancelled()
    }

    /// Returns true once the job has finished, successfully or not.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Returns the status shared with the running steps.
    pub fn status(&self) -> RunnerStatus {
        self.status.clone()
    }

    /// Waits for the job to finish.
    pub async fn join(self) -> JobResult<T> {
        flatten_join(self.task.await)
    }
}

fn flatten_join<T>(result: Result<JobResult<T>, JoinError>) -> JobResult<T> {
    match result {
        Ok(inner) => inner,
        Err(e) if e.is_cancelled() => Err(JobError::Cancelled),
        Err(e) => Err(JobError::Panicked(e.to_string())),
    }
}
