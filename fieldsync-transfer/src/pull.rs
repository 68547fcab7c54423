//! Pull engine: server to local workspace.
//!
//! A pull downloads the form definition if it is missing, fetches missing
//! form attachments, enumerates submission instance ids and downloads the
//! ones not present locally. Per-item failures are reported and skipped.
//! Only enumeration itself decides whether the stored cursor advances.

use crate::config::PullOptions;
use crate::context::TransferContext;
use crate::error::{TransferError, TransferResult};
use crate::server::{RemoteFormSource, RemoteServer};
use crate::tracking::{Operation, Tracker, TransferEvent};
use fieldsync_job::{Job, JobError, RunnerStatus};
use fieldsync_model::{
    FormMetadata, FormModel, MetadataPort, Submission, SubmissionMetadata, sanitize_file_name,
};
use fieldsync_types::Cursor;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Pulls one form. Yields the updated, persisted metadata.
pub fn pull(ctx: TransferContext, form: FormMetadata, options: PullOptions) -> Job<FormMetadata> {
    Job::supply(move |status: RunnerStatus| async move {
        run_pull(&ctx, form, &options, &status)
            .await
            .map_err(JobError::from)
    })
}

/// Pulls several forms concurrently.
pub fn pull_all(
    ctx: TransferContext,
    forms: Vec<FormMetadata>,
    options: PullOptions,
) -> Job<Vec<FormMetadata>> {
    let jobs = forms
        .into_iter()
        .map(|form| pull(ctx.clone(), form, options.clone()))
        .collect();
    Job::all_of(jobs)
}

/// Lists the server's forms as workspace metadata.
///
/// Forms already known to the store keep their stored record; new ones are
/// persisted.
pub fn list_remote_forms(ctx: TransferContext) -> Job<Vec<FormMetadata>> {
    Job::supply(move |_| async move {
        let listed = ctx.remote.list_forms().await?;
        let mut out = Vec::with_capacity(listed.len());
        for remote in listed {
            let form = match ctx.store.fetch(&remote.key).map_err(TransferError::from)? {
                Some(known) => known,
                None => {
                    let form = remote.into_metadata(&ctx.workspace);
                    ctx.store.persist(form.clone()).map_err(TransferError::from)?;
                    form
                }
            };
            out.push(form);
        }
        Ok(out)
    })
}

async fn run_pull(
    ctx: &TransferContext,
    mut form: FormMetadata,
    options: &PullOptions,
    status: &RunnerStatus,
) -> TransferResult<FormMetadata> {
    let tracker = Tracker::new(form.key.clone(), Operation::Pull, ctx.sink.clone());
    tracker.started();
    info!("pulling {} from {}", form.key, ctx.remote.server());

    if !form.form_file_exists() {
        if status.is_cancelled() {
            tracker.cancelled("form");
            tracker.completed();
            return Ok(form);
        }
        let definition = ctx.remote.download_form(&form).await?;
        if let Some(dir) = form.form_file.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&form.form_file, definition).await?;
        tracker.succeeded(TransferEvent::FormDownloaded {
            form: form.key.clone(),
        });
    }
    let model = FormModel::load(&form.form_file)?;
    form.is_encrypted = model.is_encrypted();
    let root_element = model.field(model.root()).name.clone();

    pull_form_attachments(ctx, &form, &tracker, status).await;

    let (ids, final_cursor) = enumerate_instances(ctx, &form, options, &tracker, status).await;
    let pending: Vec<String> = ids
        .into_iter()
        .filter(|id| !ctx.workspace.has_submission(&form, id))
        .collect();
    debug!("{}: {} new submissions", form.key, pending.len());

    let total = pending.len();
    let done = Arc::new(AtomicUsize::new(0));
    futures::stream::iter(pending)
        .map(|instance_id| {
            let item = SubmissionPull {
                ctx: ctx.clone(),
                form: form.clone(),
                root_element: root_element.clone(),
                tracker: tracker.clone(),
                status: status.clone(),
                done: done.clone(),
                total,
            };
            async move { item.run(&instance_id).await }
        })
        .buffer_unordered(ctx.remote.max_connections())
        .collect::<Vec<()>>()
        .await;

    if let Some(cursor) = final_cursor.filter(|_| !status.is_cancelled()) {
        form.advance_cursor(cursor);
    }
    form.mark_pulled();
    ctx.store.persist(form.clone())?;

    let summary = tracker.completed();
    info!("pulled {}: {}", form.key, summary);
    Ok(form)
}

async fn pull_form_attachments(
    ctx: &TransferContext,
    form: &FormMetadata,
    tracker: &Tracker,
    status: &RunnerStatus,
) {
    if status.is_cancelled() {
        tracker.cancelled("form attachment list");
        return;
    }
    let attachments = match ctx.remote.list_form_attachments(form).await {
        Ok(attachments) => attachments,
        Err(e) => {
            tracker.failed("form attachment list", e);
            return;
        }
    };
    let total = attachments.len();
    let media_dir = form.media_dir();

    for (index, attachment) in attachments.into_iter().enumerate() {
        if status.is_cancelled() {
            tracker.cancelled(format!("attachment {}", attachment.name));
            continue;
        }
        let target = media_dir.join(sanitize_file_name(&attachment.name));
        if target.exists() {
            tracker.already_exists(TransferEvent::AttachmentAlreadyExists {
                form: form.key.clone(),
                name: attachment.name,
            });
            continue;
        }
        let url = match (&attachment.download_url, attachment.exists) {
            (Some(url), true) => url,
            _ => {
                info!("{}: attachment {} not available", form.key, attachment.name);
                tracker.skipped(TransferEvent::AttachmentUnavailable {
                    form: form.key.clone(),
                    name: attachment.name,
                });
                continue;
            }
        };
        match ctx.remote.download_to(url, &target).await {
            Ok(()) => tracker.succeeded(TransferEvent::AttachmentTransferred {
                form: form.key.clone(),
                name: attachment.name,
                index: index + 1,
                total,
            }),
            Err(e) => tracker.failed(format!("attachment {}", attachment.name), e),
        }
    }
}

/// Collects instance ids to consider and, for Aggregate, the cursor to
/// store afterwards. The cursor is `None` when enumeration did not finish.
async fn enumerate_instances(
    ctx: &TransferContext,
    form: &FormMetadata,
    options: &PullOptions,
    tracker: &Tracker,
    status: &RunnerStatus,
) -> (Vec<String>, Option<Cursor>) {
    if status.is_cancelled() {
        tracker.cancelled("submission list");
        return (Vec::new(), None);
    }

    if let RemoteServer::Central { .. } = ctx.remote.server() {
        return match ctx.remote.central_instance_ids(&form.key).await {
            Ok(ids) => {
                tracker.emit(TransferEvent::BatchReceived {
                    form: form.key.clone(),
                    size: ids.len(),
                });
                (ids, None)
            }
            Err(e) => {
                tracker.failed("submission list", e);
                (Vec::new(), None)
            }
        };
    }

    let num_entries = options.max_entries_per_batch.max(1);
    let mut cursor = Cursor::race([
        options.resume_from.clone().unwrap_or_default(),
        form.cursor.clone(),
    ]);
    let mut seen = HashSet::new();
    let mut ids = Vec::new();

    loop {
        if status.is_cancelled() {
            tracker.cancelled("submission list");
            return (ids, None);
        }
        let chunk = match ctx
            .remote
            .aggregate_id_chunk(&form.key, &cursor, num_entries, options.include_incomplete)
            .await
        {
            Ok(chunk) => chunk,
            Err(e) => {
                tracker.failed("submission list", e);
                return (ids, None);
            }
        };
        let received = chunk.ids.len();
        tracker.emit(TransferEvent::BatchReceived {
            form: form.key.clone(),
            size: received,
        });
        for id in chunk.ids {
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
        // A full page that does not move the cursor would repeat forever.
        let stalled = chunk.cursor.is_empty() || chunk.cursor == cursor;
        if !chunk.cursor.is_empty() {
            cursor = chunk.cursor;
        }
        if received < num_entries {
            break;
        }
        if stalled {
            warn!("{}: server returned a full page without advancing its cursor", form.key);
            break;
        }
    }
    (ids, Some(cursor))
}

/// One submission download, owning what it needs so it can run alongside
/// its siblings.
struct SubmissionPull {
    ctx: TransferContext,
    form: FormMetadata,
    root_element: String,
    tracker: Tracker,
    status: RunnerStatus,
    done: Arc<AtomicUsize>,
    total: usize,
}

impl SubmissionPull {
    async fn run(&self, instance_id: &str) {
        let Self {
            ctx,
            form,
            root_element,
            tracker,
            status,
            done,
            total,
        } = self;
        let item = format!("submission {instance_id}");
        if status.is_cancelled() {
            tracker.cancelled(item);
            return;
        }
        let downloaded = match ctx
            .remote
            .download_submission(&form.key, root_element, instance_id)
            .await
        {
            Ok(downloaded) => downloaded,
            Err(e) => {
                tracker.failed(item, e);
                return;
            }
        };

        let file = form.submission_file(instance_id);
        if let Err(e) = write_file(&file, downloaded.xml.as_bytes()).await {
            tracker.failed(item, e);
            return;
        }

        let dir = form.submission_dir(instance_id);
        let attachment_total = downloaded.attachments.len();
        for (index, attachment) in downloaded.attachments.into_iter().enumerate() {
            if status.is_cancelled() {
                tracker.cancelled(format!("attachment {} of {item}", attachment.name));
                continue;
            }
            let target = dir.join(sanitize_file_name(&attachment.name));
            if target.exists() {
                continue;
            }
            let Some(url) = attachment.download_url.as_deref().filter(|_| attachment.exists) else {
                tracker.skipped(TransferEvent::AttachmentUnavailable {
                    form: form.key.clone(),
                    name: attachment.name,
                });
                continue;
            };
            match ctx.remote.download_to(url, &target).await {
                Ok(()) => tracker.emit(TransferEvent::SubmissionAttachmentTransferred {
                    form: form.key.clone(),
                    instance_id: instance_id.to_string(),
                    name: attachment.name,
                    index: index + 1,
                    total: attachment_total,
                }),
                Err(e) => tracker.failed(format!("attachment {} of {item}", attachment.name), e),
            }
        }

        let submission_date = Submission::parse(&downloaded.xml)
            .ok()
            .and_then(|s| s.submission_date());
        let metadata = SubmissionMetadata::new(form.key.clone(), instance_id, file, submission_date);
        if let Err(e) = ctx.store.persist_submission(metadata) {
            tracker.failed(item, e);
            return;
        }

        let index = done.fetch_add(1, Ordering::Relaxed) + 1;
        tracker.succeeded(TransferEvent::SubmissionTransferred {
            form: form.key.clone(),
            instance_id: instance_id.to_string(),
            index,
            total: *total,
        });
    }
}

async fn write_file(path: &std::path::Path, contents: &[u8]) -> TransferResult<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(path, contents).await?;
    Ok(())
}
