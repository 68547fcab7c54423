//! Push engine: local workspace to server.
//!
//! The form and its attachments are resolved first (uploaded, or found to
//! exist already); only then are submissions uploaded, in parallel. A 409
//! answer to any upload counts as "already exists", never as an error.

use crate::config::PushOptions;
use crate::context::TransferContext;
use crate::error::{TransferError, TransferResult};
use crate::http::{HttpRequest, MultipartPart};
use crate::server::{RemoteFormSource, RemoteServer, UploadOutcome, aggregate, central};
use crate::tracking::{Operation, Tracker, TransferEvent};
use fieldsync_job::{Job, JobError, RunnerStatus};
use fieldsync_model::{FormMetadata, FormModel, SUBMISSION_FILE_NAME, Submission};
use futures::StreamExt;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// A file on disk to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size,
        }
    }

    /// Reads name and size from the file system.
    pub fn from_path(path: &Path) -> TransferResult<Self> {
        let size = std::fs::metadata(path)?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, path, size))
    }

    pub fn content_type(&self) -> &'static str {
        content_type_for(&self.name)
    }

    async fn into_part(self, field_name: Option<&str>) -> TransferResult<MultipartPart> {
        let data = tokio::fs::read(&self.path).await?;
        let content_type = self.content_type();
        let field_name = field_name.unwrap_or(&self.name).to_string();
        Ok(MultipartPart::new(field_name, self.name, content_type, data))
    }
}

/// Regular files in `dir`, sorted by name, except submission documents.
pub fn list_files(dir: &Path) -> TransferResult<Vec<LocalFile>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_document = path.file_name().is_some_and(|n| n == SUBMISSION_FILE_NAME);
        if path.is_file() && !is_document {
            files.push(LocalFile::from_path(&path)?);
        }
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Splits attachments into groups that fit one request each.
///
/// Every group is seeded with `base_size` (the document sent along with
/// it) and grows while `running + next <= max_size`. An attachment that
/// does not fit even alone ends up in a group of its own.
pub fn create_groups_of_max_size(
    base_size: u64,
    files: Vec<LocalFile>,
    max_size: u64,
) -> Vec<Vec<LocalFile>> {
    let mut groups = Vec::new();
    let mut current: Vec<LocalFile> = Vec::new();
    let mut running = base_size;
    for file in files {
        if !current.is_empty() && running.saturating_add(file.size) > max_size {
            groups.push(std::mem::take(&mut current));
            running = base_size;
        }
        running = running.saturating_add(file.size);
        current.push(file);
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

fn content_type_for(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "xml" => "text/xml",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "3gp" => "video/3gpp",
        "csv" => "text/csv",
        "geojson" => "application/geo+json",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

/// Pushes one form and its submissions.
///
/// Fails before any request when the target is Central and the form is
/// encrypted.
pub fn push(ctx: TransferContext, form: FormMetadata, options: PushOptions) -> Job<()> {
    Job::run(move |status: RunnerStatus| async move {
        run_push(&ctx, form, &options, &status)
            .await
            .map_err(JobError::from)
    })
}

async fn run_push(
    ctx: &TransferContext,
    form: FormMetadata,
    options: &PushOptions,
    status: &RunnerStatus,
) -> TransferResult<()> {
    if !form.form_file_exists() {
        return Err(TransferError::Config(format!(
            "form file {} does not exist",
            form.form_file.display()
        )));
    }
    let model = FormModel::load(&form.form_file)?;
    if ctx.remote.server().is_central() && (form.is_encrypted || model.is_encrypted()) {
        return Err(TransferError::Unsupported(format!(
            "cannot push encrypted form {} to central",
            form.key
        )));
    }

    let tracker = Tracker::new(form.key.clone(), Operation::Push, ctx.sink.clone());
    tracker.started();
    info!("pushing {} to {}", form.key, ctx.remote.server());

    if status.is_cancelled() {
        tracker.cancelled("form");
        tracker.completed();
        return Ok(());
    }
    let exists = !options.force_send_form && ctx.remote.form_exists(&form.key).await?;
    if exists {
        tracker.already_exists(TransferEvent::FormAlreadyExists {
            form: form.key.clone(),
        });
    } else {
        match ctx.remote.server() {
            RemoteServer::Aggregate { .. } => {
                push_aggregate_form(ctx, &form, options, &tracker, status).await
            }
            RemoteServer::Central { .. } => push_central_form(ctx, &form, &tracker, status).await,
        }
    }

    let files = ctx.workspace.submission_files(&form)?;
    let total = files.len();
    debug!("{}: {} local submissions", form.key, total);
    let done = Arc::new(AtomicUsize::new(0));
    futures::stream::iter(files)
        .map(|file| {
            let item = SubmissionPush {
                ctx: ctx.clone(),
                form: form.clone(),
                tracker: tracker.clone(),
                status: status.clone(),
                max_payload_bytes: options.max_payload_bytes,
                done: done.clone(),
                total,
            };
            async move { item.run(&file).await }
        })
        .buffer_unordered(ctx.remote.max_connections())
        .collect::<Vec<()>>()
        .await;

    let summary = tracker.completed();
    info!("pushed {}: {}", form.key, summary);
    Ok(())
}

/// Uploads the definition with its attachments in size-bounded requests.
///
/// A failed request is reported against the form (first request only) and
/// the attachments it carried; later requests still go out.
async fn push_aggregate_form(
    ctx: &TransferContext,
    form: &FormMetadata,
    options: &PushOptions,
    tracker: &Tracker,
    status: &RunnerStatus,
) {
    let prepared = LocalFile::from_path(&form.form_file)
        .and_then(|definition| Ok((definition, list_files(&form.media_dir())?)));
    let (definition, attachments) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => {
            tracker.failed("form", e);
            return;
        }
    };
    let base_url = ctx.remote.server().base_url();
    let total = attachments.len();
    let mut groups =
        create_groups_of_max_size(definition.size, attachments, options.max_payload_bytes);
    if groups.is_empty() {
        groups.push(Vec::new());
    }
    debug!("{}: uploading form in {} requests", form.key, groups.len());

    let mut index = 0;
    for (group_no, group) in groups.into_iter().enumerate() {
        let names: Vec<String> = group.iter().map(|f| f.name.clone()).collect();
        if status.is_cancelled() {
            tracker.cancelled(format!("form upload request {}", group_no + 1));
            index += names.len();
            continue;
        }
        let sent = upload_group(ctx, &definition, "form_def_file", group, |parts| {
            aggregate::form_upload(base_url, parts)
        })
        .await;
        let outcome = match sent {
            Ok(outcome) => outcome,
            Err(e) => {
                if group_no == 0 {
                    tracker.failed("form", &e);
                }
                for name in names {
                    index += 1;
                    tracker.failed(format!("attachment {name}"), &e);
                }
                continue;
            }
        };

        if group_no == 0 {
            let event = match outcome {
                UploadOutcome::Created => TransferEvent::FormUploaded {
                    form: form.key.clone(),
                },
                UploadOutcome::AlreadyExists => TransferEvent::FormAlreadyExists {
                    form: form.key.clone(),
                },
            };
            record(tracker, outcome, event);
        }
        for name in names {
            index += 1;
            let event = match outcome {
                UploadOutcome::Created => TransferEvent::AttachmentTransferred {
                    form: form.key.clone(),
                    name,
                    index,
                    total,
                },
                UploadOutcome::AlreadyExists => TransferEvent::AttachmentAlreadyExists {
                    form: form.key.clone(),
                    name,
                },
            };
            record(tracker, outcome, event);
        }
    }
}

/// Reads `lead` and `group` from disk and sends them as one multipart request.
async fn upload_group(
    ctx: &TransferContext,
    lead: &LocalFile,
    lead_field: &str,
    group: Vec<LocalFile>,
    request: impl FnOnce(Vec<MultipartPart>) -> HttpRequest,
) -> TransferResult<UploadOutcome> {
    let mut parts = vec![lead.clone().into_part(Some(lead_field)).await?];
    for file in group {
        parts.push(file.into_part(None).await?);
    }
    ctx.remote.upload(request(parts)).await
}

/// Creates a draft, adds its attachments and publishes it.
///
/// Without a draft there is nothing to attach to, so a failed form upload
/// ends this stage; submissions are still attempted by the caller.
async fn push_central_form(
    ctx: &TransferContext,
    form: &FormMetadata,
    tracker: &Tracker,
    status: &RunnerStatus,
) {
    let RemoteServer::Central {
        base_url,
        project_id,
        ..
    } = ctx.remote.server()
    else {
        return;
    };
    if status.is_cancelled() {
        tracker.cancelled("form");
        return;
    }
    let uploaded = match tokio::fs::read(&form.form_file).await {
        Ok(definition) => {
            ctx.remote
                .upload(central::form_upload(base_url, *project_id, definition))
                .await
        }
        Err(e) => Err(e.into()),
    };
    match uploaded {
        Ok(UploadOutcome::AlreadyExists) => {
            tracker.already_exists(TransferEvent::FormAlreadyExists {
                form: form.key.clone(),
            });
            return;
        }
        Ok(UploadOutcome::Created) => tracker.succeeded(TransferEvent::FormUploaded {
            form: form.key.clone(),
        }),
        Err(e) => {
            tracker.failed("form", e);
            return;
        }
    }

    let attachments = match list_files(&form.media_dir()) {
        Ok(attachments) => attachments,
        Err(e) => {
            tracker.failed("form attachment list", e);
            Vec::new()
        }
    };
    let total = attachments.len();
    for (index, file) in attachments.into_iter().enumerate() {
        let item = format!("attachment {}", file.name);
        if status.is_cancelled() {
            tracker.cancelled(item);
            continue;
        }
        let name = file.name.clone();
        let content_type = file.content_type();
        let data = match tokio::fs::read(&file.path).await {
            Ok(data) => data,
            Err(e) => {
                tracker.failed(item, e);
                continue;
            }
        };
        let request = central::draft_attachment_upload(
            base_url,
            *project_id,
            form.key.id(),
            &name,
            content_type,
            data,
        );
        match ctx.remote.upload(request).await {
            Ok(outcome) => record(
                tracker,
                outcome,
                match outcome {
                    UploadOutcome::Created => TransferEvent::AttachmentTransferred {
                        form: form.key.clone(),
                        name,
                        index: index + 1,
                        total,
                    },
                    UploadOutcome::AlreadyExists => TransferEvent::AttachmentAlreadyExists {
                        form: form.key.clone(),
                        name,
                    },
                },
            ),
            Err(e) => tracker.failed(item, e),
        }
    }

    if status.is_cancelled() {
        tracker.cancelled("form publish");
        return;
    }
    if let Err(e) = ctx
        .remote
        .upload(central::draft_publish(base_url, *project_id, form.key.id()))
        .await
    {
        tracker.failed("form publish", e);
    }
}

fn record(tracker: &Tracker, outcome: UploadOutcome, event: TransferEvent) {
    match outcome {
        UploadOutcome::Created => tracker.succeeded(event),
        UploadOutcome::AlreadyExists => tracker.already_exists(event),
    }
}

/// One submission upload, owning what it needs so it can run alongside
/// its siblings.
struct SubmissionPush {
    ctx: TransferContext,
    form: FormMetadata,
    tracker: Tracker,
    status: RunnerStatus,
    max_payload_bytes: u64,
    done: Arc<AtomicUsize>,
    total: usize,
}

impl SubmissionPush {
    async fn run(&self, file: &Path) {
        let item = format!("submission {}", file.display());
        if self.status.is_cancelled() {
            self.tracker.cancelled(item);
            return;
        }
        let submission = match Submission::parse_file(file) {
            Ok(submission) => submission,
            Err(e) => {
                self.tracker.failed(item, e);
                return;
            }
        };
        let result = match self.ctx.remote.server() {
            RemoteServer::Aggregate { .. } => self.push_aggregate(file, &submission).await,
            RemoteServer::Central { .. } => self.push_central(file, &submission).await,
        };
        if let Err(e) = result {
            self.tracker
                .failed(format!("submission {}", submission.instance_id()), e);
        }
    }

    fn record_submission(&self, instance_id: &str, outcome: UploadOutcome) {
        match outcome {
            UploadOutcome::Created => {
                let index = self.done.fetch_add(1, Ordering::Relaxed) + 1;
                self.tracker.succeeded(TransferEvent::SubmissionTransferred {
                    form: self.form.key.clone(),
                    instance_id: instance_id.to_string(),
                    index,
                    total: self.total,
                });
            }
            UploadOutcome::AlreadyExists => {
                self.tracker
                    .already_exists(TransferEvent::SubmissionAlreadyExists {
                        form: self.form.key.clone(),
                        instance_id: instance_id.to_string(),
                    });
            }
        }
    }

    fn record_attachment(
        &self,
        instance_id: &str,
        name: String,
        index: usize,
        total: usize,
        outcome: UploadOutcome,
    ) {
        match outcome {
            UploadOutcome::Created => self.tracker.emit(TransferEvent::SubmissionAttachmentTransferred {
                form: self.form.key.clone(),
                instance_id: instance_id.to_string(),
                name,
                index,
                total,
            }),
            UploadOutcome::AlreadyExists => {
                self.tracker
                    .already_exists(TransferEvent::AttachmentAlreadyExists {
                        form: self.form.key.clone(),
                        name,
                    })
            }
        }
    }

    /// Sends the document with its attachments in size-bounded requests.
    async fn push_aggregate(&self, file: &Path, submission: &Submission) -> TransferResult<()> {
        let base_url = self.ctx.remote.server().base_url();
        let instance_id = submission.instance_id();
        let document = LocalFile::from_path(file)?;
        let dir = file.parent().unwrap_or_else(|| Path::new("."));
        let attachments = list_files(dir)?;
        let total = attachments.len();
        let mut groups =
            create_groups_of_max_size(document.size, attachments, self.max_payload_bytes);
        if groups.is_empty() {
            groups.push(Vec::new());
        }

        let mut index = 0;
        for (group_no, group) in groups.into_iter().enumerate() {
            let names: Vec<String> = group.iter().map(|f| f.name.clone()).collect();
            if self.status.is_cancelled() {
                self.tracker
                    .cancelled(format!("submission {instance_id} request {}", group_no + 1));
                index += names.len();
                continue;
            }
            let sent = upload_group(&self.ctx, &document, "xml_submission_file", group, |parts| {
                aggregate::submission_upload(base_url, parts)
            })
            .await;
            let outcome = match sent {
                Ok(outcome) => outcome,
                Err(e) => {
                    if group_no == 0 {
                        self.tracker.failed(format!("submission {instance_id}"), &e);
                    }
                    for name in names {
                        index += 1;
                        self.tracker
                            .failed(format!("attachment {name} of {instance_id}"), &e);
                    }
                    continue;
                }
            };
            if group_no == 0 {
                self.record_submission(instance_id, outcome);
            }
            for name in names {
                index += 1;
                self.record_attachment(instance_id, name, index, total, outcome);
            }
        }
        Ok(())
    }

    /// Sends the document, then each attachment as its own request.
    async fn push_central(&self, file: &Path, submission: &Submission) -> TransferResult<()> {
        let RemoteServer::Central {
            base_url,
            project_id,
            ..
        } = self.ctx.remote.server()
        else {
            return Err(TransferError::Unsupported("not a central server".to_string()));
        };
        let instance_id = submission.instance_id();
        let form_id = self.form.key.id();
        let document = tokio::fs::read(file).await?;
        let outcome = self
            .ctx
            .remote
            .upload(central::submission_upload(base_url, *project_id, form_id, document))
            .await?;
        self.record_submission(instance_id, outcome);

        let dir = file.parent().unwrap_or_else(|| Path::new("."));
        let attachments = list_files(dir)?;
        let total = attachments.len();
        let uploads = attachments.into_iter().enumerate().map(|(index, attachment)| async move {
            if self.status.is_cancelled() {
                self.tracker
                    .cancelled(format!("attachment {} of {instance_id}", attachment.name));
                return;
            }
            let result = async {
                let data = tokio::fs::read(&attachment.path).await?;
                self.ctx
                    .remote
                    .upload(central::submission_attachment_upload(
                        base_url,
                        *project_id,
                        form_id,
                        instance_id,
                        &attachment.name,
                        attachment.content_type(),
                        data,
                    ))
                    .await
            }
            .await;
            match result {
                Ok(outcome) => self.record_attachment(
                    instance_id,
                    attachment.name.clone(),
                    index + 1,
                    total,
                    outcome,
                ),
                Err(e) => self
                    .tracker
                    .failed(format!("attachment {} of {instance_id}", attachment.name), e),
            }
        });
        join_all(uploads).await;
        Ok(())
    }
}
