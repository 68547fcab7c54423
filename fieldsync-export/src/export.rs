//! The export operation.
//!
//! Reads every stored submission of a form, diverts the unreadable ones to
//! `<stem>-errors/`, filters the rest by date, flattens them and writes CSV
//! (and optionally GeoJSON) files. The newest exported submission becomes the
//! form's `last_exported` marker.

use crate::config::ExportConfiguration;
use crate::context::ExportContext;
use crate::csv_writer::CsvExporter;
use crate::decrypt::PrivateKey;
use crate::error::{ExportError, ExportResult};
use crate::flatten::{FlattenedRow, flatten_submission};
use crate::geojson::GeoJsonCollector;
use crate::tracking::ExportEvent;
use chrono::{DateTime, Utc};
use fieldsync_job::{Job, JobError, RunnerStatus};
use fieldsync_model::{
    DataType, FieldId, FormMetadata, FormModel, LastExportedSubmission, Submission,
    sanitize_file_name,
};
use fieldsync_types::ExportOutcome;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Exports one form's stored submissions.
pub fn export(
    ctx: ExportContext,
    form: FormMetadata,
    config: ExportConfiguration,
) -> Job<ExportOutcome> {
    Job::supply(move |status: RunnerStatus| async move {
        let joined =
            tokio::task::spawn_blocking(move || run_export(&ctx, form, &config, &status)).await;
        match joined {
            Ok(result) => result.map_err(JobError::from),
            Err(e) => Err(JobError::Panicked(e.to_string())),
        }
    })
}

/// Exports several forms one after another, each with its own configuration.
pub fn export_all(
    ctx: ExportContext,
    forms: Vec<(FormMetadata, ExportConfiguration)>,
) -> Job<Vec<ExportOutcome>> {
    Job::supply(move |status: RunnerStatus| async move {
        let mut outcomes = Vec::with_capacity(forms.len());
        for (form, config) in forms {
            if status.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            outcomes.push(export(ctx.clone(), form, config).run_with(status.clone()).await?);
        }
        Ok(outcomes)
    })
}

/// A submission that passed parsing, decryption and filtering.
struct Candidate {
    submission: Submission,
    source_dir: PathBuf,
    date: Option<DateTime<Utc>>,
    is_validated: bool,
}

fn run_export(
    ctx: &ExportContext,
    form: FormMetadata,
    config: &ExportConfiguration,
    status: &RunnerStatus,
) -> ExportResult<ExportOutcome> {
    config.validate()?;
    if !form.form_file_exists() {
        return Err(ExportError::Config(format!(
            "form file {} does not exist",
            form.form_file.display()
        )));
    }
    let model = FormModel::load(&form.form_file)?;
    let encrypted = form.is_encrypted || model.is_encrypted();
    let key = if encrypted {
        let key = config.private_key.clone().ok_or_else(|| {
            ExportError::Config(format!("form {} is encrypted and no private key was given", form.key))
        })?;
        Some(key)
    } else {
        None
    };
    let geo_table = match (config.include_geojson, config.geojson_table.as_deref()) {
        (false, _) => None,
        (true, None) => Some(model.root()),
        (true, Some(name)) => Some(model.table_by_name(name).ok_or_else(|| {
            ExportError::Config(format!("form {} has no table named {name}", form.key))
        })?),
    };

    // The stored record carries the newest last-exported marker.
    let form = ctx.store.fetch(&form.key)?.unwrap_or(form);
    let stem = config
        .file_stem
        .clone()
        .unwrap_or_else(|| sanitize_file_name(&form.form_name));

    std::fs::create_dir_all(&config.export_dir)?;
    let error_dir = config.export_dir.join(format!("{stem}-errors"));
    if error_dir.exists() {
        std::fs::remove_dir_all(&error_dir)?;
    }

    let mut skipped = 0usize;
    let mut skip = |instance_id: Option<String>, source_dir: Option<&Path>, reason: String| {
        skipped += 1;
        warn!(
            "skipping submission {} of {}: {}",
            instance_id.as_deref().unwrap_or("?"),
            form.key,
            reason
        );
        if let Some(dir) = source_dir {
            if let Err(e) = copy_to_error_dir(dir, &error_dir) {
                warn!("could not copy {} to the error directory: {}", dir.display(), e);
            }
        }
        ctx.sink.emit(ExportEvent::SubmissionSkipped {
            form: form.key.clone(),
            instance_id,
            reason,
        });
    };

    let range = config.date_range();
    let since = config
        .export_since_last
        .then(|| form.last_exported.as_ref().map(|m| m.submission_date))
        .flatten();

    let mut candidates = Vec::new();
    for file in ctx.workspace.submission_files(&form)? {
        let source_dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
        let submission = match Submission::parse_file(&file) {
            Ok(submission) => submission,
            Err(e) => {
                skip(None, Some(source_dir.as_path()), e.to_string());
                continue;
            }
        };
        let date = submission.submission_date();
        if !range.contains(date) || !is_after(date, since) {
            debug!("{} is outside the export window", submission.instance_id());
            continue;
        }
        let candidate = match &key {
            Some(key) => decrypt(ctx, submission, key, source_dir, date),
            None => Ok(Candidate {
                submission,
                source_dir,
                date,
                is_validated: false,
            }),
        };
        match candidate {
            Ok(candidate) => candidates.push(candidate),
            Err((instance_id, dir, reason)) => skip(Some(instance_id), Some(dir.as_path()), reason),
        }
    }
    candidates.sort_by(|a, b| {
        (a.date, a.submission.instance_id()).cmp(&(b.date, b.submission.instance_id()))
    });

    let total = candidates.len() + skipped;
    info!("exporting {} submissions of {}", total, form.key);
    ctx.sink.emit(ExportEvent::Started {
        form: form.key.clone(),
        total,
    });

    let mut csv = CsvExporter::create(&model, config, &stem, encrypted)?;
    let mut geojson = geo_table.map(|table| GeoJsonCollector::new(&model, table));
    let binary_fields: Vec<FieldId> = model
        .fields()
        .filter(|(_, f)| f.data_type == DataType::Binary)
        .map(|(id, _)| id)
        .collect();
    let media_dir = config.export_dir.join("media");

    let mut exported = 0usize;
    let mut newest: Option<(DateTime<Utc>, String)> = None;
    for candidate in &candidates {
        if status.is_cancelled() {
            ctx.sink.emit(ExportEvent::Cancelled {
                form: form.key.clone(),
            });
            break;
        }
        let rows = flatten_submission(&model, &candidate.submission);
        csv.write_submission(&rows, candidate.date, candidate.is_validated)?;
        if let Some(collector) = geojson.as_mut() {
            collector.add_rows(&rows);
        }
        if config.export_media {
            copy_media(&rows, &binary_fields, &candidate.source_dir, &media_dir, config)?;
        }

        exported += 1;
        if let Some(date) = candidate.date {
            if newest.as_ref().is_none_or(|(d, _)| date >= *d) {
                newest = Some((date, candidate.submission.instance_id().to_string()));
            }
        }
        ctx.sink.emit(ExportEvent::Progress {
            form: form.key.clone(),
            exported,
            total,
        });
    }
    csv.finish()?;
    if let Some(collector) = &geojson {
        collector.write(&config.export_dir.join(format!("{stem}.geojson")))?;
    }

    if let Some((date, instance_id)) = newest {
        let marker = LastExportedSubmission::new(instance_id, date, Utc::now());
        ctx.store.execute(&mut |state| {
            match state.form_mut(&form.key) {
                Some(stored) => stored.mark_exported(marker.clone()),
                None => {
                    let mut record = form.clone();
                    record.mark_exported(marker.clone());
                    state.upsert_form(record);
                }
            }
            Ok(())
        })?;
    }

    let outcome = ExportOutcome::from_counts(exported, total);
    info!("{}: {} ({} of {})", form.key, outcome, exported, total);
    ctx.sink.emit(ExportEvent::Completed {
        form: form.key.clone(),
        exported,
        total,
        outcome,
    });
    Ok(outcome)
}

fn decrypt(
    ctx: &ExportContext,
    submission: Submission,
    key: &PrivateKey,
    source_dir: PathBuf,
    date: Option<DateTime<Utc>>,
) -> Result<Candidate, (String, PathBuf, String)> {
    if !submission.is_encrypted() {
        return Err((
            submission.instance_id().to_string(),
            source_dir,
            "submission of an encrypted form is not encrypted".to_string(),
        ));
    }
    match ctx.decryptor.decrypt(&submission, key) {
        Ok(decrypted) => Ok(Candidate {
            date: decrypted.submission.submission_date().or(date),
            submission: decrypted.submission,
            source_dir,
            is_validated: decrypted.is_validated,
        }),
        Err(e) => Err((submission.instance_id().to_string(), source_dir, e.to_string())),
    }
}

/// Strictly newer than the marker. Undated submissions never pass a marker.
fn is_after(date: Option<DateTime<Utc>>, since: Option<DateTime<Utc>>) -> bool {
    match (since, date) {
        (None, _) => true,
        (Some(since), Some(date)) => date > since,
        (Some(_), None) => false,
    }
}

fn copy_to_error_dir(source: &Path, error_dir: &Path) -> ExportResult<()> {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "submission".to_string());
    copy_dir(source, &error_dir.join(name))
}

fn copy_dir(source: &Path, target: &Path) -> ExportResult<()> {
    std::fs::create_dir_all(target)?;
    for entry in std::fs::read_dir(source)? {
        let path = entry?.path();
        let Some(name) = path.file_name() else {
            continue;
        };
        if path.is_dir() {
            copy_dir(&path, &target.join(name))?;
        } else {
            std::fs::copy(&path, target.join(name))?;
        }
    }
    Ok(())
}

/// Copies the files named by binary fields into the media directory.
fn copy_media(
    rows: &[FlattenedRow],
    binary_fields: &[FieldId],
    source_dir: &Path,
    media_dir: &Path,
    config: &ExportConfiguration,
) -> ExportResult<()> {
    for row in rows {
        for field in binary_fields {
            let Some(name) = row.value(*field).map(str::trim).filter(|n| !n.is_empty()) else {
                continue;
            };
            // Names come from the submission; never let them leave the directory.
            if Path::new(name).components().count() != 1 {
                warn!("ignoring attachment with a path in its name: {name}");
                continue;
            }
            let source = source_dir.join(name);
            if !source.is_file() {
                debug!("attachment {} is not stored locally", source.display());
                continue;
            }
            let target = media_dir.join(name);
            if target.exists() && !config.overwrite_files {
                continue;
            }
            std::fs::create_dir_all(media_dir)?;
            std::fs::copy(&source, &target)?;
        }
    }
    Ok(())
}
