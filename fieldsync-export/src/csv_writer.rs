//! CSV output, one file per table.
//!
//! The root table goes to `<stem>.csv` and every repeat group to
//! `<stem>-<table>.csv`. Root files start with `SubmissionDate` and end with
//! `KEY` (plus `isValidated` for encrypted forms); repeat files end with
//! `PARENT_KEY`, `KEY` and `SET-OF-<table>`.

use crate::config::ExportConfiguration;
use crate::error::ExportResult;
use crate::flatten::FlattenedRow;
use chrono::{DateTime, SecondsFormat, Utc};
use csv::{Writer, WriterBuilder};
use fieldsync_model::{DataType, FieldId, FormModel};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

const GEO_PARTS: [&str; 4] = ["Latitude", "Longitude", "Altitude", "Accuracy"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Column {
    SubmissionDate,
    Value(FieldId),
    GeoPart(FieldId, usize),
    Choice(FieldId, String),
    Key,
    ParentKey,
    SetOf,
    IsValidated,
}

/// Column layout of one output table.
#[derive(Debug, Clone)]
pub struct TableLayout {
    table: FieldId,
    element_name: String,
    file: PathBuf,
    headers: Vec<String>,
    columns: Vec<Column>,
}

impl TableLayout {
    fn new(
        model: &FormModel,
        table: FieldId,
        config: &ExportConfiguration,
        stem: &str,
        encrypted: bool,
    ) -> Self {
        let is_root = table == model.root();
        let file_name = if is_root {
            format!("{stem}.csv")
        } else {
            format!("{stem}-{}.csv", model.table_name(table))
        };
        let mut layout = Self {
            table,
            element_name: model.field(table).name.clone(),
            file: config.export_dir.join(file_name),
            headers: Vec::new(),
            columns: Vec::new(),
        };

        if is_root {
            layout.push("SubmissionDate", Column::SubmissionDate);
        }
        for field_id in model.scalar_fields(table) {
            layout.push_field(model, field_id, config);
        }
        if is_root {
            layout.push("KEY", Column::Key);
            if encrypted {
                layout.push("isValidated", Column::IsValidated);
            }
        } else {
            layout.push("PARENT_KEY", Column::ParentKey);
            layout.push("KEY", Column::Key);
            let set_of = format!("SET-OF-{}", model.table_name(table));
            layout.push(&set_of, Column::SetOf);
        }
        layout
    }

    fn push(&mut self, header: &str, column: Column) {
        self.headers.push(header.to_string());
        self.columns.push(column);
    }

    fn push_field(&mut self, model: &FormModel, field_id: FieldId, config: &ExportConfiguration) {
        let field = model.field(field_id);
        let header = if config.remove_group_names {
            field.name.clone()
        } else {
            model.fqn(field_id)
        };
        match field.data_type {
            DataType::GeoPoint => {
                for (index, part) in GEO_PARTS.iter().enumerate() {
                    self.push(&format!("{header}-{part}"), Column::GeoPart(field_id, index));
                }
            }
            DataType::Select if config.split_select_multiples => {
                self.push(&header, Column::Value(field_id));
                for choice in field.choices.iter().flatten() {
                    self.push(
                        &format!("{header}/{}", choice.value),
                        Column::Choice(field_id, choice.value.clone()),
                    );
                }
            }
            _ => self.push(&header, Column::Value(field_id)),
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    fn cells(
        &self,
        row: &FlattenedRow,
        submission_date: Option<DateTime<Utc>>,
        is_validated: bool,
    ) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| match column {
                Column::SubmissionDate => submission_date
                    .map(|d| d.to_rfc3339_opts(SecondsFormat::Millis, true))
                    .unwrap_or_default(),
                Column::Value(field) => row.value(*field).unwrap_or_default().to_string(),
                Column::GeoPart(field, index) => row
                    .value(*field)
                    .and_then(|v| v.split_whitespace().nth(*index))
                    .unwrap_or_default()
                    .to_string(),
                Column::Choice(field, choice) => match row.value(*field) {
                    Some(value) if !value.trim().is_empty() => {
                        let selected = value.split_whitespace().any(|v| v == choice.as_str());
                        let cell = if selected { "1" } else { "0" };
                        cell.to_string()
                    }
                    _ => String::new(),
                },
                Column::Key => row.local_id.clone(),
                Column::ParentKey => row.parent_local_id.clone().unwrap_or_default(),
                Column::SetOf => format!(
                    "{}/{}",
                    row.parent_local_id.as_deref().unwrap_or_default(),
                    self.element_name
                ),
                Column::IsValidated => is_validated.to_string(),
            })
            .collect()
    }
}

/// Writers for every table of a form.
pub struct CsvExporter {
    layouts: Vec<TableLayout>,
    writers: HashMap<FieldId, Writer<File>>,
}

impl CsvExporter {
    /// Opens every table file, writing headers to new or replaced files.
    ///
    /// With `overwrite_files` off, existing non-empty files are appended to
    /// without repeating the header.
    pub fn create(
        model: &FormModel,
        config: &ExportConfiguration,
        stem: &str,
        encrypted: bool,
    ) -> ExportResult<Self> {
        std::fs::create_dir_all(&config.export_dir)?;
        let tables = std::iter::once(model.root()).chain(model.repeat_groups());

        let mut layouts = Vec::new();
        let mut writers = HashMap::new();
        for table in tables {
            let layout = TableLayout::new(model, table, config, stem, encrypted);
            let append = !config.overwrite_files
                && std::fs::metadata(&layout.file).is_ok_and(|m| m.len() > 0);
            let file = if append {
                OpenOptions::new().append(true).open(&layout.file)?
            } else {
                File::create(&layout.file)?
            };
            let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
            if !append {
                writer.write_record(&layout.headers)?;
            }
            debug!(
                "{} {} ({} columns)",
                if append { "appending to" } else { "writing" },
                layout.file.display(),
                layout.headers.len()
            );
            writers.insert(table, writer);
            layouts.push(layout);
        }
        Ok(Self { layouts, writers })
    }

    pub fn layouts(&self) -> &[TableLayout] {
        &self.layouts
    }

    /// Writes all rows of one submission.
    pub fn write_submission(
        &mut self,
        rows: &[FlattenedRow],
        submission_date: Option<DateTime<Utc>>,
        is_validated: bool,
    ) -> ExportResult<()> {
        for row in rows {
            let Some(layout) = self.layouts.iter().find(|l| l.table == row.table) else {
                continue;
            };
            let cells = layout.cells(row, submission_date, is_validated);
            if let Some(writer) = self.writers.get_mut(&row.table) {
                writer.write_record(&cells)?;
            }
        }
        Ok(())
    }

    /// Flushes every file.
    pub fn finish(mut self) -> ExportResult<()> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}
