//! Export configuration.

use crate::decrypt::PrivateKey;
use crate::error::{ExportError, ExportResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Submission date bounds, both days inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Whether a submission with this date passes the filter.
    ///
    /// Undated submissions only pass an unbounded range.
    pub fn contains(&self, date: Option<DateTime<Utc>>) -> bool {
        if self.is_unbounded() {
            return true;
        }
        let Some(day) = date.map(|d| d.date_naive()) else {
            return false;
        };
        self.start.is_none_or(|start| day >= start) && self.end.is_none_or(|end| day <= end)
    }
}

/// Options for one export run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfiguration {
    /// Directory receiving every output file.
    pub export_dir: PathBuf,
    /// Base name of the output files. Defaults to the form name.
    pub file_stem: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Only export submissions newer than the last exported one.
    pub export_since_last: bool,
    pub include_geojson: bool,
    /// Table mapped to GeoJSON. Defaults to the root table.
    pub geojson_table: Option<String>,
    /// Adds one 0/1 column per choice of select-multiple fields.
    pub split_select_multiples: bool,
    /// Uses bare field names instead of group-prefixed ones in headers.
    pub remove_group_names: bool,
    /// Copies referenced attachments into `<export_dir>/media`.
    pub export_media: bool,
    /// Replaces existing output files instead of appending to them.
    pub overwrite_files: bool,
    #[serde(skip)]
    pub private_key: Option<PrivateKey>,
}

impl Default for ExportConfiguration {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::new(),
            file_stem: None,
            start_date: None,
            end_date: None,
            export_since_last: false,
            include_geojson: false,
            geojson_table: None,
            split_select_multiples: false,
            remove_group_names: false,
            export_media: true,
            overwrite_files: false,
            private_key: None,
        }
    }
}

impl ExportConfiguration {
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_file_stem(mut self, stem: impl Into<String>) -> Self {
        self.file_stem = Some(stem.into());
        self
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.start_date = range.start;
        self.end_date = range.end;
        self
    }

    pub fn with_export_since_last(mut self, enabled: bool) -> Self {
        self.export_since_last = enabled;
        self
    }

    pub fn with_geojson(mut self, table: Option<String>) -> Self {
        self.include_geojson = true;
        self.geojson_table = table;
        self
    }

    pub fn with_split_select_multiples(mut self, enabled: bool) -> Self {
        self.split_select_multiples = enabled;
        self
    }

    pub fn with_remove_group_names(mut self, enabled: bool) -> Self {
        self.remove_group_names = enabled;
        self
    }

    pub fn with_export_media(mut self, enabled: bool) -> Self {
        self.export_media = enabled;
        self
    }

    pub fn with_overwrite_files(mut self, enabled: bool) -> Self {
        self.overwrite_files = enabled;
        self
    }

    pub fn with_private_key(mut self, key: PrivateKey) -> Self {
        self.private_key = Some(key);
        self
    }

    pub fn date_range(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date)
    }

    /// Rejects configurations that cannot produce any output.
    pub fn validate(&self) -> ExportResult<()> {
        if self.export_dir.as_os_str().is_empty() {
            return Err(ExportError::Config("export directory is not set".to_string()));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(ExportError::Config(format!(
                    "start date {start} is after end date {end}"
                )));
            }
        }
        if self.file_stem.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(ExportError::Config("file stem is empty".to_string()));
        }
        Ok(())
    }
}
