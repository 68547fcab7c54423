//! Export of stored submissions for fieldsync.
//!
//! Turns the nested submission documents of a form into relational tables:
//! one root row per submission, one row per repeat-group occurrence, linked
//! by generated `KEY`/`PARENT_KEY` values. The tables are written as CSV
//! files and, optionally, one table as a GeoJSON `FeatureCollection`.
//!
//! Unreadable or undecryptable submissions never abort a run; they are
//! copied to an error directory and counted toward the run's
//! [`ExportOutcome`](fieldsync_types::ExportOutcome).

mod config;
mod context;
mod csv_writer;
mod decrypt;
mod error;
mod export;
mod flatten;
mod geojson;
mod tracking;

pub use config::{DateRange, ExportConfiguration};
pub use context::ExportContext;
pub use csv_writer::{CsvExporter, TableLayout};
pub use decrypt::{Decrypted, Decryptor, NoDecryption, PrivateKey};
pub use error::{ExportError, ExportResult};
pub use export::{export, export_all};
pub use flatten::{FlattenedRow, flatten, flatten_submission};
pub use geojson::{GeoJsonCollector, geometry};
pub use tracking::ExportEvent;
