use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregate result of one export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportOutcome {
    /// Every candidate submission was written.
    AllExported,
    /// Some submissions were written and some were skipped.
    SomeSkipped,
    /// Candidates existed but none could be written.
    AllSkipped,
}

impl ExportOutcome {
    /// Derives the outcome from exported-vs-total counts.
    #[must_use]
    pub fn from_counts(exported: usize, total: usize) -> Self {
        if exported >= total {
            ExportOutcome::AllExported
        } else if exported == 0 {
            ExportOutcome::AllSkipped
        } else {
            ExportOutcome::SomeSkipped
        }
    }
}

impl fmt::Display for ExportOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExportOutcome::AllExported => "all submissions exported",
            ExportOutcome::SomeSkipped => "some submissions were skipped",
            ExportOutcome::AllSkipped => "all submissions were skipped",
        };
        f.write_str(text)
    }
}
