//! Flattening of submission trees into table rows.
//!
//! The submission's instance id keys the root row. Every occurrence of a
//! repeat group becomes a row of that group's table with the local id
//! `<parent local id>/<element name>[<position>]`, where the position is
//! 1-based among same-named siblings. Non-repeat groups add no row; their
//! values land in the enclosing row.

use fieldsync_model::{FieldId, FormModel, Submission, XmlDocument, XmlNodeId};
use std::collections::BTreeMap;
use tracing::debug;

/// One row of a flattened table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenedRow {
    /// The root field or the repeat group this row belongs to.
    pub table: FieldId,
    pub local_id: String,
    /// `None` for the root row.
    pub parent_local_id: Option<String>,
    /// Position among same-named siblings; 1 for the root row.
    pub ordinal: usize,
    /// Scalar values captured directly under this occurrence.
    pub values: BTreeMap<FieldId, String>,
}

impl FlattenedRow {
    fn new(table: FieldId, local_id: String, parent_local_id: Option<String>, ordinal: usize) -> Self {
        Self {
            table,
            local_id,
            parent_local_id,
            ordinal,
            values: BTreeMap::new(),
        }
    }

    pub fn value(&self, field: FieldId) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }
}

/// Flattens a parsed submission.
pub fn flatten_submission(model: &FormModel, submission: &Submission) -> Vec<FlattenedRow> {
    flatten(model, submission.document(), submission.instance_id())
}

/// Flattens a submission tree into rows in document order; the root row
/// comes first.
pub fn flatten(model: &FormModel, document: &XmlDocument, instance_id: &str) -> Vec<FlattenedRow> {
    let root = model.root();
    let mut rows = vec![FlattenedRow::new(root, instance_id.to_string(), None, 1)];
    let mut walker = Walker {
        model,
        document,
        rows: &mut rows,
    };
    walker.walk(document.root(), model.path(root), 0);
    rows
}

struct Walker<'a> {
    model: &'a FormModel,
    document: &'a XmlDocument,
    rows: &'a mut Vec<FlattenedRow>,
}

impl Walker<'_> {
    fn walk(&mut self, node: XmlNodeId, path: &str, row: usize) {
        let children: Vec<XmlNodeId> = self.document.children(node).collect();
        for child in children {
            let name = self.document.name(child);
            let child_path = format!("{path}/{name}");
            let Some(field_id) = self.model.field_by_path(&child_path) else {
                debug!("no field for {child_path}");
                continue;
            };
            let field = self.model.field(field_id);

            if field.repeatable {
                let ordinal = self.document.position_among_same_name(child);
                let parent_id = self.rows[row].local_id.clone();
                let local_id = format!("{parent_id}/{name}[{ordinal}]");
                self.rows
                    .push(FlattenedRow::new(field_id, local_id, Some(parent_id), ordinal));
                let next = self.rows.len() - 1;
                self.walk(child, &child_path, next);
            } else if field.is_scalar() {
                let value = self.document.value(child).unwrap_or_default().to_string();
                self.rows[row].values.entry(field_id).or_insert(value);
            } else {
                self.walk(child, &child_path, row);
            }
        }
    }
}
