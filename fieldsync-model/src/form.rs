//! Form definitions as a field tree.
//!
//! A [`FormModel`] is built once from an XForms document. Fields live in an
//! arena addressed by [`FieldId`]; the first entry is always the instance
//! root. Every lookup table the export stage needs (path index, fqn index)
//! is owned by the model and built at load time.

use crate::error::{ModelError, ModelResult};
use crate::xml::{XmlDocument, XmlNodeId};
use fieldsync_types::FormKey;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};

/// Index of a field inside its [`FormModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId(usize);

/// The XForms data type bound to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Text,
    Integer,
    Decimal,
    Date,
    Time,
    DateTime,
    Select1,
    Select,
    GeoPoint,
    GeoTrace,
    GeoShape,
    Binary,
    Barcode,
    Group,
    Repeat,
    Unknown,
}

impl DataType {
    /// Maps a `<bind type>` value (with or without `xsd:` prefix).
    pub fn from_bind_type(raw: &str) -> Self {
        let name = raw.rsplit_once(':').map_or(raw, |(_, local)| local);
        match name.to_ascii_lowercase().as_str() {
            "string" => DataType::Text,
            "int" | "integer" | "long" | "short" => DataType::Integer,
            "decimal" | "double" | "float" => DataType::Decimal,
            "date" => DataType::Date,
            "time" => DataType::Time,
            "datetime" => DataType::DateTime,
            "select1" => DataType::Select1,
            "select" => DataType::Select,
            "geopoint" => DataType::GeoPoint,
            "geotrace" => DataType::GeoTrace,
            "geoshape" => DataType::GeoShape,
            "binary" => DataType::Binary,
            "barcode" => DataType::Barcode,
            _ => DataType::Unknown,
        }
    }

    /// Geo types produce GeoJSON geometries.
    pub fn is_geo(&self) -> bool {
        matches!(self, DataType::GeoPoint | DataType::GeoTrace | DataType::GeoShape)
    }

    /// Groups and repeats hold other fields instead of a value.
    pub fn is_container(&self) -> bool {
        matches!(self, DataType::Group | DataType::Repeat)
    }
}

/// One option of a choice list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Choice {
    pub fn new(value: impl Into<String>, label: Option<String>) -> Self {
        Self {
            value: value.into(),
            label,
        }
    }
}

/// A node of the field tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub path: String,
    pub parent: Option<FieldId>,
    pub children: Vec<FieldId>,
    pub data_type: DataType,
    pub repeatable: bool,
    /// Pre-resolved choices. `None` when the field has no choice list or
    /// when the list comes from an external secondary instance.
    pub choices: Option<Vec<Choice>>,
}

impl Field {
    /// Whether the field carries a value (as opposed to other fields).
    pub fn is_scalar(&self) -> bool {
        !self.repeatable && self.children.is_empty() && !self.data_type.is_container()
    }
}

/// A parsed form definition.
#[derive(Debug, Clone)]
pub struct FormModel {
    title: String,
    form_id: String,
    version: Option<String>,
    public_key: Option<String>,
    fields: Vec<Field>,
    by_path: HashMap<String, FieldId>,
    tables_by_fqn: HashMap<String, FieldId>,
    table_names: HashMap<FieldId, String>,
}

impl FormModel {
    /// Parses a form definition.
    pub fn parse(xml: &str) -> ModelResult<Self> {
        let doc = XmlDocument::parse(xml)?;
        FormBuilder::new(&doc)?.build()
    }

    /// Reads and parses a form definition file.
    pub fn load(path: &Path) -> ModelResult<Self> {
        let xml = std::fs::read_to_string(path)?;
        debug!("loading form model from {}", path.display());
        Self::parse(&xml)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn form_id(&self) -> &str {
        &self.form_id
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Identity of this form.
    pub fn form_key(&self) -> ModelResult<FormKey> {
        Ok(FormKey::new(self.form_id.clone(), self.version.clone())?)
    }

    /// True when the form declares a submission public key.
    pub fn is_encrypted(&self) -> bool {
        self.public_key.is_some()
    }

    /// The base64 RSA public key submissions are encrypted with.
    pub fn public_key(&self) -> Option<&str> {
        self.public_key.as_deref()
    }

    /// The instance root field.
    pub fn root(&self) -> FieldId {
        FieldId(0)
    }

    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id.0]
    }

    /// All fields in document order.
    pub fn fields(&self) -> impl Iterator<Item = (FieldId, &Field)> {
        self.fields.iter().enumerate().map(|(i, f)| (FieldId(i), f))
    }

    /// Looks up a field by absolute path, e.g. `/data/household/member`.
    pub fn field_by_path(&self, path: &str) -> Option<FieldId> {
        self.by_path.get(path).copied()
    }

    /// Absolute path of a field.
    pub fn path(&self, id: FieldId) -> &str {
        &self.fields[id.0].path
    }

    /// The closest repeatable ancestor of `id`, excluding `id` itself.
    pub fn nearest_repeat(&self, id: FieldId) -> Option<FieldId> {
        let mut current = self.fields[id.0].parent;
        while let Some(candidate) = current {
            if self.fields[candidate.0].repeatable {
                return Some(candidate);
            }
            current = self.fields[candidate.0].parent;
        }
        None
    }

    /// The table a field's value lands in: its nearest repeat, or the root.
    pub fn table_of(&self, id: FieldId) -> FieldId {
        self.nearest_repeat(id).unwrap_or(self.root())
    }

    /// Names from just below the nearest repeat boundary (or the instance
    /// root) down to `id`, joined with `-`.
    pub fn fqn(&self, id: FieldId) -> String {
        if id == self.root() {
            return self.fields[0].name.clone();
        }
        let boundary = self.table_of(id);
        self.names_between(boundary, id).join("-")
    }

    /// Names from just below the root down to `id`, joined with `-`.
    pub fn full_fqn(&self, id: FieldId) -> String {
        if id == self.root() {
            return self.fields[0].name.clone();
        }
        self.names_between(self.root(), id).join("-")
    }

    fn names_between(&self, ancestor: FieldId, id: FieldId) -> Vec<&str> {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                break;
            }
            names.push(self.fields[node.0].name.as_str());
            current = self.fields[node.0].parent;
        }
        names.reverse();
        names
    }

    /// Every repeatable field in document order.
    pub fn repeat_groups(&self) -> Vec<FieldId> {
        self.fields()
            .filter(|(_, f)| f.repeatable)
            .map(|(id, _)| id)
            .collect()
    }

    /// Output table name for the root or a repeat group.
    ///
    /// Unique across the form: when two repeats share the same short fqn
    /// both fall back to their full fqn.
    pub fn table_name(&self, table: FieldId) -> String {
        self.table_names
            .get(&table)
            .cloned()
            .unwrap_or_else(|| self.fqn(table))
    }

    /// Finds a table (root or repeat) by its output name.
    pub fn table_by_name(&self, name: &str) -> Option<FieldId> {
        self.tables_by_fqn.get(name).copied()
    }

    /// Value-carrying fields of a table in document order, not descending
    /// into nested repeats.
    pub fn scalar_fields(&self, table: FieldId) -> Vec<FieldId> {
        let mut out = Vec::new();
        self.walk_table(table, &mut |id, field| {
            if field.is_scalar() {
                out.push(id);
            }
        });
        out
    }

    /// Repeats whose nearest repeat ancestor is `table`.
    pub fn child_repeats(&self, table: FieldId) -> Vec<FieldId> {
        let mut out = Vec::new();
        self.walk_table(table, &mut |id, field| {
            if field.repeatable {
                out.push(id);
            }
        });
        out
    }

    /// Geo-typed scalar fields of a table.
    pub fn geo_fields(&self, table: FieldId) -> Vec<FieldId> {
        self.scalar_fields(table)
            .into_iter()
            .filter(|id| self.fields[id.0].data_type.is_geo())
            .collect()
    }

    fn walk_table(&self, table: FieldId, visit: &mut dyn FnMut(FieldId, &Field)) {
        let mut pending: Vec<FieldId> = self.fields[table.0].children.iter().rev().copied().collect();
        while let Some(id) = pending.pop() {
            let field = &self.fields[id.0];
            visit(id, field);
            if !field.repeatable {
                pending.extend(field.children.iter().rev().copied());
            }
        }
    }
}

// ── Builder ──────────────────────────────────────────────────────

struct FormBuilder<'a> {
    doc: &'a XmlDocument,
    model: XmlNodeId,
    main_root: XmlNodeId,
    title: String,
    binds: HashMap<String, DataType>,
    repeats: HashSet<String>,
    choices: HashMap<String, Option<Vec<Choice>>>,
}

impl<'a> FormBuilder<'a> {
    fn new(doc: &'a XmlDocument) -> ModelResult<Self> {
        let head = doc
            .find_descendant(doc.root(), "head")
            .ok_or_else(|| ModelError::InvalidForm("missing <head>".to_string()))?;
        let model = doc
            .find_descendant(head, "model")
            .ok_or_else(|| ModelError::InvalidForm("missing <model>".to_string()))?;
        let main_instance = doc
            .children_named(model, "instance")
            .find(|instance| doc.attribute(*instance, "id").is_none())
            .ok_or_else(|| ModelError::InvalidForm("missing main <instance>".to_string()))?;
        let main_root = doc
            .children(main_instance)
            .next()
            .ok_or_else(|| ModelError::InvalidForm("main instance is empty".to_string()))?;
        let title = doc
            .child(head, "title")
            .and_then(|t| doc.value(t))
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            doc,
            model,
            main_root,
            title,
            binds: HashMap::new(),
            repeats: HashSet::new(),
            choices: HashMap::new(),
        })
    }

    fn build(mut self) -> ModelResult<FormModel> {
        let doc = self.doc;
        let form_id = doc
            .attribute(self.main_root, "id")
            .map(str::to_string)
            .unwrap_or_else(|| doc.name(self.main_root).to_string());
        if form_id.trim().is_empty() {
            return Err(ModelError::InvalidForm("form has no id".to_string()));
        }
        let version = doc
            .attribute(self.main_root, "version")
            .filter(|v| !v.trim().is_empty())
            .map(str::to_string);
        let public_key = doc
            .child(self.model, "submission")
            .and_then(|s| doc.attribute(s, "base64RsaPublicKey"))
            .filter(|k| !k.trim().is_empty())
            .map(str::to_string);

        self.collect_binds();
        if let Some(body) = doc.find_descendant(doc.root(), "body") {
            let root_path = format!("/{}", doc.name(self.main_root));
            self.collect_body(body, &root_path);
        }

        let mut fields = Vec::new();
        let mut by_path = HashMap::new();
        self.add_field(self.main_root, None, "", &mut fields, &mut by_path);

        let mut model = FormModel {
            title: self.title,
            form_id,
            version,
            public_key,
            fields,
            by_path,
            tables_by_fqn: HashMap::new(),
            table_names: HashMap::new(),
        };
        index_tables(&mut model);
        debug!(
            "form {} parsed: {} fields, {} repeats",
            model.form_id,
            model.fields.len(),
            model.repeat_groups().len()
        );
        Ok(model)
    }

    fn collect_binds(&mut self) {
        let doc = self.doc;
        for bind in doc.children_named(self.model, "bind") {
            let (Some(nodeset), Some(kind)) =
                (doc.attribute(bind, "nodeset"), doc.attribute(bind, "type"))
            else {
                continue;
            };
            self.binds
                .insert(normalize_path(nodeset), DataType::from_bind_type(kind));
        }
    }

    /// Walks body controls, tracking the context path of enclosing groups
    /// and repeats so relative `ref`s resolve.
    fn collect_body(&mut self, node: XmlNodeId, context: &str) {
        let doc = self.doc;
        for child in doc.children(node).collect::<Vec<_>>() {
            let name = doc.name(child);
            let reference = doc
                .attribute(child, "ref")
                .or_else(|| doc.attribute(child, "nodeset"));
            let path = reference.map(|r| resolve_ref(context, r));

            match name {
                "repeat" => {
                    if let Some(path) = &path {
                        self.repeats.insert(path.clone());
                    }
                    self.collect_body(child, path.as_deref().unwrap_or(context));
                }
                "group" => self.collect_body(child, path.as_deref().unwrap_or(context)),
                "select" | "select1" | "rank" | "odk:rank" => {
                    if let Some(path) = path {
                        let choices = self.resolve_choices(child);
                        self.choices.insert(path, choices);
                    }
                }
                _ => {}
            }
        }
    }

    fn resolve_choices(&self, control: XmlNodeId) -> Option<Vec<Choice>> {
        let doc = self.doc;
        if let Some(itemset) = doc.child(control, "itemset") {
            return self.resolve_itemset(itemset);
        }
        let items: Vec<Choice> = doc
            .children_named(control, "item")
            .filter_map(|item| {
                let value = doc.child(item, "value").and_then(|v| doc.value(v))?;
                let label = doc
                    .child(item, "label")
                    .and_then(|l| doc.value(l))
                    .map(str::to_string);
                Some(Choice::new(value, label))
            })
            .collect();
        Some(items)
    }

    /// Resolves `<itemset nodeset="instance('x')/root/item">` against an
    /// internal secondary instance.
    fn resolve_itemset(&self, itemset: XmlNodeId) -> Option<Vec<Choice>> {
        let doc = self.doc;
        let nodeset = doc.attribute(itemset, "nodeset")?;
        let (instance_id, rest) = split_instance_ref(nodeset)?;
        let instance = doc
            .children_named(self.model, "instance")
            .find(|i| doc.attribute(*i, "id") == Some(instance_id))?;
        if doc.attribute(instance, "src").is_some() {
            debug!("itemset {} uses external instance, left unresolved", nodeset);
            return None;
        }

        let mut current = vec![instance];
        for segment in strip_predicates(rest).split('/').filter(|s| !s.is_empty()) {
            current = current
                .into_iter()
                .flat_map(|n| doc.children_named(n, segment).collect::<Vec<_>>())
                .collect();
        }

        let value_ref = doc
            .child(itemset, "value")
            .and_then(|v| doc.attribute(v, "ref"))
            .unwrap_or("name");
        let label_ref = doc
            .child(itemset, "label")
            .and_then(|l| doc.attribute(l, "ref"))
            .filter(|r| !r.contains('('));

        let choices = current
            .into_iter()
            .filter_map(|item| {
                let value = doc.find(item, value_ref).and_then(|v| doc.value(v))?;
                let label = label_ref
                    .and_then(|r| doc.find(item, r))
                    .and_then(|l| doc.value(l))
                    .map(str::to_string);
                Some(Choice::new(value, label))
            })
            .collect();
        Some(choices)
    }

    fn add_field(
        &self,
        node: XmlNodeId,
        parent: Option<FieldId>,
        parent_path: &str,
        fields: &mut Vec<Field>,
        by_path: &mut HashMap<String, FieldId>,
    ) {
        let doc = self.doc;
        let name = doc.name(node).to_string();
        let path = format!("{parent_path}/{name}");
        let id = FieldId(fields.len());

        let is_template = doc.attribute(node, "template").is_some();
        let repeatable = parent.is_some() && (is_template || self.repeats.contains(&path));
        let has_children = doc.children(node).next().is_some();
        let data_type = if repeatable {
            DataType::Repeat
        } else if let Some(kind) = self.binds.get(&path) {
            *kind
        } else if has_children {
            DataType::Group
        } else {
            DataType::Text
        };

        fields.push(Field {
            name,
            path: path.clone(),
            parent,
            children: Vec::new(),
            data_type,
            repeatable,
            choices: self.choices.get(&path).cloned().flatten(),
        });
        by_path.insert(path.clone(), id);
        if let Some(parent) = parent {
            fields[parent.0].children.push(id);
        }

        // A repeat may appear as a template plus prefilled copies.
        let mut seen = HashSet::new();
        for child in doc.children(node) {
            let child_name = doc.name(child);
            if !seen.insert(child_name.to_string()) {
                continue;
            }
            self.add_field(child, Some(id), &path, fields, by_path);
        }
    }
}

fn index_tables(model: &mut FormModel) {
    let mut tables = vec![model.root()];
    tables.extend(model.repeat_groups());

    let mut counts: HashMap<String, usize> = HashMap::new();
    for table in &tables {
        *counts.entry(model.fqn(*table)).or_default() += 1;
    }
    for table in tables {
        let short = model.fqn(table);
        let name = if counts.get(&short).copied().unwrap_or(0) > 1 {
            warn!("repeat name {} is ambiguous, using full name", short);
            model.full_fqn(table)
        } else {
            short
        };
        model.tables_by_fqn.insert(name.clone(), table);
        model.table_names.insert(table, name);
    }
}

/// Normalizes an absolute nodeset, dropping predicates and namespace prefixes.
fn normalize_path(path: &str) -> String {
    let stripped = strip_predicates(path.trim());
    let segments: Vec<&str> = stripped
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.rsplit_once(':').map_or(s, |(_, local)| local))
        .collect();
    format!("/{}", segments.join("/"))
}

/// Resolves a body `ref` against the enclosing context path.
fn resolve_ref(context: &str, reference: &str) -> String {
    let reference = reference.trim();
    if reference.starts_with('/') {
        return normalize_path(reference);
    }
    let mut segments: Vec<&str> = context.split('/').filter(|s| !s.is_empty()).collect();
    for segment in reference.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    normalize_path(&format!("/{}", segments.join("/")))
}

fn strip_predicates(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut depth = 0usize;
    for c in path.chars() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// Splits `instance('id')/rest` into `("id", "/rest")`.
fn split_instance_ref(nodeset: &str) -> Option<(&str, &str)> {
    let start = nodeset.find("instance(")? + "instance(".len();
    let tail = &nodeset[start..];
    let close = tail.find(')')?;
    let id = tail[..close].trim().trim_matches(|c| c == '\'' || c == '"');
    Some((id, &tail[close + 1..]))
}
