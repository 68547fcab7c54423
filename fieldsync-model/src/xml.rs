//! Arena-backed XML tree.
//!
//! Elements are stored in document order in a single vector; parent and
//! children links are indices into it. Element names are kept both as
//! written (`h:html`) and as local names (`html`); lookups use local names.

use crate::error::{ModelError, ModelResult};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::fmt::Write as _;
use std::path::Path;

/// Index of an element inside its [`XmlDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct XmlNodeId(usize);

impl XmlNodeId {
    /// Position of the element in document order.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// One element of an [`XmlDocument`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlNode {
    /// Name as written in the document, including any prefix.
    pub qualified_name: String,
    /// Name without namespace prefix.
    pub name: String,
    /// Attributes in document order, keyed by their written name.
    pub attributes: Vec<(String, String)>,
    /// Trimmed text content, if any.
    pub value: Option<String>,
    /// Enclosing element, `None` for the root.
    pub parent: Option<XmlNodeId>,
    /// Child elements in document order.
    pub children: Vec<XmlNodeId>,
}

impl XmlNode {
    fn from_start(start: &BytesStart<'_>, parent: Option<XmlNodeId>) -> ModelResult<Self> {
        let qualified_name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| ModelError::Xml(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| ModelError::Xml(e.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            qualified_name,
            name,
            attributes,
            value: None,
            parent,
            children: Vec::new(),
        })
    }

    /// Returns an attribute by local name (`instanceID` matches `orx:instanceID`).
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name || local_part(key) == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A parsed, immutable XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    nodes: Vec<XmlNode>,
}

impl XmlDocument {
    /// Parses a document from a string.
    pub fn parse(xml: &str) -> ModelResult<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut nodes: Vec<XmlNode> = Vec::new();
        let mut stack: Vec<XmlNodeId> = Vec::new();

        loop {
            match reader.read_event().map_err(|e| ModelError::Xml(e.to_string()))? {
                Event::Start(start) => {
                    let id = push_node(&mut nodes, &stack, &start)?;
                    stack.push(id);
                }
                Event::Empty(start) => {
                    push_node(&mut nodes, &stack, &start)?;
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(|e| ModelError::Xml(e.to_string()))?;
                    append_text(&mut nodes, &stack, &text);
                }
                Event::CData(data) => {
                    let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    append_text(&mut nodes, &stack, text.trim());
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if nodes.is_empty() {
            return Err(ModelError::Xml("document has no root element".to_string()));
        }
        if !stack.is_empty() {
            return Err(ModelError::Xml(format!(
                "unclosed element <{}>",
                nodes[stack[stack.len() - 1].0].qualified_name
            )));
        }
        Ok(Self { nodes })
    }

    /// Reads and parses a document from disk.
    pub fn parse_file(path: &Path) -> ModelResult<Self> {
        let xml = std::fs::read_to_string(path)?;
        Self::parse(&xml)
    }

    /// The document element.
    pub fn root(&self) -> XmlNodeId {
        XmlNodeId(0)
    }

    /// Number of elements in the document.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: a parsed document has at least a root element.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the element with the given id.
    pub fn node(&self, id: XmlNodeId) -> &XmlNode {
        &self.nodes[id.0]
    }

    /// Local name of an element.
    pub fn name(&self, id: XmlNodeId) -> &str {
        &self.nodes[id.0].name
    }

    /// Text value of an element.
    pub fn value(&self, id: XmlNodeId) -> Option<&str> {
        self.nodes[id.0].value.as_deref()
    }

    /// Attribute of an element, by local name.
    pub fn attribute(&self, id: XmlNodeId, name: &str) -> Option<&str> {
        self.nodes[id.0].attribute(name)
    }

    /// Parent of an element.
    pub fn parent(&self, id: XmlNodeId) -> Option<XmlNodeId> {
        self.nodes[id.0].parent
    }

    /// Child elements in document order.
    pub fn children(&self, id: XmlNodeId) -> impl Iterator<Item = XmlNodeId> + '_ {
        self.nodes[id.0].children.iter().copied()
    }

    /// Child elements with the given local name.
    pub fn children_named<'a>(
        &'a self,
        id: XmlNodeId,
        name: &'a str,
    ) -> impl Iterator<Item = XmlNodeId> + 'a {
        self.children(id).filter(move |child| self.name(*child) == name)
    }

    /// First child element with the given local name.
    pub fn child(&self, id: XmlNodeId, name: &str) -> Option<XmlNodeId> {
        self.children_named(id, name).next()
    }

    /// Follows a `/`-separated chain of local names starting below `from`.
    pub fn find(&self, from: XmlNodeId, path: &str) -> Option<XmlNodeId> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(from, |current, segment| self.child(current, segment))
    }

    /// All elements below `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: XmlNodeId) -> Vec<XmlNodeId> {
        let mut out = Vec::new();
        let mut pending: Vec<XmlNodeId> = self.nodes[id.0].children.iter().rev().copied().collect();
        while let Some(next) = pending.pop() {
            out.push(next);
            pending.extend(self.nodes[next.0].children.iter().rev().copied());
        }
        out
    }

    /// First element below `id` (depth-first) with the given local name.
    pub fn find_descendant(&self, id: XmlNodeId, name: &str) -> Option<XmlNodeId> {
        self.descendants(id)
            .into_iter()
            .find(|node| self.name(*node) == name)
    }

    /// 1-based position of `id` among the siblings that share its name.
    pub fn position_among_same_name(&self, id: XmlNodeId) -> usize {
        match self.parent(id) {
            Some(parent) => {
                let name = self.name(id);
                self.children_named(parent, name)
                    .take_while(|sibling| *sibling != id)
                    .count()
                    + 1
            }
            None => 1,
        }
    }

    /// Serializes the subtree rooted at `id` back to XML.
    ///
    /// Prefixed namespace declarations made on ancestors of `id` are copied
    /// onto the new root so the fragment stays self-contained. An ancestor's
    /// default namespace is not inherited.
    pub fn to_xml_string(&self, id: XmlNodeId) -> String {
        let mut inherited: Vec<(String, String)> = Vec::new();
        let mut ancestor = self.parent(id);
        while let Some(current) = ancestor {
            for (key, value) in &self.nodes[current.0].attributes {
                let declared_below = inherited.iter().any(|(k, _)| k == key)
                    || self.nodes[id.0].attributes.iter().any(|(k, _)| k == key);
                if key.starts_with("xmlns:") && !declared_below {
                    inherited.push((key.clone(), value.clone()));
                }
            }
            ancestor = self.parent(current);
        }

        let mut out = String::new();
        self.write_node(id, &inherited, &mut out);
        out
    }

    fn write_node(&self, id: XmlNodeId, extra_attributes: &[(String, String)], out: &mut String) {
        let node = &self.nodes[id.0];
        out.push('<');
        out.push_str(&node.qualified_name);
        for (key, value) in node.attributes.iter().chain(extra_attributes) {
            let _ = write!(out, " {}=\"{}\"", key, escape(value.as_str()));
        }
        if node.value.is_none() && node.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        if let Some(value) = &node.value {
            out.push_str(&escape(value.as_str()));
        }
        for child in &node.children {
            self.write_node(*child, &[], out);
        }
        let _ = write!(out, "</{}>", node.qualified_name);
    }
}

fn push_node(
    nodes: &mut Vec<XmlNode>,
    stack: &[XmlNodeId],
    start: &BytesStart<'_>,
) -> ModelResult<XmlNodeId> {
    let parent = stack.last().copied();
    if parent.is_none() && !nodes.is_empty() {
        return Err(ModelError::Xml("multiple root elements".to_string()));
    }
    let id = XmlNodeId(nodes.len());
    nodes.push(XmlNode::from_start(start, parent)?);
    if let Some(parent) = parent {
        nodes[parent.0].children.push(id);
    }
    Ok(id)
}

fn append_text(nodes: &mut [XmlNode], stack: &[XmlNodeId], text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(current) = stack.last() {
        let value = nodes[current.0].value.get_or_insert_with(String::new);
        value.push_str(text);
    }
}

fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}
