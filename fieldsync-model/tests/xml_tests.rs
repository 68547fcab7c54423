use fieldsync_model::{ModelError, XmlDocument};
use pretty_assertions::assert_eq;

const DOC: &str = r#"<?xml version="1.0"?>
<data xmlns:orx="http://openrosa.org/xforms" id="household" orx:version="3">
  <name>Ada &amp; Co</name>
  <member><age>31</age></member>
  <member><age>4</age></member>
  <note/>
  <other>x</other>
  <member><age>60</age></member>
  <orx:meta><orx:instanceID>uuid:1</orx:instanceID></orx:meta>
</data>"#;

// ── Parsing ─────────────────────────────────────────────────────

#[test]
fn parses_tree_with_local_names() {
    let doc = XmlDocument::parse(DOC).unwrap();
    let root = doc.root();
    assert_eq!(doc.name(root), "data");
    let names: Vec<&str> = doc.children(root).map(|c| doc.name(c)).collect();
    assert_eq!(
        names,
        vec!["name", "member", "member", "note", "other", "member", "meta"]
    );
    assert_eq!(doc.node(doc.child(root, "meta").unwrap()).qualified_name, "orx:meta");
}

#[test]
fn text_is_unescaped_and_trimmed() {
    let doc = XmlDocument::parse(DOC).unwrap();
    let name = doc.child(doc.root(), "name").unwrap();
    assert_eq!(doc.value(name), Some("Ada & Co"));
    assert_eq!(doc.value(doc.child(doc.root(), "note").unwrap()), None);
}

#[test]
fn attributes_match_by_local_name() {
    let doc = XmlDocument::parse(DOC).unwrap();
    assert_eq!(doc.attribute(doc.root(), "id"), Some("household"));
    assert_eq!(doc.attribute(doc.root(), "version"), Some("3"));
    assert_eq!(doc.attribute(doc.root(), "orx:version"), Some("3"));
    assert_eq!(doc.attribute(doc.root(), "missing"), None);
}

#[test]
fn cdata_becomes_value() {
    let doc = XmlDocument::parse("<a><b><![CDATA[<raw>]]></b></a>").unwrap();
    assert_eq!(doc.value(doc.child(doc.root(), "b").unwrap()), Some("<raw>"));
}

#[test]
fn mismatched_tags_are_rejected() {
    assert!(matches!(
        XmlDocument::parse("<a><b></a>"),
        Err(ModelError::Xml(_))
    ));
}

#[test]
fn multiple_roots_are_rejected() {
    assert!(matches!(
        XmlDocument::parse("<a/><b/>"),
        Err(ModelError::Xml(_))
    ));
}

#[test]
fn empty_input_is_rejected() {
    assert!(XmlDocument::parse("   ").is_err());
}

// ── Navigation ──────────────────────────────────────────────────

#[test]
fn find_follows_paths() {
    let doc = XmlDocument::parse(DOC).unwrap();
    let id = doc.find(doc.root(), "meta/instanceID").unwrap();
    assert_eq!(doc.value(id), Some("uuid:1"));
    assert!(doc.find(doc.root(), "meta/missing").is_none());
}

#[test]
fn parent_links_point_upward() {
    let doc = XmlDocument::parse(DOC).unwrap();
    let age = doc.find(doc.root(), "member/age").unwrap();
    let member = doc.parent(age).unwrap();
    assert_eq!(doc.name(member), "member");
    assert_eq!(doc.parent(member), Some(doc.root()));
    assert_eq!(doc.parent(doc.root()), None);
}

#[test]
fn descendants_are_in_document_order() {
    let doc = XmlDocument::parse("<a><b><c/></b><d/></a>").unwrap();
    let names: Vec<&str> = doc
        .descendants(doc.root())
        .into_iter()
        .map(|n| doc.name(n))
        .collect();
    assert_eq!(names, vec!["b", "c", "d"]);
}

#[test]
fn position_counts_only_same_name_siblings() {
    let doc = XmlDocument::parse(DOC).unwrap();
    let members: Vec<_> = doc.children_named(doc.root(), "member").collect();
    let positions: Vec<usize> = members
        .iter()
        .map(|m| doc.position_among_same_name(*m))
        .collect();
    assert_eq!(positions, vec![1, 2, 3]);
    assert_eq!(doc.position_among_same_name(doc.root()), 1);
}

// ── Serialization ───────────────────────────────────────────────

#[test]
fn subtree_serializes_with_inherited_namespaces() {
    let doc = XmlDocument::parse(DOC).unwrap();
    let meta = doc.child(doc.root(), "meta").unwrap();
    assert_eq!(
        doc.to_xml_string(meta),
        r#"<orx:meta xmlns:orx="http://openrosa.org/xforms"><orx:instanceID>uuid:1</orx:instanceID></orx:meta>"#
    );
}

#[test]
fn serialized_text_is_escaped() {
    let doc = XmlDocument::parse(DOC).unwrap();
    let name = doc.child(doc.root(), "name").unwrap();
    assert_eq!(doc.to_xml_string(name), "<name>Ada &amp; Co</name>");
}

#[test]
fn serialized_document_parses_back_identically() {
    let doc = XmlDocument::parse(DOC).unwrap();
    let again = XmlDocument::parse(&doc.to_xml_string(doc.root())).unwrap();
    assert_eq!(doc, again);
}
