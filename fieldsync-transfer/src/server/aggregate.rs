//! Aggregate (OpenRosa) endpoints and document parsers.

use super::{DownloadedSubmission, RemoteAttachment, RemoteForm};
use crate::error::{TransferError, TransferResult};
use crate::http::{HttpRequest, MultipartPart};
use fieldsync_model::XmlDocument;
use fieldsync_types::{Cursor, FormKey};

pub(crate) fn form_list(base_url: &str) -> HttpRequest {
    HttpRequest::get(format!("{base_url}/formList"))
}

pub(crate) fn form_xml(base_url: &str, form_id: &str) -> HttpRequest {
    HttpRequest::get(format!("{base_url}/formXml")).with_query(&[("formId", form_id)])
}

pub(crate) fn submission_list(
    base_url: &str,
    form_id: &str,
    cursor: &Cursor,
    num_entries: usize,
    include_incomplete: bool,
) -> HttpRequest {
    let cursor = cursor.value_for_server().unwrap_or_default();
    HttpRequest::get(format!("{base_url}/view/submissionList")).with_query(&[
        ("formId", form_id),
        ("cursor", &cursor),
        ("numEntries", &num_entries.to_string()),
        ("includeIncomplete", if include_incomplete { "true" } else { "false" }),
    ])
}

pub(crate) fn download_submission(
    base_url: &str,
    form_id: &str,
    root_element: &str,
    instance_id: &str,
) -> HttpRequest {
    let key = format!(
        "{form_id}[@version=null and @uiVersion=null]/{root_element}[@key={instance_id}]"
    );
    HttpRequest::get(format!("{base_url}/view/downloadSubmission")).with_query(&[("formId", &key)])
}

pub(crate) fn form_upload(base_url: &str, parts: Vec<MultipartPart>) -> HttpRequest {
    HttpRequest::post(format!("{base_url}/formUpload")).with_multipart(parts)
}

pub(crate) fn submission_upload(base_url: &str, parts: Vec<MultipartPart>) -> HttpRequest {
    HttpRequest::post(format!("{base_url}/submission")).with_multipart(parts)
}

fn text(doc: &XmlDocument, node: fieldsync_model::XmlNodeId, name: &str) -> Option<String> {
    doc.child(node, name)
        .and_then(|n| doc.value(n))
        .map(str::to_string)
}

fn parse(xml: &str, what: &str) -> TransferResult<XmlDocument> {
    XmlDocument::parse(xml).map_err(|e| TransferError::Protocol(format!("invalid {what}: {e}")))
}

/// Parses an OpenRosa `<xforms>` list.
pub(crate) fn parse_form_list(xml: &str) -> TransferResult<Vec<RemoteForm>> {
    let doc = parse(xml, "form list")?;
    let mut forms = Vec::new();
    for xform in doc.children_named(doc.root(), "xform") {
        let Some(form_id) = text(&doc, xform, "formID") else {
            continue;
        };
        let version = text(&doc, xform, "version");
        forms.push(RemoteForm {
            name: text(&doc, xform, "name").unwrap_or_else(|| form_id.clone()),
            key: FormKey::new(form_id, version)?,
            download_url: text(&doc, xform, "downloadUrl"),
            manifest_url: text(&doc, xform, "manifestUrl"),
        });
    }
    Ok(forms)
}

/// Parses a `<manifest>` of `<mediaFile>` entries.
pub(crate) fn parse_manifest(xml: &str) -> TransferResult<Vec<RemoteAttachment>> {
    let doc = parse(xml, "manifest")?;
    Ok(media_files(&doc, doc.root()))
}

fn media_files(doc: &XmlDocument, parent: fieldsync_model::XmlNodeId) -> Vec<RemoteAttachment> {
    doc.children_named(parent, "mediaFile")
        .filter_map(|media| {
            let name = text(doc, media, "filename")?;
            let download_url = text(doc, media, "downloadUrl");
            Some(RemoteAttachment {
                name,
                exists: download_url.is_some(),
                download_url,
                hash: text(doc, media, "hash"),
            })
        })
        .collect()
}

/// One page of an instance id enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IdChunk {
    pub ids: Vec<String>,
    pub cursor: Cursor,
}

/// Parses an `<idChunk>` answer of `view/submissionList`.
pub(crate) fn parse_id_chunk(xml: &str) -> TransferResult<IdChunk> {
    let doc = parse(xml, "submission list")?;
    let root = doc.root();
    let ids = doc
        .child(root, "idList")
        .map(|list| {
            doc.children_named(list, "id")
                .filter_map(|id| doc.value(id).map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let cursor = text(&doc, root, "resumptionCursor")
        .map(|raw| Cursor::from_server(&raw))
        .unwrap_or_default();
    Ok(IdChunk { ids, cursor })
}

/// Parses a `view/downloadSubmission` answer.
pub(crate) fn parse_download(xml: &str) -> TransferResult<DownloadedSubmission> {
    let doc = parse(xml, "submission download")?;
    let root = doc.root();
    let instance = doc
        .child(root, "data")
        .and_then(|data| doc.children(data).next())
        .ok_or_else(|| TransferError::Protocol("submission download has no data".to_string()))?;
    Ok(DownloadedSubmission {
        xml: doc.to_xml_string(instance),
        attachments: media_files(&doc, root),
    })
}
