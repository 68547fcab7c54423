//! Central REST endpoints and JSON shapes.

use super::RemoteAttachment;
use crate::http::HttpRequest;
use serde::Deserialize;

fn enc(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

fn project(base_url: &str, project_id: u64) -> String {
    format!("{base_url}/v1/projects/{project_id}")
}

fn form(base_url: &str, project_id: u64, form_id: &str) -> String {
    format!("{}/forms/{}", project(base_url, project_id), enc(form_id))
}

fn submission(base_url: &str, project_id: u64, form_id: &str, instance_id: &str) -> String {
    format!(
        "{}/submissions/{}",
        form(base_url, project_id, form_id),
        enc(instance_id)
    )
}

pub(crate) fn login(base_url: &str, email: &str, password: &str) -> HttpRequest {
    HttpRequest::post(format!("{base_url}/v1/sessions")).with_json(serde_json::json!({
        "email": email,
        "password": password,
    }))
}

pub(crate) fn form_list(base_url: &str, project_id: u64) -> HttpRequest {
    HttpRequest::get(format!("{}/forms", project(base_url, project_id)))
}

pub(crate) fn form_exists(base_url: &str, project_id: u64, form_id: &str) -> HttpRequest {
    HttpRequest::get(form(base_url, project_id, form_id))
}

pub(crate) fn form_xml(
    base_url: &str,
    project_id: u64,
    form_id: &str,
    version: Option<&str>,
) -> HttpRequest {
    let url = match version {
        Some(version) => format!(
            "{}/versions/{}.xml",
            form(base_url, project_id, form_id),
            enc(version)
        ),
        None => format!("{}.xml", form(base_url, project_id, form_id)),
    };
    HttpRequest::get(url)
}

pub(crate) fn form_attachments(base_url: &str, project_id: u64, form_id: &str) -> HttpRequest {
    HttpRequest::get(format!("{}/attachments", form(base_url, project_id, form_id)))
}

pub(crate) fn form_attachment_url(
    base_url: &str,
    project_id: u64,
    form_id: &str,
    name: &str,
) -> String {
    format!(
        "{}/attachments/{}",
        form(base_url, project_id, form_id),
        enc(name)
    )
}

pub(crate) fn submission_list(base_url: &str, project_id: u64, form_id: &str) -> HttpRequest {
    HttpRequest::get(format!("{}/submissions", form(base_url, project_id, form_id)))
}

pub(crate) fn submission_xml(
    base_url: &str,
    project_id: u64,
    form_id: &str,
    instance_id: &str,
) -> HttpRequest {
    HttpRequest::get(format!(
        "{}.xml",
        submission(base_url, project_id, form_id, instance_id)
    ))
}

pub(crate) fn submission_attachments(
    base_url: &str,
    project_id: u64,
    form_id: &str,
    instance_id: &str,
) -> HttpRequest {
    HttpRequest::get(format!(
        "{}/attachments",
        submission(base_url, project_id, form_id, instance_id)
    ))
}

pub(crate) fn submission_attachment_url(
    base_url: &str,
    project_id: u64,
    form_id: &str,
    instance_id: &str,
    name: &str,
) -> String {
    format!(
        "{}/attachments/{}",
        submission(base_url, project_id, form_id, instance_id),
        enc(name)
    )
}

pub(crate) fn form_upload(base_url: &str, project_id: u64, xml: Vec<u8>) -> HttpRequest {
    HttpRequest::post(format!("{}/forms", project(base_url, project_id)))
        .with_query(&[("ignoreWarnings", "true"), ("publish", "false")])
        .with_bytes("application/xml", xml)
}

pub(crate) fn draft_attachment_upload(
    base_url: &str,
    project_id: u64,
    form_id: &str,
    name: &str,
    content_type: &str,
    data: Vec<u8>,
) -> HttpRequest {
    HttpRequest::post(format!(
        "{}/draft/attachments/{}",
        form(base_url, project_id, form_id),
        enc(name)
    ))
    .with_bytes(content_type, data)
}

pub(crate) fn draft_publish(base_url: &str, project_id: u64, form_id: &str) -> HttpRequest {
    HttpRequest::post(format!("{}/draft/publish", form(base_url, project_id, form_id)))
}

pub(crate) fn submission_upload(
    base_url: &str,
    project_id: u64,
    form_id: &str,
    xml: Vec<u8>,
) -> HttpRequest {
    HttpRequest::post(format!("{}/submissions", form(base_url, project_id, form_id)))
        .with_bytes("application/xml", xml)
}

pub(crate) fn submission_attachment_upload(
    base_url: &str,
    project_id: u64,
    form_id: &str,
    instance_id: &str,
    name: &str,
    content_type: &str,
    data: Vec<u8>,
) -> HttpRequest {
    HttpRequest::post(submission_attachment_url(
        base_url,
        project_id,
        form_id,
        instance_id,
        name,
    ))
    .with_bytes(content_type, data)
}

#[derive(Debug, Deserialize)]
pub(crate) struct Session {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CentralForm {
    pub xml_form_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CentralAttachment {
    pub name: String,
    /// A missing flag means the server has no content for it.
    #[serde(default)]
    pub exists: bool,
}

impl CentralAttachment {
    pub(crate) fn into_remote(self, download_url: String) -> RemoteAttachment {
        RemoteAttachment {
            name: self.name,
            exists: self.exists,
            download_url: Some(download_url),
            hash: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CentralSubmission {
    pub instance_id: String,
}
