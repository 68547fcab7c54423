//! Remote form servers.
//!
//! [`RemoteServer`] describes where a server is and how to log in; the
//! `aggregate` and `central` modules know each variant's endpoints.
//! [`RemoteClient`] binds a server to an [`HttpClient`] and is what the
//! engines talk to.

pub(crate) mod aggregate;
pub(crate) mod central;

use crate::error::{TransferError, TransferResult};
use crate::http::{Credentials, HttpClient, HttpRequest, HttpResponse};
use async_trait::async_trait;
use fieldsync_model::{FormMetadata, RemoteSource, Workspace};
use fieldsync_types::FormKey;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// A remote form server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteServer {
    /// OpenRosa server with form list, submission list and multipart uploads.
    Aggregate {
        base_url: String,
        credentials: Option<Credentials>,
    },
    /// REST server with projects and bearer-token sessions.
    Central {
        base_url: String,
        project_id: u64,
        credentials: Credentials,
    },
}

impl RemoteServer {
    pub fn aggregate(base_url: impl Into<String>, credentials: Option<Credentials>) -> Self {
        RemoteServer::Aggregate {
            base_url: trim_base(base_url.into()),
            credentials,
        }
    }

    /// A Central server. Basic credentials are exchanged for a session
    /// token; bearer credentials are used as is.
    pub fn central(base_url: impl Into<String>, project_id: u64, credentials: Credentials) -> Self {
        RemoteServer::Central {
            base_url: trim_base(base_url.into()),
            project_id,
            credentials,
        }
    }

    pub fn base_url(&self) -> &str {
        match self {
            RemoteServer::Aggregate { base_url, .. } | RemoteServer::Central { base_url, .. } => {
                base_url
            }
        }
    }

    pub fn is_central(&self) -> bool {
        matches!(self, RemoteServer::Central { .. })
    }

    /// Checks the descriptor before any request is made.
    pub fn validate(&self) -> TransferResult<()> {
        let url = self.base_url();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(TransferError::Config(format!("invalid server url: {url:?}")));
        }
        if let RemoteServer::Central { credentials, .. } = self {
            let missing = match credentials {
                Credentials::Basic { username, password } => {
                    username.trim().is_empty() || password.is_empty()
                }
                Credentials::Bearer(token) => token.trim().is_empty(),
            };
            if missing {
                return Err(TransferError::Config(
                    "central server requires credentials".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for RemoteServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteServer::Aggregate { base_url, .. } => write!(f, "aggregate {base_url}"),
            RemoteServer::Central {
                base_url,
                project_id,
                ..
            } => write!(f, "central {base_url} project {project_id}"),
        }
    }
}

fn trim_base(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// A form advertised by a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteForm {
    pub key: FormKey,
    pub name: String,
    pub download_url: Option<String>,
    pub manifest_url: Option<String>,
}

impl RemoteForm {
    /// Metadata for this form placed in `workspace`.
    pub fn into_metadata(self, workspace: &Workspace) -> FormMetadata {
        let remote = RemoteSource {
            download_url: self.download_url,
            manifest_url: self.manifest_url,
        };
        workspace
            .form_metadata(self.key, &self.name)
            .with_remote(remote)
    }
}

/// An attachment listed by a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAttachment {
    pub name: String,
    /// False when the server lists the file but does not hold its content.
    pub exists: bool,
    pub download_url: Option<String>,
    pub hash: Option<String>,
}

/// A submission document fetched from a server plus its attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedSubmission {
    pub xml: String,
    pub attachments: Vec<RemoteAttachment>,
}

/// Result of an upload that may meet an existing copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Created,
    AlreadyExists,
}

/// Form-level capabilities shared by both server variants.
#[async_trait]
pub trait RemoteFormSource: Send + Sync {
    async fn list_forms(&self) -> TransferResult<Vec<RemoteForm>>;

    async fn form_exists(&self, key: &FormKey) -> TransferResult<bool>;

    /// Returns the form definition document.
    async fn download_form(&self, form: &FormMetadata) -> TransferResult<Vec<u8>>;

    async fn list_form_attachments(
        &self,
        form: &FormMetadata,
    ) -> TransferResult<Vec<RemoteAttachment>>;

    /// Downloads `url` into `target`, creating parent directories.
    async fn download_to(&self, url: &str, target: &Path) -> TransferResult<()>;
}

/// A [`RemoteServer`] bound to an [`HttpClient`].
pub struct RemoteClient {
    server: RemoteServer,
    http: Arc<dyn HttpClient>,
    token: RwLock<Option<String>>,
}

impl RemoteClient {
    /// Validates the server descriptor and binds it.
    pub fn new(server: RemoteServer, http: Arc<dyn HttpClient>) -> TransferResult<Self> {
        server.validate()?;
        Ok(Self {
            server,
            http,
            token: RwLock::new(None),
        })
    }

    pub fn server(&self) -> &RemoteServer {
        &self.server
    }

    pub fn max_connections(&self) -> usize {
        self.http.max_connections().max(1)
    }

    /// Returns the Central session token, logging in on first use.
    async fn session_token(&self) -> TransferResult<String> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        let RemoteServer::Central {
            base_url,
            credentials,
            ..
        } = &self.server
        else {
            return Err(TransferError::Unsupported(
                "session tokens are a central feature".to_string(),
            ));
        };
        let token = match credentials {
            Credentials::Bearer(token) => token.clone(),
            Credentials::Basic { username, password } => {
                debug!("logging in to {}", base_url);
                let response = self
                    .http
                    .execute(central::login(base_url, username, password))
                    .await?
                    .into_success()?;
                response.json::<central::Session>()?.token
            }
        };
        *self.token.write().await = Some(token.clone());
        Ok(token)
    }

    /// Authenticates and executes a request without classifying the status.
    pub async fn send(&self, request: HttpRequest) -> TransferResult<HttpResponse> {
        let request = match &self.server {
            RemoteServer::Aggregate { credentials, .. } => {
                request.with_credentials(credentials.clone())
            }
            RemoteServer::Central { .. } => {
                let token = self.session_token().await?;
                request.with_credentials(Some(Credentials::Bearer(token)))
            }
        };
        let response = self.http.execute(request).await?;
        if self.server.is_central() && response.is_unauthorized() {
            // Expired sessions are renewed on the next call.
            *self.token.write().await = None;
        }
        Ok(response)
    }

    /// Executes a request and fails on any non-success status.
    pub async fn fetch(&self, request: HttpRequest) -> TransferResult<HttpResponse> {
        self.send(request).await?.into_success()
    }

    /// Executes an upload, mapping 409 to [`UploadOutcome::AlreadyExists`].
    pub async fn upload(&self, request: HttpRequest) -> TransferResult<UploadOutcome> {
        let response = self.send(request).await?;
        if response.is_conflict() {
            return Ok(UploadOutcome::AlreadyExists);
        }
        response.into_success()?;
        Ok(UploadOutcome::Created)
    }

    /// Instance ids Central holds for a form.
    pub async fn central_instance_ids(&self, key: &FormKey) -> TransferResult<Vec<String>> {
        let RemoteServer::Central {
            base_url,
            project_id,
            ..
        } = &self.server
        else {
            return Err(TransferError::Unsupported(
                "full instance listing is a central feature".to_string(),
            ));
        };
        let response = self
            .fetch(central::submission_list(base_url, *project_id, key.id()))
            .await?;
        let submissions: Vec<central::CentralSubmission> = response.json()?;
        Ok(submissions.into_iter().map(|s| s.instance_id).collect())
    }

    /// One page of Aggregate's cursor-driven instance id enumeration.
    pub(crate) async fn aggregate_id_chunk(
        &self,
        key: &FormKey,
        cursor: &fieldsync_types::Cursor,
        num_entries: usize,
        include_incomplete: bool,
    ) -> TransferResult<aggregate::IdChunk> {
        let RemoteServer::Aggregate { base_url, .. } = &self.server else {
            return Err(TransferError::Unsupported(
                "cursor enumeration is an aggregate feature".to_string(),
            ));
        };
        let response = self
            .fetch(aggregate::submission_list(
                base_url,
                key.id(),
                cursor,
                num_entries,
                include_incomplete,
            ))
            .await?;
        aggregate::parse_id_chunk(&response.text())
    }

    /// Fetches one submission and the list of its attachments.
    ///
    /// `root_element` is the form's instance root name, which Aggregate
    /// needs to address the submission.
    pub async fn download_submission(
        &self,
        key: &FormKey,
        root_element: &str,
        instance_id: &str,
    ) -> TransferResult<DownloadedSubmission> {
        match &self.server {
            RemoteServer::Aggregate { base_url, .. } => {
                let response = self
                    .fetch(aggregate::download_submission(
                        base_url,
                        key.id(),
                        root_element,
                        instance_id,
                    ))
                    .await?;
                aggregate::parse_download(&response.text())
            }
            RemoteServer::Central {
                base_url,
                project_id,
                ..
            } => {
                let xml = self
                    .fetch(central::submission_xml(
                        base_url,
                        *project_id,
                        key.id(),
                        instance_id,
                    ))
                    .await?
                    .text();
                let listed: Vec<central::CentralAttachment> = self
                    .fetch(central::submission_attachments(
                        base_url,
                        *project_id,
                        key.id(),
                        instance_id,
                    ))
                    .await?
                    .json()?;
                let attachments = listed
                    .into_iter()
                    .map(|a| {
                        let url = central::submission_attachment_url(
                            base_url,
                            *project_id,
                            key.id(),
                            instance_id,
                            &a.name,
                        );
                        a.into_remote(url)
                    })
                    .collect();
                Ok(DownloadedSubmission { xml, attachments })
            }
        }
    }
}

#[async_trait]
impl RemoteFormSource for RemoteClient {
    async fn list_forms(&self) -> TransferResult<Vec<RemoteForm>> {
        let forms = match &self.server {
            RemoteServer::Aggregate { base_url, .. } => {
                let response = self.fetch(aggregate::form_list(base_url)).await?;
                aggregate::parse_form_list(&response.text())?
            }
            RemoteServer::Central {
                base_url,
                project_id,
                ..
            } => {
                let response = self.fetch(central::form_list(base_url, *project_id)).await?;
                let listed: Vec<central::CentralForm> = response.json()?;
                listed
                    .into_iter()
                    .map(|form| {
                        let version = form.version.filter(|v| !v.is_empty());
                        Ok(RemoteForm {
                            name: form.name.unwrap_or_else(|| form.xml_form_id.clone()),
                            key: FormKey::new(form.xml_form_id, version)?,
                            download_url: None,
                            manifest_url: None,
                        })
                    })
                    .collect::<TransferResult<Vec<_>>>()?
            }
        };
        info!("{} lists {} forms", self.server, forms.len());
        Ok(forms)
    }

    async fn form_exists(&self, key: &FormKey) -> TransferResult<bool> {
        match &self.server {
            RemoteServer::Aggregate { .. } => Ok(self
                .list_forms()
                .await?
                .iter()
                .any(|form| form.key.id() == key.id())),
            RemoteServer::Central {
                base_url,
                project_id,
                ..
            } => {
                let response = self
                    .send(central::form_exists(base_url, *project_id, key.id()))
                    .await?;
                if response.is_not_found() {
                    return Ok(false);
                }
                response.into_success()?;
                Ok(true)
            }
        }
    }

    async fn download_form(&self, form: &FormMetadata) -> TransferResult<Vec<u8>> {
        let request = match &self.server {
            RemoteServer::Aggregate { base_url, .. } => {
                match form.remote.as_ref().and_then(|r| r.download_url.as_ref()) {
                    Some(url) => HttpRequest::get(url.clone()),
                    None => aggregate::form_xml(base_url, form.key.id()),
                }
            }
            RemoteServer::Central {
                base_url,
                project_id,
                ..
            } => central::form_xml(base_url, *project_id, form.key.id(), form.key.version()),
        };
        Ok(self.fetch(request).await?.body)
    }

    async fn list_form_attachments(
        &self,
        form: &FormMetadata,
    ) -> TransferResult<Vec<RemoteAttachment>> {
        match &self.server {
            RemoteServer::Aggregate { .. } => {
                let Some(manifest_url) = form.remote.as_ref().and_then(|r| r.manifest_url.clone())
                else {
                    return Ok(Vec::new());
                };
                let response = self.fetch(HttpRequest::get(manifest_url)).await?;
                aggregate::parse_manifest(&response.text())
            }
            RemoteServer::Central {
                base_url,
                project_id,
                ..
            } => {
                let listed: Vec<central::CentralAttachment> = self
                    .fetch(central::form_attachments(base_url, *project_id, form.key.id()))
                    .await?
                    .json()?;
                Ok(listed
                    .into_iter()
                    .map(|a| {
                        let url = central::form_attachment_url(
                            base_url,
                            *project_id,
                            form.key.id(),
                            &a.name,
                        );
                        a.into_remote(url)
                    })
                    .collect())
            }
        }
    }

    async fn download_to(&self, url: &str, target: &Path) -> TransferResult<()> {
        let response = self.fetch(HttpRequest::get(url)).await?;
        if let Some(dir) = target.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(target, &response.body).await?;
        Ok(())
    }
}
