//! Shared fixtures for transfer tests.

#![allow(dead_code)]

use fieldsync_job::RecordingSink;
use fieldsync_model::{FormMetadata, InMemoryMetadataStore, Workspace};
use fieldsync_transfer::{
    HttpConfig, RemoteClient, RemoteServer, ReqwestHttpClient, TransferContext, TransferEvent,
    TransferSummary,
};
use fieldsync_types::FormKey;
use std::path::PathBuf;
use std::sync::{Arc, Once};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

pub const SIMPLE_FORM: &str = r#"<?xml version="1.0"?>
<h:html xmlns="http://www.w3.org/2002/xforms" xmlns:h="http://www.w3.org/1999/xhtml" xmlns:orx="http://openrosa.org/xforms">
  <h:head>
    <h:title>Simple</h:title>
    <model>
      <instance>
        <data id="simple" version="1">
          <name/>
          <photo/>
          <orx:meta><orx:instanceID/></orx:meta>
        </data>
      </instance>
      <bind nodeset="/data/name" type="string"/>
      <bind nodeset="/data/photo" type="binary"/>
    </model>
  </h:head>
  <h:body>
    <input ref="/data/name"/>
    <upload ref="/data/photo" mediatype="image/*"/>
  </h:body>
</h:html>"#;

pub fn simple_key() -> FormKey {
    FormKey::new("simple", Some("1".to_string())).unwrap()
}

/// A submission document of the simple form.
pub fn submission_xml(instance_id: &str) -> String {
    format!(
        r#"<data xmlns:orx="http://openrosa.org/xforms" id="simple" version="1" instanceID="{instance_id}" submissionDate="2024-01-01T10:00:00.000Z"><name>{instance_id}</name><photo/><orx:meta><orx:instanceID>{instance_id}</orx:instanceID></orx:meta></data>"#
    )
}

static TRACING: Once = Once::new();

/// Routes engine logs to the test output; `RUST_LOG=debug` shows requests.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub struct Fixture {
    pub dir: TempDir,
    pub workspace: Workspace,
    pub store: Arc<InMemoryMetadataStore>,
    pub sink: Arc<RecordingSink<TransferEvent>>,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        Self {
            dir,
            workspace,
            store: Arc::new(InMemoryMetadataStore::new()),
            sink: Arc::new(RecordingSink::new()),
        }
    }

    pub fn context(&self, server: RemoteServer) -> TransferContext {
        let http = ReqwestHttpClient::new(HttpConfig::default().with_max_connections(4)).unwrap();
        let remote = RemoteClient::new(server, Arc::new(http)).unwrap();
        TransferContext::new(Arc::new(remote), self.workspace.clone(), self.store.clone())
            .with_sink(self.sink.clone())
    }

    /// Metadata for the simple form without writing anything.
    pub fn simple_form(&self) -> FormMetadata {
        self.workspace.form_metadata(simple_key(), "Simple")
    }

    /// Metadata for the simple form with its definition on disk.
    pub fn installed_form(&self) -> FormMetadata {
        let form = self.simple_form();
        write(&form.form_file, SIMPLE_FORM.as_bytes());
        form
    }

    /// Stores a submission (and optional attachments) for `form`.
    pub fn add_submission(
        &self,
        form: &FormMetadata,
        instance_id: &str,
        attachments: &[(&str, usize)],
    ) -> PathBuf {
        let file = form.submission_file(instance_id);
        write(&file, submission_xml(instance_id).as_bytes());
        for (name, size) in attachments {
            write(&form.submission_dir(instance_id).join(name), &vec![7u8; *size]);
        }
        file
    }

    pub fn events(&self) -> Vec<TransferEvent> {
        self.sink.events()
    }

    pub fn errors(&self) -> Vec<TransferEvent> {
        self.events().into_iter().filter(|e| e.is_error()).collect()
    }

    /// Summary carried by the last completion event.
    pub fn summary(&self) -> TransferSummary {
        self.events()
            .into_iter()
            .rev()
            .find_map(|e| match e {
                TransferEvent::Completed { summary, .. } => Some(summary),
                _ => None,
            })
            .expect("no completion event")
    }

    pub fn count(&self, pred: impl Fn(&TransferEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

pub fn write(path: &std::path::Path, contents: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}
