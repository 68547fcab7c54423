use crate::decrypt::{Decryptor, NoDecryption};
use crate::tracking::ExportEvent;
use fieldsync_job::{EventSink, NoopSink};
use fieldsync_model::{MetadataPort, Workspace};
use std::sync::Arc;

/// Everything an export needs besides the form and its configuration.
#[derive(Clone)]
pub struct ExportContext {
    pub workspace: Workspace,
    pub store: Arc<dyn MetadataPort>,
    pub decryptor: Arc<dyn Decryptor>,
    pub sink: Arc<dyn EventSink<ExportEvent>>,
}

impl ExportContext {
    /// Creates a context without decryption whose events are discarded.
    pub fn new(workspace: Workspace, store: Arc<dyn MetadataPort>) -> Self {
        Self {
            workspace,
            store,
            decryptor: Arc::new(NoDecryption),
            sink: Arc::new(NoopSink),
        }
    }

    pub fn with_decryptor(mut self, decryptor: Arc<dyn Decryptor>) -> Self {
        self.decryptor = decryptor;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink<ExportEvent>>) -> Self {
        self.sink = sink;
        self
    }
}
