use crate::server::RemoteClient;
use crate::tracking::TransferEvent;
use fieldsync_job::{EventSink, NoopSink};
use fieldsync_model::{MetadataPort, Workspace};
use std::sync::Arc;

/// Everything a pull or push needs besides the form itself.
#[derive(Clone)]
pub struct TransferContext {
    pub remote: Arc<RemoteClient>,
    pub workspace: Workspace,
    pub store: Arc<dyn MetadataPort>,
    pub sink: Arc<dyn EventSink<TransferEvent>>,
}

impl TransferContext {
    /// Creates a context whose events are discarded.
    pub fn new(remote: Arc<RemoteClient>, workspace: Workspace, store: Arc<dyn MetadataPort>) -> Self {
        Self {
            remote,
            workspace,
            store,
            sink: Arc::new(NoopSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink<TransferEvent>>) -> Self {
        self.sink = sink;
        self
    }
}
