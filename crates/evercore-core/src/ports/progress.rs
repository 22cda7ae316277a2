//! Progress reporting port
//!
//! Every method has a no-op default so callers only override the stages
//! they care about. The orchestrator calls these with an independent
//! snapshot clone after every update to the corresponding accumulator, so
//! implementations never observe a torn read.

use crate::domain::{DownloadNotesStatus, DownloadResourcesStatus, SendStatus, SyncChunksDataCounters};

pub trait ProgressCallback: Send + Sync {
    fn on_sync_chunks_progress(&self, _counters: &SyncChunksDataCounters) {}
    fn on_download_notes_progress(&self, _status: &DownloadNotesStatus) {}
    fn on_download_resources_progress(&self, _status: &DownloadResourcesStatus) {}
    fn on_send_progress(&self, _status: &SendStatus) {}
}

/// A callback that discards every update, for callers that don't need
/// progress reporting.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressCallback for NoopProgress {}
