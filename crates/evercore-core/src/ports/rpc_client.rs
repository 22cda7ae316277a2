//! Note store / user store RPC client port
//!
//! One `RpcClient` is bound to a single note-store endpoint (the user's own,
//! or one linked notebook's). The downloader and sender never talk to the
//! network directly; they only ever call through this trait, which is why
//! its methods return [`CoreResult`] rather than `anyhow::Result` - callers
//! need to distinguish per-item [`ProtocolError`](crate::error::ProtocolError)
//! failures from the fatal ones.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Guid, LinkedNotebook, Note, Notebook, Resource, SavedSearch, SyncChunk, Tag, Usn};
use crate::error::CoreResult;
use crate::ports::local_store::NoteFetchOptions;

/// Which entity kinds a sync-chunk request should populate. The real wire
/// protocol also controls `include_notebooks`/`include_tags`/etc
/// independently from `max_entries`; this struct carries that distinction
/// through the port boundary.
#[derive(Debug, Clone, Copy)]
pub struct RpcSyncChunkFilter {
    pub include_notebooks: bool,
    pub include_tags: bool,
    pub include_saved_searches: bool,
    pub include_linked_notebooks: bool,
    pub include_notes: bool,
    pub include_resources: bool,
    pub include_expunged: bool,
    pub note_fetch: NoteFetchOptions,
}

impl Default for RpcSyncChunkFilter {
    fn default() -> Self {
        Self {
            include_notebooks: true,
            include_tags: true,
            include_saved_searches: true,
            include_linked_notebooks: true,
            include_notes: true,
            include_resources: true,
            include_expunged: true,
            note_fetch: NoteFetchOptions::metadata_only(),
        }
    }
}

/// Response to a `getSyncState` call: the scope's current high-water-mark
/// USN, server time, and whether a full resync is required.
#[derive(Debug, Clone, Copy)]
pub struct RpcSyncState {
    pub update_count: i32,
    pub current_time: DateTime<Utc>,
    /// True when the server requires a full resync (e.g. after account
    /// migration); the downloader must discard any stored USN for this
    /// scope and start from zero.
    pub full_sync_before: bool,
}

/// Authentication material returned by `authenticate_to_shared_notebook`,
/// distinct from [`crate::domain::LinkedNotebookAuthInfo`] because at this
/// layer the linked notebook's guid is the caller's concern, not the RPC
/// response's.
#[derive(Debug, Clone)]
pub struct SharedNotebookAuth {
    pub auth_token: String,
    pub shard_id: String,
    pub note_store_url: String,
    pub web_api_url_prefix: String,
    pub expiration_time: DateTime<Utc>,
}

/// Port for one note-store endpoint's RPC surface.
#[async_trait]
pub trait RpcClient: Send + Sync {
    async fn get_sync_state(&self) -> CoreResult<RpcSyncState>;

    async fn get_filtered_sync_chunk(
        &self,
        after_usn: Usn,
        max_entries: u32,
        filter: &RpcSyncChunkFilter,
    ) -> CoreResult<SyncChunk>;

    async fn get_linked_notebook_sync_state(
        &self,
        linked_notebook: &LinkedNotebook,
    ) -> CoreResult<RpcSyncState>;

    async fn get_linked_notebook_sync_chunk(
        &self,
        linked_notebook: &LinkedNotebook,
        after_usn: Usn,
        max_entries: u32,
        filter: &RpcSyncChunkFilter,
    ) -> CoreResult<SyncChunk>;

    async fn authenticate_to_shared_notebook(
        &self,
        shared_notebook_global_id: &str,
    ) -> CoreResult<SharedNotebookAuth>;

    async fn create_notebook(&self, notebook: &Notebook) -> CoreResult<Notebook>;
    async fn update_notebook(&self, notebook: &Notebook) -> CoreResult<Usn>;

    async fn create_tag(&self, tag: &Tag) -> CoreResult<Tag>;
    async fn update_tag(&self, tag: &Tag) -> CoreResult<Usn>;

    async fn create_saved_search(&self, search: &SavedSearch) -> CoreResult<SavedSearch>;
    async fn update_saved_search(&self, search: &SavedSearch) -> CoreResult<Usn>;

    async fn create_note(&self, note: &Note) -> CoreResult<Note>;
    async fn update_note(&self, note: &Note) -> CoreResult<Usn>;
    async fn get_note_with_result_spec(
        &self,
        guid: &Guid,
        options: NoteFetchOptions,
    ) -> CoreResult<Note>;

    async fn get_resource(&self, guid: &Guid, with_binary_data: bool) -> CoreResult<Resource>;
}
