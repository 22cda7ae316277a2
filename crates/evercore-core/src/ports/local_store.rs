//! Local persistence port
//!
//! The on-device store for every synchronized entity kind. Implementations
//! own transactionality; each `put_*`/`expunge_*` call commits independently
//! unless a caller batches through `anyhow::Result` error propagation to
//! abort earlier calls in the same logical batch (the reference adapter
//! wraps each call in its own SQLite transaction).

use async_trait::async_trait;

use crate::domain::{Guid, LinkedNotebook, LocalId, Note, Notebook, Resource, SavedSearch, Tag};

/// Controls which related data a `find_note`/`list_notes` call hydrates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoteFetchOptions {
    pub with_resource_metadata: bool,
    pub with_resource_binary_data: bool,
}

impl NoteFetchOptions {
    pub const fn metadata_only() -> Self {
        Self {
            with_resource_metadata: false,
            with_resource_binary_data: false,
        }
    }

    pub const fn with_resource_metadata() -> Self {
        Self {
            with_resource_metadata: true,
            with_resource_binary_data: false,
        }
    }

    pub const fn with_resource_binary_data() -> Self {
        Self {
            with_resource_metadata: true,
            with_resource_binary_data: true,
        }
    }
}

/// Filters applied by `list_notes`.
#[derive(Debug, Clone, Default)]
pub struct NoteListOptions {
    /// Only notes with `locally_modified == true`, used by the sender to
    /// find upload candidates.
    pub locally_modified_only: bool,
    /// Exclude notes with `local_only == true`, used by the sender since
    /// local-only notes never leave the device.
    pub exclude_local_only: bool,
    /// Restrict to one notebook, used when rebuilding a single scope.
    pub notebook_local_id: Option<LocalId>,
    pub fetch: NoteFetchOptions,
}

/// Port for on-device persistence of every synchronized entity kind.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn put_notebook(&self, notebook: &Notebook) -> anyhow::Result<()>;
    async fn find_notebook(&self, local_id: LocalId) -> anyhow::Result<Option<Notebook>>;
    async fn find_notebook_by_guid(&self, guid: &Guid) -> anyhow::Result<Option<Notebook>>;
    async fn list_notebooks(&self) -> anyhow::Result<Vec<Notebook>>;
    async fn expunge_notebook(&self, guid: &Guid) -> anyhow::Result<()>;

    async fn put_tag(&self, tag: &Tag) -> anyhow::Result<()>;
    async fn find_tag(&self, local_id: LocalId) -> anyhow::Result<Option<Tag>>;
    async fn find_tag_by_guid(&self, guid: &Guid) -> anyhow::Result<Option<Tag>>;
    async fn list_tags(&self) -> anyhow::Result<Vec<Tag>>;
    async fn expunge_tag(&self, guid: &Guid) -> anyhow::Result<()>;

    async fn put_saved_search(&self, search: &SavedSearch) -> anyhow::Result<()>;
    async fn find_saved_search(&self, local_id: LocalId) -> anyhow::Result<Option<SavedSearch>>;
    async fn list_saved_searches(&self) -> anyhow::Result<Vec<SavedSearch>>;
    async fn expunge_saved_search(&self, guid: &Guid) -> anyhow::Result<()>;

    async fn put_linked_notebook(&self, linked_notebook: &LinkedNotebook) -> anyhow::Result<()>;
    async fn find_linked_notebook(&self, local_id: LocalId) -> anyhow::Result<Option<LinkedNotebook>>;
    async fn find_linked_notebook_by_guid(&self, guid: &Guid) -> anyhow::Result<Option<LinkedNotebook>>;
    async fn list_linked_notebooks(&self) -> anyhow::Result<Vec<LinkedNotebook>>;
    async fn expunge_linked_notebook(&self, guid: &Guid) -> anyhow::Result<()>;

    async fn put_note(&self, note: &Note) -> anyhow::Result<()>;
    async fn find_note(
        &self,
        local_id: LocalId,
        options: NoteFetchOptions,
    ) -> anyhow::Result<Option<Note>>;
    async fn find_note_by_guid(
        &self,
        guid: &Guid,
        options: NoteFetchOptions,
    ) -> anyhow::Result<Option<Note>>;
    async fn list_notes(&self, options: NoteListOptions) -> anyhow::Result<Vec<Note>>;
    async fn expunge_note(&self, guid: &Guid) -> anyhow::Result<()>;

    async fn put_resource(&self, resource: &Resource) -> anyhow::Result<()>;
    async fn find_resource(
        &self,
        local_id: LocalId,
        with_binary_data: bool,
    ) -> anyhow::Result<Option<Resource>>;
    async fn list_resources_for_note(&self, note_local_id: LocalId) -> anyhow::Result<Vec<Resource>>;
}
