//! Synchronized entity kinds: notebooks, tags, saved searches, linked
//! notebooks, notes and resources, plus the sync-chunk bundle the server
//! returns them in.
//!
//! Every entity carries an optional server `guid`, a mandatory `local_id`,
//! an `update_sequence_number` (absent until the entity has been uploaded
//! at least once), a `locally_modified` bit and a `local_only` bit. Parent
//! relations are expressed as `(local_id, Option<guid>)` pairs via
//! [`EntityRef`](super::newtypes::EntityRef).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{Guid, LocalId, Usn};

/// A notebook: the container a note belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    pub local_id: LocalId,
    pub guid: Option<Guid>,
    pub update_sequence_number: Option<Usn>,
    pub name: String,
    pub locally_modified: bool,
    pub local_only: bool,
    pub is_default: bool,
    /// Set when this notebook was downloaded as part of a linked notebook's
    /// sync chunk rather than the user's own data; `None` for user-owned
    /// notebooks. `NoteStoreProvider` uses this to resolve which note store
    /// a notebook's (and transitively a note's) RPC calls belong to.
    pub owning_linked_notebook_guid: Option<Guid>,
}

impl Notebook {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            local_id: LocalId::new(),
            guid: None,
            update_sequence_number: None,
            name: name.into(),
            locally_modified: true,
            local_only: false,
            is_default: false,
            owning_linked_notebook_guid: None,
        }
    }

    /// A notebook that has never been uploaded has no `update_sequence_number`.
    pub fn is_new(&self) -> bool {
        self.update_sequence_number.is_none()
    }

    pub fn is_linked(&self) -> bool {
        self.owning_linked_notebook_guid.is_some()
    }
}

/// A tag. Tags form a forest by `parent_tag_local_id`; at most one parent,
/// and the parent-child relation is acyclic per account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub local_id: LocalId,
    pub guid: Option<Guid>,
    pub update_sequence_number: Option<Usn>,
    pub name: String,
    pub parent_tag_local_id: Option<LocalId>,
    pub parent_tag_guid: Option<Guid>,
    pub locally_modified: bool,
    pub local_only: bool,
    /// Set when this tag was downloaded as part of a linked notebook's sync
    /// chunk rather than the user's own data; `None` for user-owned tags.
    /// Used by the stale-tag cleanup step (§4.4 step 7) to scope the search
    /// for tags that no longer have any notes referencing them.
    pub owning_linked_notebook_guid: Option<Guid>,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            local_id: LocalId::new(),
            guid: None,
            update_sequence_number: None,
            name: name.into(),
            parent_tag_local_id: None,
            parent_tag_guid: None,
            locally_modified: true,
            local_only: false,
            owning_linked_notebook_guid: None,
        }
    }

    pub fn is_new(&self) -> bool {
        self.update_sequence_number.is_none()
    }

    pub fn is_linked(&self) -> bool {
        self.owning_linked_notebook_guid.is_some()
    }
}

/// A saved search (a stored query). Independent of every other entity kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSearch {
    pub local_id: LocalId,
    pub guid: Option<Guid>,
    pub update_sequence_number: Option<Usn>,
    pub name: String,
    pub query: String,
    pub locally_modified: bool,
    pub local_only: bool,
}

impl SavedSearch {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            local_id: LocalId::new(),
            guid: None,
            update_sequence_number: None,
            name: name.into(),
            query: query.into(),
            locally_modified: true,
            local_only: false,
        }
    }

    pub fn is_new(&self) -> bool {
        self.update_sequence_number.is_none()
    }
}

/// A notebook owned by another account, shared into this one. Authenticated
/// and served separately; may use a different note-store endpoint than the
/// user's own data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedNotebook {
    pub local_id: LocalId,
    pub guid: Option<Guid>,
    pub update_sequence_number: Option<Usn>,
    pub share_name: String,
    /// Empty when this is a public notebook accessed via `uri` instead.
    pub shared_notebook_global_id: String,
    /// Present only for public notebooks.
    pub uri: Option<String>,
    pub shard_id: Option<String>,
    pub note_store_url: Option<String>,
    pub locally_modified: bool,
    pub local_only: bool,
}

impl LinkedNotebook {
    /// §4.2 public-notebook fast path: no shared-notebook global id, but a
    /// `uri` is set.
    pub fn is_public(&self) -> bool {
        self.shared_notebook_global_id.is_empty() && self.uri.is_some()
    }
}

/// A note. Exactly one notebook owner, expressed as a `(local_id,
/// Option<guid>)` pair so the upload pipeline can backfill the notebook
/// guid once the notebook has been synced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub local_id: LocalId,
    pub guid: Option<Guid>,
    pub update_sequence_number: Option<Usn>,
    pub title: String,
    pub content: String,
    pub notebook_local_id: LocalId,
    pub notebook_guid: Option<Guid>,
    pub tag_local_ids: Vec<LocalId>,
    pub tag_guids: Vec<Guid>,
    pub resource_local_ids: Vec<LocalId>,
    pub locally_modified: bool,
    pub local_only: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Note {
    pub fn new(title: impl Into<String>, notebook_local_id: LocalId) -> Self {
        let now = Utc::now();
        Self {
            local_id: LocalId::new(),
            guid: None,
            update_sequence_number: None,
            title: title.into(),
            content: String::new(),
            notebook_local_id,
            notebook_guid: None,
            tag_local_ids: Vec::new(),
            tag_guids: Vec::new(),
            resource_local_ids: Vec::new(),
            locally_modified: true,
            local_only: false,
            created: now,
            updated: now,
        }
    }

    pub fn is_new(&self) -> bool {
        self.update_sequence_number.is_none()
    }
}

/// A note attachment (image, PDF, audio, etc.). Belongs to exactly one note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub local_id: LocalId,
    pub guid: Option<Guid>,
    pub update_sequence_number: Option<Usn>,
    pub note_local_id: LocalId,
    pub note_guid: Option<Guid>,
    pub mime: String,
    /// Binary data is only populated when fetched `WithResourceBinaryData`;
    /// absent otherwise.
    pub data: Option<Vec<u8>>,
    pub data_size: u64,
    pub data_hash: Option<String>,
    pub locally_modified: bool,
    pub local_only: bool,
}

impl Resource {
    pub fn new(note_local_id: LocalId, mime: impl Into<String>) -> Self {
        Self {
            local_id: LocalId::new(),
            guid: None,
            update_sequence_number: None,
            note_local_id,
            note_guid: None,
            mime: mime.into(),
            data: None,
            data_size: 0,
            data_hash: None,
            locally_modified: true,
            local_only: false,
        }
    }

    pub fn is_new(&self) -> bool {
        self.update_sequence_number.is_none()
    }
}

/// A server-returned bundle of entity deltas within a USN range, plus
/// expunge lists and the chunk's high-water-mark USN. Consumed, then
/// discarded - nothing in this crate holds onto a `SyncChunk` past the
/// processing pass that consumes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncChunk {
    pub chunk_high_usn: Option<Usn>,
    pub current_time: DateTime<Utc>,
    pub notebooks: Vec<Notebook>,
    pub tags: Vec<Tag>,
    pub saved_searches: Vec<SavedSearch>,
    pub linked_notebooks: Vec<LinkedNotebook>,
    pub notes: Vec<Note>,
    pub resources: Vec<Resource>,
    pub expunged_notebooks: Vec<Guid>,
    pub expunged_tags: Vec<Guid>,
    pub expunged_saved_searches: Vec<Guid>,
    pub expunged_linked_notebooks: Vec<Guid>,
    pub expunged_notes: Vec<Guid>,
}

impl SyncChunk {
    pub fn is_empty(&self) -> bool {
        self.notebooks.is_empty()
            && self.tags.is_empty()
            && self.saved_searches.is_empty()
            && self.linked_notebooks.is_empty()
            && self.notes.is_empty()
            && self.resources.is_empty()
            && self.expunged_notebooks.is_empty()
            && self.expunged_tags.is_empty()
            && self.expunged_saved_searches.is_empty()
            && self.expunged_linked_notebooks.is_empty()
            && self.expunged_notes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entities_have_no_usn() {
        assert!(Notebook::new("Inbox").is_new());
        assert!(Tag::new("work").is_new());
        assert!(SavedSearch::new("q", "tag:important").is_new());
        assert!(Note::new("Hello", LocalId::new()).is_new());
        assert!(Resource::new(LocalId::new(), "image/png").is_new());
    }

    #[test]
    fn public_linked_notebook_detection() {
        let mut ln = LinkedNotebook {
            local_id: LocalId::new(),
            guid: Some(Guid::new("ln1").unwrap()),
            update_sequence_number: None,
            share_name: "Shared".into(),
            shared_notebook_global_id: String::new(),
            uri: Some("public-uri".into()),
            shard_id: None,
            note_store_url: None,
            locally_modified: false,
            local_only: false,
        };
        assert!(ln.is_public());

        ln.shared_notebook_global_id = "gid1".into();
        assert!(!ln.is_public());
    }

    #[test]
    fn empty_sync_chunk() {
        assert!(SyncChunk::default().is_empty());
    }
}
