//! Stale-data cleanup run after a full sync, and linked-notebook tag
//! garbage collection run after every cycle (§4.4 steps 1.a and 7).
//!
//! Neither of these is an external collaborator in the sense of §6: both
//! operate purely in terms of [`LocalStore`], so they are plain structs
//! here rather than another port trait - tests substitute a fake
//! `LocalStore`, same as everywhere else.

use std::collections::HashSet;
use std::sync::Arc;

use evercore_core::domain::Guid;
use evercore_core::ports::local_store::{NoteFetchOptions, NoteListOptions};
use evercore_core::ports::LocalStore;
use tracing::{debug, warn};

use crate::scope::SyncScope;

/// Expunges local-store entities that have a server guid, are not
/// `locally_modified`, belong to `scope`, and were not among the guids
/// `preserved_guids` collected from the chunks of the full sync that just
/// completed (§8 property 3, §9 open question on streaming variants).
pub struct FullSyncStaleDataExpunger {
    local_store: Arc<dyn LocalStore>,
}

impl FullSyncStaleDataExpunger {
    pub fn new(local_store: Arc<dyn LocalStore>) -> Self {
        Self { local_store }
    }

    pub async fn expunge_stale_data(
        &self,
        preserved_guids: &HashSet<Guid>,
        scope: &SyncScope,
    ) -> anyhow::Result<()> {
        match scope {
            SyncScope::UserOwn => self.expunge_user_own(preserved_guids).await,
            SyncScope::LinkedNotebook(guid) => self.expunge_linked_notebook(preserved_guids, guid).await,
        }
    }

    async fn expunge_user_own(&self, preserved_guids: &HashSet<Guid>) -> anyhow::Result<()> {
        let mut expunged = 0u32;

        for notebook in self.local_store.list_notebooks().await? {
            if notebook.is_linked() || notebook.locally_modified {
                continue;
            }
            if let Some(guid) = &notebook.guid {
                if !preserved_guids.contains(guid) {
                    self.local_store.expunge_notebook(guid).await?;
                    expunged += 1;
                }
            }
        }

        for tag in self.local_store.list_tags().await? {
            if tag.is_linked() || tag.locally_modified {
                continue;
            }
            if let Some(guid) = &tag.guid {
                if !preserved_guids.contains(guid) {
                    self.local_store.expunge_tag(guid).await?;
                    expunged += 1;
                }
            }
        }

        for search in self.local_store.list_saved_searches().await? {
            if search.locally_modified {
                continue;
            }
            if let Some(guid) = &search.guid {
                if !preserved_guids.contains(guid) {
                    self.local_store.expunge_saved_search(guid).await?;
                    expunged += 1;
                }
            }
        }

        let notes = self
            .local_store
            .list_notes(NoteListOptions {
                fetch: NoteFetchOptions::metadata_only(),
                ..Default::default()
            })
            .await?;
        for note in notes {
            if note.local_only || note.locally_modified {
                continue;
            }
            if let Some(guid) = &note.guid {
                if !preserved_guids.contains(guid) {
                    self.local_store.expunge_note(guid).await?;
                    expunged += 1;
                }
            }
        }

        debug!(expunged, "full-sync stale-data expunge (user-own) complete");
        Ok(())
    }

    async fn expunge_linked_notebook(
        &self,
        preserved_guids: &HashSet<Guid>,
        linked_notebook_guid: &Guid,
    ) -> anyhow::Result<()> {
        let notebooks = self.local_store.list_notebooks().await?;
        let owned_notebook_local_ids: HashSet<_> = notebooks
            .iter()
            .filter(|n| n.owning_linked_notebook_guid.as_ref() == Some(linked_notebook_guid))
            .map(|n| n.local_id)
            .collect();

        let mut expunged = 0u32;

        for notebook in &notebooks {
            if notebook.owning_linked_notebook_guid.as_ref() != Some(linked_notebook_guid) {
                continue;
            }
            if notebook.locally_modified {
                continue;
            }
            if let Some(guid) = &notebook.guid {
                if !preserved_guids.contains(guid) {
                    self.local_store.expunge_notebook(guid).await?;
                    expunged += 1;
                }
            }
        }

        for tag in self.local_store.list_tags().await? {
            if tag.owning_linked_notebook_guid.as_ref() != Some(linked_notebook_guid) {
                continue;
            }
            if tag.locally_modified {
                continue;
            }
            if let Some(guid) = &tag.guid {
                if !preserved_guids.contains(guid) {
                    self.local_store.expunge_tag(guid).await?;
                    expunged += 1;
                }
            }
        }

        let notes = self
            .local_store
            .list_notes(NoteListOptions {
                fetch: NoteFetchOptions::metadata_only(),
                ..Default::default()
            })
            .await?;
        for note in notes {
            if !owned_notebook_local_ids.contains(&note.notebook_local_id) {
                continue;
            }
            if note.local_only || note.locally_modified {
                continue;
            }
            if let Some(guid) = &note.guid {
                if !preserved_guids.contains(guid) {
                    self.local_store.expunge_note(guid).await?;
                    expunged += 1;
                }
            }
        }

        debug!(expunged, guid = %linked_notebook_guid, "full-sync stale-data expunge (linked notebook) complete");
        Ok(())
    }
}

/// Expunges linked-notebook tags with no note referencing them, run once
/// after every per-linked-notebook sub-pipeline has completed (§4.4 step 7).
/// Failures are logged and ignored by the caller, never fail the cycle.
pub struct LinkedNotebookTagsCleaner {
    local_store: Arc<dyn LocalStore>,
}

impl LinkedNotebookTagsCleaner {
    pub fn new(local_store: Arc<dyn LocalStore>) -> Self {
        Self { local_store }
    }

    pub async fn clean(&self) -> anyhow::Result<()> {
        let notes = self
            .local_store
            .list_notes(NoteListOptions {
                fetch: NoteFetchOptions::metadata_only(),
                ..Default::default()
            })
            .await?;
        let referenced: HashSet<_> = notes.iter().flat_map(|n| n.tag_local_ids.iter().copied()).collect();

        let mut removed = 0u32;
        for tag in self.local_store.list_tags().await? {
            if !tag.is_linked() {
                continue;
            }
            if referenced.contains(&tag.local_id) {
                continue;
            }
            if let Some(guid) = &tag.guid {
                if let Err(e) = self.local_store.expunge_tag(guid).await {
                    warn!(guid = %guid, error = %e, "failed to expunge stale linked-notebook tag");
                    continue;
                }
                removed += 1;
            }
        }

        debug!(removed, "linked-notebook tag cleanup complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evercore_core::domain::{LocalId, Note, Notebook, Tag};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeStore {
        notebooks: StdMutex<Vec<Notebook>>,
        tags: StdMutex<Vec<Tag>>,
        notes: StdMutex<Vec<Note>>,
        expunged_notebooks: StdMutex<Vec<Guid>>,
        expunged_tags: StdMutex<Vec<Guid>>,
    }

    #[async_trait::async_trait]
    impl LocalStore for FakeStore {
        async fn put_notebook(&self, _n: &Notebook) -> anyhow::Result<()> {
            Ok(())
        }
        async fn find_notebook(&self, _local_id: LocalId) -> anyhow::Result<Option<Notebook>> {
            Ok(None)
        }
        async fn find_notebook_by_guid(&self, _guid: &Guid) -> anyhow::Result<Option<Notebook>> {
            Ok(None)
        }
        async fn list_notebooks(&self) -> anyhow::Result<Vec<Notebook>> {
            Ok(self.notebooks.lock().unwrap().clone())
        }
        async fn expunge_notebook(&self, guid: &Guid) -> anyhow::Result<()> {
            self.expunged_notebooks.lock().unwrap().push(guid.clone());
            Ok(())
        }
        async fn put_tag(&self, _t: &Tag) -> anyhow::Result<()> {
            Ok(())
        }
        async fn find_tag(&self, _local_id: LocalId) -> anyhow::Result<Option<Tag>> {
            Ok(None)
        }
        async fn find_tag_by_guid(&self, _guid: &Guid) -> anyhow::Result<Option<Tag>> {
            Ok(None)
        }
        async fn list_tags(&self) -> anyhow::Result<Vec<Tag>> {
            Ok(self.tags.lock().unwrap().clone())
        }
        async fn expunge_tag(&self, guid: &Guid) -> anyhow::Result<()> {
            self.expunged_tags.lock().unwrap().push(guid.clone());
            Ok(())
        }
        async fn put_saved_search(&self, _s: &evercore_core::domain::SavedSearch) -> anyhow::Result<()> {
            Ok(())
        }
        async fn find_saved_search(
            &self,
            _local_id: LocalId,
        ) -> anyhow::Result<Option<evercore_core::domain::SavedSearch>> {
            Ok(None)
        }
        async fn list_saved_searches(&self) -> anyhow::Result<Vec<evercore_core::domain::SavedSearch>> {
            Ok(vec![])
        }
        async fn expunge_saved_search(&self, _guid: &Guid) -> anyhow::Result<()> {
            Ok(())
        }
        async fn put_linked_notebook(
            &self,
            _l: &evercore_core::domain::LinkedNotebook,
        ) -> anyhow::Result<()> {
            Ok(())
        }
        async fn find_linked_notebook(
            &self,
            _local_id: LocalId,
        ) -> anyhow::Result<Option<evercore_core::domain::LinkedNotebook>> {
            Ok(None)
        }
        async fn find_linked_notebook_by_guid(
            &self,
            _guid: &Guid,
        ) -> anyhow::Result<Option<evercore_core::domain::LinkedNotebook>> {
            Ok(None)
        }
        async fn list_linked_notebooks(&self) -> anyhow::Result<Vec<evercore_core::domain::LinkedNotebook>> {
            Ok(vec![])
        }
        async fn expunge_linked_notebook(&self, _guid: &Guid) -> anyhow::Result<()> {
            Ok(())
        }
        async fn put_note(&self, _n: &Note) -> anyhow::Result<()> {
            Ok(())
        }
        async fn find_note(
            &self,
            _local_id: LocalId,
            _options: NoteFetchOptions,
        ) -> anyhow::Result<Option<Note>> {
            Ok(None)
        }
        async fn find_note_by_guid(
            &self,
            _guid: &Guid,
            _options: NoteFetchOptions,
        ) -> anyhow::Result<Option<Note>> {
            Ok(None)
        }
        async fn list_notes(&self, _options: NoteListOptions) -> anyhow::Result<Vec<Note>> {
            Ok(self.notes.lock().unwrap().clone())
        }
        async fn expunge_note(&self, _guid: &Guid) -> anyhow::Result<()> {
            Ok(())
        }
        async fn put_resource(&self, _r: &evercore_core::domain::Resource) -> anyhow::Result<()> {
            Ok(())
        }
        async fn find_resource(
            &self,
            _local_id: LocalId,
            _with_binary_data: bool,
        ) -> anyhow::Result<Option<evercore_core::domain::Resource>> {
            Ok(None)
        }
        async fn list_resources_for_note(
            &self,
            _note_local_id: LocalId,
        ) -> anyhow::Result<Vec<evercore_core::domain::Resource>> {
            Ok(vec![])
        }
    }

    fn synced_notebook(guid: &str) -> Notebook {
        let mut n = Notebook::new("n");
        n.guid = Some(Guid::new(guid).unwrap());
        n.update_sequence_number = Some(evercore_core::domain::Usn(1));
        n.locally_modified = false;
        n
    }

    #[tokio::test]
    async fn expunges_user_own_notebook_not_in_preserved_set() {
        let store = Arc::new(FakeStore::default());
        store.notebooks.lock().unwrap().push(synced_notebook("keep"));
        store.notebooks.lock().unwrap().push(synced_notebook("drop"));

        let expunger = FullSyncStaleDataExpunger::new(store.clone());
        let preserved: HashSet<Guid> = [Guid::new("keep").unwrap()].into_iter().collect();
        expunger.expunge_stale_data(&preserved, &SyncScope::UserOwn).await.unwrap();

        let dropped = store.expunged_notebooks.lock().unwrap();
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].as_str(), "drop");
    }

    #[tokio::test]
    async fn locally_modified_notebook_is_never_expunged() {
        let store = Arc::new(FakeStore::default());
        let mut nb = synced_notebook("pending");
        nb.locally_modified = true;
        store.notebooks.lock().unwrap().push(nb);

        let expunger = FullSyncStaleDataExpunger::new(store.clone());
        expunger
            .expunge_stale_data(&HashSet::new(), &SyncScope::UserOwn)
            .await
            .unwrap();

        assert!(store.expunged_notebooks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cleans_up_unreferenced_linked_tag() {
        let store = Arc::new(FakeStore::default());
        let mut tag = Tag::new("linked-tag");
        tag.guid = Some(Guid::new("lt1").unwrap());
        tag.owning_linked_notebook_guid = Some(Guid::new("ln1").unwrap());
        store.tags.lock().unwrap().push(tag);

        let cleaner = LinkedNotebookTagsCleaner::new(store.clone());
        cleaner.clean().await.unwrap();

        assert_eq!(store.expunged_tags.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn keeps_linked_tag_referenced_by_a_note() {
        let store = Arc::new(FakeStore::default());
        let mut tag = Tag::new("linked-tag");
        tag.guid = Some(Guid::new("lt1").unwrap());
        tag.owning_linked_notebook_guid = Some(Guid::new("ln1").unwrap());
        let tag_local_id = tag.local_id;
        store.tags.lock().unwrap().push(tag);

        let mut note = Note::new("n", LocalId::new());
        note.tag_local_ids.push(tag_local_id);
        store.notes.lock().unwrap().push(note);

        let cleaner = LinkedNotebookTagsCleaner::new(store.clone());
        cleaner.clean().await.unwrap();

        assert!(store.expunged_tags.lock().unwrap().is_empty());
    }
}
