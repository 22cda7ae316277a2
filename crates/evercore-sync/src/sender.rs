//! Upload ("send") cycle (§4.5).
//!
//! Mirrors `downloader.rs`'s shape: one struct holding its collaborators,
//! one instrumented entry point, strict tags → notebooks → saved searches →
//! notes ordering within each scope. Unlike the downloader, notes are
//! uploaded sequentially per scope rather than concurrently, since each
//! upload's returned USN must be observed before the next is issued.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use evercore_core::domain::{
    Account, EntityFailure, Guid, LocalId, Note, Notebook, SavedSearch, SendStatus, SyncState, Tag,
    TransportParams,
};
use evercore_core::error::{CoreError, CoreResult};
use evercore_core::ports::local_store::NoteListOptions;
use evercore_core::ports::{Canceler, LocalStore, ProgressCallback, RpcClient, SyncStateStorage};
use tracing::{info, warn};

use crate::tag_sort::topological_sort;

/// Aggregated outcome of one send cycle.
#[derive(Debug, Clone, Default)]
pub struct SendResult {
    pub user_own: SendStatus,
    pub linked_notebooks: HashMap<String, SendStatus>,
    pub sync_state: SyncState,
}

fn check_cancel(canceler: &Arc<dyn Canceler>) -> CoreResult<()> {
    if canceler.is_canceled() {
        return Err(CoreError::OperationCanceled);
    }
    Ok(())
}

/// `None` identifies the user's own scope; `Some(guid)` a linked notebook's.
type ScopeKey = Option<String>;

fn scope_key(guid: &Option<Guid>) -> ScopeKey {
    guid.as_ref().map(|g| g.as_str().to_string())
}

/// Per-scope running state carried across the whole cycle: the status
/// accumulator being built, and the running `last_update_count` used for the
/// USN-monotonicity check (§4.5.5).
#[derive(Default)]
struct ScopeState {
    status: SendStatus,
    last_update_count: i32,
}

/// Bookkeeping threaded through the tag/notebook stages so later stages (and
/// the note stage) can resolve cross-entity dependencies introduced this
/// cycle.
#[derive(Default)]
struct CycleBook {
    /// Freshly assigned guids for tags created this cycle, keyed by local id.
    new_tag_guids: HashMap<LocalId, Guid>,
    failed_to_send_new_tag_local_ids: HashSet<LocalId>,
    /// Every notebook local id touched this cycle, mapped to its scope, so
    /// note processing does not need to re-read the local store for
    /// notebooks this cycle already resolved.
    notebook_scopes: HashMap<LocalId, Option<Guid>>,
    failed_to_send_new_notebook_local_ids: HashSet<LocalId>,
}

pub struct Sender {
    note_store_provider: Arc<evercore_notestore::NoteStoreProvider>,
    local_store: Arc<dyn LocalStore>,
    sync_state_storage: Arc<dyn SyncStateStorage>,
    account: Account,
    transport: TransportParams,
}

impl Sender {
    pub fn new(
        note_store_provider: Arc<evercore_notestore::NoteStoreProvider>,
        local_store: Arc<dyn LocalStore>,
        sync_state_storage: Arc<dyn SyncStateStorage>,
        account: Account,
        transport: TransportParams,
    ) -> Self {
        Self {
            note_store_provider,
            local_store,
            sync_state_storage,
            account,
            transport,
        }
    }

    #[tracing::instrument(skip(self, canceler, progress))]
    pub async fn run(
        &self,
        canceler: Arc<dyn Canceler>,
        progress: Arc<dyn ProgressCallback>,
    ) -> CoreResult<SendResult> {
        let last_state = match self.sync_state_storage.get(&self.account).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to read sync state, starting from zero");
                SyncState::zero()
            }
        };

        let mut scopes: HashMap<ScopeKey, ScopeState> = HashMap::new();
        scopes.insert(
            None,
            ScopeState {
                status: SendStatus::default(),
                last_update_count: last_state.user_data_update_count,
            },
        );

        let mut book = CycleBook::default();

        check_cancel(&canceler)?;
        self.send_tags(&canceler, &progress, &mut scopes, &mut book, &last_state).await?;

        check_cancel(&canceler)?;
        self.send_notebooks(&canceler, &progress, &mut scopes, &mut book, &last_state)
            .await?;

        check_cancel(&canceler)?;
        self.send_saved_searches(&canceler, &progress, &mut scopes, &last_state).await?;

        check_cancel(&canceler)?;
        self.send_notes(&canceler, &progress, &mut scopes, &mut book, &last_state).await?;

        let mut sync_state = last_state;
        let now = Utc::now();
        for (key, state) in &scopes {
            match key {
                None => sync_state.advance_user_data(state.last_update_count, now),
                Some(guid) => {
                    if let Ok(guid) = Guid::new(guid.clone()) {
                        sync_state.advance_linked_notebook(&guid, state.last_update_count, now);
                    }
                }
            }
        }
        if let Err(e) = self.sync_state_storage.set(&self.account, &sync_state).await {
            warn!(error = %e, "failed to persist sync state after send cycle");
        }

        let mut result = SendResult {
            sync_state,
            ..Default::default()
        };
        for (key, state) in scopes {
            match key {
                None => result.user_own = state.status,
                Some(guid) => {
                    result.linked_notebooks.insert(guid, state.status);
                }
            }
        }
        Ok(result)
    }

    /// Resolves which note store endpoint a notebook-owned entity belongs
    /// to: the user's own, or a linked notebook's, looked up by guid.
    async fn note_store_for_scope(
        &self,
        owning_linked_notebook_guid: &Option<Guid>,
    ) -> CoreResult<Arc<dyn RpcClient>> {
        match owning_linked_notebook_guid {
            Some(guid) => {
                let linked_notebook = self
                    .local_store
                    .find_linked_notebook_by_guid(guid)
                    .await
                    .map_err(|e| CoreError::RuntimeError(e.to_string()))?
                    .ok_or_else(|| CoreError::RuntimeError(format!("linked notebook {guid} not found locally")))?;
                self.note_store_provider
                    .linked_notebook_note_store(&linked_notebook, self.transport.clone())
                    .await
            }
            None => self.note_store_provider.user_own_note_store(self.transport.clone()).await,
        }
    }

    /// Updates `scope`'s running `last_update_count` and flags
    /// `need_to_repeat_incremental_sync` if `usn` was not exactly one more
    /// than the previous running count (§4.5.5).
    fn observe_usn(state: &mut ScopeState, usn: i32) {
        if usn != state.last_update_count + 1 {
            state.status.need_to_repeat_incremental_sync = true;
        }
        state.last_update_count = usn;
    }

    /// Records a fatal (non-per-item) protocol error on `state` and returns
    /// it so the caller can abort the cycle.
    fn record_fatal(state: &mut ScopeState, err: CoreError) -> CoreError {
        if let CoreError::Protocol(p) = &err {
            if let Some(stop) = Into::<Option<_>>::into(p) {
                state.status.stop_synchronization_error = stop;
            }
        }
        err
    }

    async fn send_tags(
        &self,
        canceler: &Arc<dyn Canceler>,
        progress: &Arc<dyn ProgressCallback>,
        scopes: &mut HashMap<ScopeKey, ScopeState>,
        book: &mut CycleBook,
        last_state: &SyncState,
    ) -> CoreResult<()> {
        let all_tags = self
            .local_store
            .list_tags()
            .await
            .map_err(|e| CoreError::RuntimeError(e.to_string()))?;
        let modified: Vec<Tag> = all_tags
            .into_iter()
            .filter(|t| t.locally_modified && !t.local_only)
            .collect();
        if modified.is_empty() {
            return Ok(());
        }
        let ordered = topological_sort(modified).map_err(|e| CoreError::RuntimeError(e.to_string()))?;

        for mut tag in ordered {
            check_cancel(canceler)?;
            let key = scope_key(&tag.owning_linked_notebook_guid);
            let state = scopes.entry(key.clone()).or_insert_with(|| ScopeState {
                status: SendStatus::default(),
                last_update_count: last_state_count(last_state, &key),
            });

            if let Some(parent_id) = tag.parent_tag_local_id {
                if book.failed_to_send_new_tag_local_ids.contains(&parent_id) {
                    state
                        .status
                        .tags
                        .record_failure(EntityFailure::new(tag.local_id, tag.guid.clone(), "parent tag failed to send"));
                    if tag.is_new() {
                        book.failed_to_send_new_tag_local_ids.insert(tag.local_id);
                    }
                    progress.on_send_progress(&state.status);
                    continue;
                }
                if let Some(parent_guid) = book.new_tag_guids.get(&parent_id) {
                    tag.parent_tag_guid = Some(parent_guid.clone());
                }
            }

            let client = self.note_store_for_scope(&tag.owning_linked_notebook_guid).await?;
            let is_new = tag.is_new();

            let outcome = if is_new {
                client.create_tag(&tag).await.map(|created| (created.guid, created.update_sequence_number))
            } else {
                client.update_tag(&tag).await.map(|usn| (tag.guid.clone(), Some(usn)))
            };

            match outcome {
                Ok((guid, usn)) => {
                    tag.guid = guid.clone();
                    tag.update_sequence_number = usn;
                    tag.locally_modified = false;
                    if let Err(e) = self.local_store.put_tag(&tag).await {
                        warn!(tag = ?tag.local_id, error = %e, "failed to persist uploaded tag");
                    }
                    state.status.tags.record_success();
                    if let Some(usn) = usn {
                        Self::observe_usn(state, usn.0);
                    }
                    if is_new {
                        if let Some(guid) = guid {
                            book.new_tag_guids.insert(tag.local_id, guid);
                        }
                    }
                    progress.on_send_progress(&state.status);
                }
                Err(CoreError::Protocol(p)) if p.is_per_item() => {
                    state
                        .status
                        .tags
                        .record_failure(EntityFailure::new(tag.local_id, tag.guid.clone(), p.to_string()));
                    if is_new {
                        book.failed_to_send_new_tag_local_ids.insert(tag.local_id);
                    }
                    progress.on_send_progress(&state.status);
                }
                Err(e) => {
                    let e = Self::record_fatal(state, e);
                    progress.on_send_progress(&state.status);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn send_notebooks(
        &self,
        canceler: &Arc<dyn Canceler>,
        progress: &Arc<dyn ProgressCallback>,
        scopes: &mut HashMap<ScopeKey, ScopeState>,
        book: &mut CycleBook,
        last_state: &SyncState,
    ) -> CoreResult<()> {
        let all_notebooks = self
            .local_store
            .list_notebooks()
            .await
            .map_err(|e| CoreError::RuntimeError(e.to_string()))?;
        for mut notebook in all_notebooks.into_iter().filter(|n| n.locally_modified && !n.local_only) {
            check_cancel(canceler)?;
            let key = scope_key(&notebook.owning_linked_notebook_guid);
            book.notebook_scopes
                .insert(notebook.local_id, notebook.owning_linked_notebook_guid.clone());
            let state = scopes.entry(key.clone()).or_insert_with(|| ScopeState {
                status: SendStatus::default(),
                last_update_count: last_state_count(last_state, &key),
            });

            let client = self.note_store_for_scope(&notebook.owning_linked_notebook_guid).await?;
            let is_new = notebook.is_new();

            let outcome: Result<(Option<_>, Option<_>), CoreError> = if is_new {
                client
                    .create_notebook(&notebook)
                    .await
                    .map(|created: Notebook| (created.guid, created.update_sequence_number))
            } else {
                client.update_notebook(&notebook).await.map(|usn| (notebook.guid.clone(), Some(usn)))
            };

            match outcome {
                Ok((guid, usn)) => {
                    notebook.guid = guid;
                    notebook.update_sequence_number = usn;
                    notebook.locally_modified = false;
                    if let Err(e) = self.local_store.put_notebook(&notebook).await {
                        warn!(notebook = ?notebook.local_id, error = %e, "failed to persist uploaded notebook");
                    }
                    state.status.notebooks.record_success();
                    if let Some(usn) = usn {
                        Self::observe_usn(state, usn.0);
                    }
                    progress.on_send_progress(&state.status);
                }
                Err(CoreError::Protocol(p)) if p.is_per_item() => {
                    state.status.notebooks.record_failure(EntityFailure::new(
                        notebook.local_id,
                        notebook.guid.clone(),
                        p.to_string(),
                    ));
                    if is_new {
                        book.failed_to_send_new_notebook_local_ids.insert(notebook.local_id);
                    }
                    progress.on_send_progress(&state.status);
                }
                Err(e) => {
                    let e = Self::record_fatal(state, e);
                    progress.on_send_progress(&state.status);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn send_saved_searches(
        &self,
        canceler: &Arc<dyn Canceler>,
        progress: &Arc<dyn ProgressCallback>,
        scopes: &mut HashMap<ScopeKey, ScopeState>,
        last_state: &SyncState,
    ) -> CoreResult<()> {
        let all = self
            .local_store
            .list_saved_searches()
            .await
            .map_err(|e| CoreError::RuntimeError(e.to_string()))?;
        let state = scopes.entry(None).or_insert_with(|| ScopeState {
            status: SendStatus::default(),
            last_update_count: last_state.user_data_update_count,
        });

        let client = self.note_store_provider.user_own_note_store(self.transport.clone()).await?;

        for mut search in all.into_iter().filter(|s| s.locally_modified && !s.local_only) {
            check_cancel(canceler)?;
            let is_new = search.is_new();

            let outcome: Result<(Option<_>, Option<_>), CoreError> = if is_new {
                client
                    .create_saved_search(&search)
                    .await
                    .map(|created: SavedSearch| (created.guid, created.update_sequence_number))
            } else {
                client.update_saved_search(&search).await.map(|usn| (search.guid.clone(), Some(usn)))
            };

            match outcome {
                Ok((guid, usn)) => {
                    search.guid = guid;
                    search.update_sequence_number = usn;
                    search.locally_modified = false;
                    if let Err(e) = self.local_store.put_saved_search(&search).await {
                        warn!(search = ?search.local_id, error = %e, "failed to persist uploaded saved search");
                    }
                    state.status.saved_searches.record_success();
                    if let Some(usn) = usn {
                        Self::observe_usn(state, usn.0);
                    }
                    progress.on_send_progress(&state.status);
                }
                Err(CoreError::Protocol(p)) if p.is_per_item() => {
                    state.status.saved_searches.record_failure(EntityFailure::new(
                        search.local_id,
                        search.guid.clone(),
                        p.to_string(),
                    ));
                    progress.on_send_progress(&state.status);
                }
                Err(e) => {
                    let e = Self::record_fatal(state, e);
                    progress.on_send_progress(&state.status);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn send_notes(
        &self,
        canceler: &Arc<dyn Canceler>,
        progress: &Arc<dyn ProgressCallback>,
        scopes: &mut HashMap<ScopeKey, ScopeState>,
        book: &mut CycleBook,
        last_state: &SyncState,
    ) -> CoreResult<()> {
        let options = NoteListOptions {
            locally_modified_only: true,
            exclude_local_only: true,
            notebook_local_id: None,
            fetch: evercore_core::ports::local_store::NoteFetchOptions::metadata_only(),
        };
        let modified = self
            .local_store
            .list_notes(options)
            .await
            .map_err(|e| CoreError::RuntimeError(e.to_string()))?;

        // Group by scope so each scope's notes upload sequentially while
        // scopes themselves do not block one another's ordering guarantees
        // (this cycle's pipeline still runs one scope's notes after the
        // previous one completes, kept simple since note volume per cycle
        // is small relative to chunk processing).
        let mut by_scope: HashMap<ScopeKey, Vec<Note>> = HashMap::new();
        for note in modified {
            let scope = match book.notebook_scopes.get(&note.notebook_local_id) {
                Some(guid) => guid.clone(),
                None => self
                    .local_store
                    .find_notebook(note.notebook_local_id)
                    .await
                    .map_err(|e| CoreError::RuntimeError(e.to_string()))?
                    .and_then(|n| n.owning_linked_notebook_guid),
            };
            by_scope.entry(scope_key(&scope)).or_default().push(note);
        }

        for (key, notes) in by_scope {
            let owning_guid = key.as_ref().and_then(|g| Guid::new(g.clone()).ok());
            let state = scopes.entry(key.clone()).or_insert_with(|| ScopeState {
                status: SendStatus::default(),
                last_update_count: last_state_count(last_state, &key),
            });

            for mut note in notes {
                check_cancel(canceler)?;

                if book.failed_to_send_new_notebook_local_ids.contains(&note.notebook_local_id) {
                    state.status.notes.record_failure(EntityFailure::new(
                        note.local_id,
                        note.guid.clone(),
                        "notebook failed to send",
                    ));
                    progress.on_send_progress(&state.status);
                    continue;
                }

                let contains_failed_to_send_tags = note
                    .tag_local_ids
                    .iter()
                    .any(|id| book.failed_to_send_new_tag_local_ids.contains(id));

                let mut tag_guids = Vec::with_capacity(note.tag_local_ids.len());
                for tag_local_id in &note.tag_local_ids {
                    if let Some(guid) = book.new_tag_guids.get(tag_local_id) {
                        tag_guids.push(guid.clone());
                        continue;
                    }
                    if let Ok(Some(tag)) = self.local_store.find_tag(*tag_local_id).await {
                        if let Some(guid) = tag.guid {
                            tag_guids.push(guid);
                        }
                    }
                }
                note.tag_guids = tag_guids;

                if note.notebook_guid.is_none() {
                    note.notebook_guid = self
                        .local_store
                        .find_notebook(note.notebook_local_id)
                        .await
                        .map_err(|e| CoreError::RuntimeError(e.to_string()))?
                        .and_then(|n| n.guid);
                }

                let client = self.note_store_for_scope(&owning_guid).await?;
                let is_new = note.is_new();

                let outcome: Result<(Option<_>, Option<_>, Option<_>), CoreError> = if is_new {
                    client
                        .create_note(&note)
                        .await
                        .map(|created: Note| (created.guid, created.update_sequence_number, created.notebook_guid))
                } else {
                    client
                        .update_note(&note)
                        .await
                        .map(|usn| (note.guid.clone(), Some(usn), note.notebook_guid.clone()))
                };

                match outcome {
                    Ok((guid, usn, notebook_guid)) => {
                        note.guid = guid;
                        note.update_sequence_number = usn;
                        note.notebook_guid = notebook_guid;
                        note.locally_modified = contains_failed_to_send_tags;
                        if let Err(e) = self.local_store.put_note(&note).await {
                            warn!(note = ?note.local_id, error = %e, "failed to persist uploaded note");
                        }
                        state.status.notes.record_success();
                        if let Some(usn) = usn {
                            Self::observe_usn(state, usn.0);
                        }
                        progress.on_send_progress(&state.status);
                    }
                    Err(CoreError::Protocol(p)) if p.is_per_item() => {
                        state
                            .status
                            .notes
                            .record_failure(EntityFailure::new(note.local_id, note.guid.clone(), p.to_string()));
                        progress.on_send_progress(&state.status);
                    }
                    Err(e) => {
                        let e = Self::record_fatal(state, e);
                        progress.on_send_progress(&state.status);
                        return Err(e);
                    }
                }
            }
        }

        info!("send cycle note stage complete");
        Ok(())
    }
}

fn last_state_count(last_state: &SyncState, key: &ScopeKey) -> i32 {
    match key {
        None => last_state.user_data_update_count,
        Some(guid) => Guid::new(guid.clone())
            .map(|g| last_state.linked_notebook_update_count(&g))
            .unwrap_or(0),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use evercore_auth::AuthenticationProvider;
    use evercore_core::domain::{Account, AuthenticationInfo, Cookie, LinkedNotebook, RequestContext, Resource, Usn};
    use evercore_core::error::{CoreResult as Res, ProtocolError};
    use evercore_core::ports::local_store::NoteFetchOptions;
    use evercore_core::ports::rpc_client::{RpcSyncChunkFilter, RpcSyncState, SharedNotebookAuth};
    use evercore_core::ports::{Authenticator, NoteStoreClientFactory, NoopProgress, SecretStore, SettingsStore, TokenCanceler};
    use evercore_notestore::factory::NoteStoreClientBuilder;
    use evercore_notestore::NoteStoreProvider;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Mutex as StdMutex;

    fn account() -> Account {
        Account::new(1, "www.evernote.com", "alice")
    }

    struct FakeAuthenticator;
    #[async_trait]
    impl Authenticator for FakeAuthenticator {
        async fn authenticate_new_account(&self) -> Res<(Account, AuthenticationInfo)> {
            unimplemented!()
        }
        async fn authenticate_account(&self, account: &Account) -> Res<AuthenticationInfo> {
            Ok(AuthenticationInfo {
                user_id: account.user_id,
                auth_token: "tok".into(),
                shard_id: "s1".into(),
                note_store_url: "https://example.com/shard/notestore".into(),
                web_api_url_prefix: "https://example.com/".into(),
                token_expiration_time: Utc::now() + chrono::Duration::hours(1),
                authentication_time: Utc::now(),
                user_store_cookies: vec![Cookie::new("webAPreUserGuid", "v")],
            })
        }
    }

    #[derive(Default)]
    struct FakeSettings(StdMutex<HashMap<(String, String), String>>);
    #[async_trait]
    impl SettingsStore for FakeSettings {
        async fn get(&self, section: &str, key: &str) -> anyhow::Result<Option<String>> {
            Ok(self.0.lock().unwrap().get(&(section.to_string(), key.to_string())).cloned())
        }
        async fn set(&self, section: &str, key: &str, value: &str) -> anyhow::Result<()> {
            self.0.lock().unwrap().insert((section.to_string(), key.to_string()), value.to_string());
            Ok(())
        }
        async fn remove(&self, _section: &str, _key: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn clear_section(&self, _section: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeSecrets(StdMutex<HashMap<(String, String), String>>);
    #[async_trait]
    impl SecretStore for FakeSecrets {
        async fn read_password(&self, service: &str, key: &str) -> Result<String, evercore_core::ports::SecretStoreError> {
            self.0
                .lock()
                .unwrap()
                .get(&(service.to_string(), key.to_string()))
                .cloned()
                .ok_or_else(|| evercore_core::ports::SecretStoreError::EntryNotFound(key.to_string()))
        }
        async fn write_password(&self, service: &str, key: &str, value: &str) -> Result<(), evercore_core::ports::SecretStoreError> {
            self.0.lock().unwrap().insert((service.to_string(), key.to_string()), value.to_string());
            Ok(())
        }
        async fn delete_password(&self, _service: &str, _key: &str) -> Result<(), evercore_core::ports::SecretStoreError> {
            Ok(())
        }
    }

    struct FakeSyncStateStorage {
        state: StdMutex<SyncState>,
    }
    #[async_trait]
    impl SyncStateStorage for FakeSyncStateStorage {
        async fn get(&self, _account: &Account) -> anyhow::Result<SyncState> {
            Ok(self.state.lock().unwrap().clone())
        }
        async fn set(&self, _account: &Account, state: &SyncState) -> anyhow::Result<()> {
            *self.state.lock().unwrap() = state.clone();
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeLocalStore {
        notebooks: StdMutex<HashMap<LocalId, Notebook>>,
        tags: StdMutex<HashMap<LocalId, Tag>>,
        saved_searches: StdMutex<HashMap<LocalId, SavedSearch>>,
        notes: StdMutex<HashMap<LocalId, Note>>,
        linked_notebooks: StdMutex<HashMap<LocalId, LinkedNotebook>>,
    }

    #[async_trait]
    impl LocalStore for FakeLocalStore {
        async fn put_notebook(&self, notebook: &Notebook) -> anyhow::Result<()> {
            self.notebooks.lock().unwrap().insert(notebook.local_id, notebook.clone());
            Ok(())
        }
        async fn find_notebook(&self, local_id: LocalId) -> anyhow::Result<Option<Notebook>> {
            Ok(self.notebooks.lock().unwrap().get(&local_id).cloned())
        }
        async fn find_notebook_by_guid(&self, guid: &Guid) -> anyhow::Result<Option<Notebook>> {
            Ok(self.notebooks.lock().unwrap().values().find(|n| n.guid.as_ref() == Some(guid)).cloned())
        }
        async fn list_notebooks(&self) -> anyhow::Result<Vec<Notebook>> {
            Ok(self.notebooks.lock().unwrap().values().cloned().collect())
        }
        async fn expunge_notebook(&self, guid: &Guid) -> anyhow::Result<()> {
            self.notebooks.lock().unwrap().retain(|_, n| n.guid.as_ref() != Some(guid));
            Ok(())
        }
        async fn put_tag(&self, tag: &Tag) -> anyhow::Result<()> {
            self.tags.lock().unwrap().insert(tag.local_id, tag.clone());
            Ok(())
        }
        async fn find_tag(&self, local_id: LocalId) -> anyhow::Result<Option<Tag>> {
            Ok(self.tags.lock().unwrap().get(&local_id).cloned())
        }
        async fn find_tag_by_guid(&self, guid: &Guid) -> anyhow::Result<Option<Tag>> {
            Ok(self.tags.lock().unwrap().values().find(|t| t.guid.as_ref() == Some(guid)).cloned())
        }
        async fn list_tags(&self) -> anyhow::Result<Vec<Tag>> {
            Ok(self.tags.lock().unwrap().values().cloned().collect())
        }
        async fn expunge_tag(&self, guid: &Guid) -> anyhow::Result<()> {
            self.tags.lock().unwrap().retain(|_, t| t.guid.as_ref() != Some(guid));
            Ok(())
        }
        async fn put_saved_search(&self, search: &SavedSearch) -> anyhow::Result<()> {
            self.saved_searches.lock().unwrap().insert(search.local_id, search.clone());
            Ok(())
        }
        async fn find_saved_search(&self, local_id: LocalId) -> anyhow::Result<Option<SavedSearch>> {
            Ok(self.saved_searches.lock().unwrap().get(&local_id).cloned())
        }
        async fn list_saved_searches(&self) -> anyhow::Result<Vec<SavedSearch>> {
            Ok(self.saved_searches.lock().unwrap().values().cloned().collect())
        }
        async fn expunge_saved_search(&self, guid: &Guid) -> anyhow::Result<()> {
            self.saved_searches.lock().unwrap().retain(|_, s| s.guid.as_ref() != Some(guid));
            Ok(())
        }
        async fn put_linked_notebook(&self, linked_notebook: &LinkedNotebook) -> anyhow::Result<()> {
            self.linked_notebooks.lock().unwrap().insert(linked_notebook.local_id, linked_notebook.clone());
            Ok(())
        }
        async fn find_linked_notebook(&self, local_id: LocalId) -> anyhow::Result<Option<LinkedNotebook>> {
            Ok(self.linked_notebooks.lock().unwrap().get(&local_id).cloned())
        }
        async fn find_linked_notebook_by_guid(&self, guid: &Guid) -> anyhow::Result<Option<LinkedNotebook>> {
            Ok(self.linked_notebooks.lock().unwrap().values().find(|l| l.guid.as_ref() == Some(guid)).cloned())
        }
        async fn list_linked_notebooks(&self) -> anyhow::Result<Vec<LinkedNotebook>> {
            Ok(self.linked_notebooks.lock().unwrap().values().cloned().collect())
        }
        async fn expunge_linked_notebook(&self, guid: &Guid) -> anyhow::Result<()> {
            self.linked_notebooks.lock().unwrap().retain(|_, l| l.guid.as_ref() != Some(guid));
            Ok(())
        }
        async fn put_note(&self, note: &Note) -> anyhow::Result<()> {
            self.notes.lock().unwrap().insert(note.local_id, note.clone());
            Ok(())
        }
        async fn find_note(&self, local_id: LocalId, _options: NoteFetchOptions) -> anyhow::Result<Option<Note>> {
            Ok(self.notes.lock().unwrap().get(&local_id).cloned())
        }
        async fn find_note_by_guid(&self, guid: &Guid, _options: NoteFetchOptions) -> anyhow::Result<Option<Note>> {
            Ok(self.notes.lock().unwrap().values().find(|n| n.guid.as_ref() == Some(guid)).cloned())
        }
        async fn list_notes(&self, options: NoteListOptions) -> anyhow::Result<Vec<Note>> {
            Ok(self
                .notes
                .lock()
                .unwrap()
                .values()
                .filter(|n| !options.locally_modified_only || n.locally_modified)
                .filter(|n| !options.exclude_local_only || !n.local_only)
                .cloned()
                .collect())
        }
        async fn expunge_note(&self, guid: &Guid) -> anyhow::Result<()> {
            self.notes.lock().unwrap().retain(|_, n| n.guid.as_ref() != Some(guid));
            Ok(())
        }
        async fn put_resource(&self, _resource: &Resource) -> anyhow::Result<()> {
            Ok(())
        }
        async fn find_resource(&self, _local_id: LocalId, _with_binary_data: bool) -> anyhow::Result<Option<Resource>> {
            Ok(None)
        }
        async fn list_resources_for_note(&self, _note_local_id: LocalId) -> anyhow::Result<Vec<Resource>> {
            Ok(Vec::new())
        }
    }

    struct FakeRpc {
        next_usn: AtomicI32,
        fail_tag_name: Option<String>,
        fail_new_notebook: bool,
    }

    impl FakeRpc {
        fn plain() -> Self {
            Self {
                next_usn: AtomicI32::new(0),
                fail_tag_name: None,
                fail_new_notebook: false,
            }
        }

        fn next_usn(&self) -> i32 {
            self.next_usn.fetch_add(1, Ordering::SeqCst) + 1
        }
    }

    #[async_trait]
    impl RpcClient for FakeRpc {
        async fn get_sync_state(&self) -> Res<RpcSyncState> {
            unimplemented!()
        }
        async fn get_filtered_sync_chunk(
            &self,
            _after_usn: Usn,
            _max_entries: u32,
            _filter: &RpcSyncChunkFilter,
        ) -> Res<evercore_core::domain::SyncChunk> {
            unimplemented!()
        }
        async fn get_linked_notebook_sync_state(&self, _linked_notebook: &LinkedNotebook) -> Res<RpcSyncState> {
            unimplemented!()
        }
        async fn get_linked_notebook_sync_chunk(
            &self,
            _linked_notebook: &LinkedNotebook,
            _after_usn: Usn,
            _max_entries: u32,
            _filter: &RpcSyncChunkFilter,
        ) -> Res<evercore_core::domain::SyncChunk> {
            unimplemented!()
        }
        async fn authenticate_to_shared_notebook(&self, _id: &str) -> Res<SharedNotebookAuth> {
            unimplemented!()
        }
        async fn create_notebook(&self, notebook: &Notebook) -> Res<Notebook> {
            if self.fail_new_notebook {
                return Err(CoreError::Protocol(ProtocolError::DataConflict("no room".into())));
            }
            let mut created = notebook.clone();
            created.guid = Some(Guid::new(format!("nb-{}", notebook.local_id)).unwrap());
            created.update_sequence_number = Some(Usn(self.next_usn()));
            Ok(created)
        }
        async fn update_notebook(&self, _notebook: &Notebook) -> Res<Usn> {
            Ok(Usn(self.next_usn()))
        }
        async fn create_tag(&self, tag: &Tag) -> Res<Tag> {
            if self.fail_tag_name.as_deref() == Some(tag.name.as_str()) {
                return Err(CoreError::Protocol(ProtocolError::DataConflict("boom".into())));
            }
            let mut created = tag.clone();
            created.guid = Some(Guid::new(format!("tag-{}", tag.local_id)).unwrap());
            created.update_sequence_number = Some(Usn(self.next_usn()));
            Ok(created)
        }
        async fn update_tag(&self, _tag: &Tag) -> Res<Usn> {
            Ok(Usn(self.next_usn()))
        }
        async fn create_saved_search(&self, search: &SavedSearch) -> Res<SavedSearch> {
            let mut created = search.clone();
            created.guid = Some(Guid::new(format!("ss-{}", search.local_id)).unwrap());
            created.update_sequence_number = Some(Usn(self.next_usn()));
            Ok(created)
        }
        async fn update_saved_search(&self, _search: &SavedSearch) -> Res<Usn> {
            Ok(Usn(self.next_usn()))
        }
        async fn create_note(&self, note: &Note) -> Res<Note> {
            let mut created = note.clone();
            created.guid = Some(Guid::new(format!("note-{}", note.local_id)).unwrap());
            created.update_sequence_number = Some(Usn(self.next_usn()));
            Ok(created)
        }
        async fn update_note(&self, _note: &Note) -> Res<Usn> {
            Ok(Usn(self.next_usn()))
        }
        async fn get_note_with_result_spec(&self, _guid: &Guid, _options: NoteFetchOptions) -> Res<Note> {
            unimplemented!()
        }
        async fn get_resource(&self, _guid: &Guid, _with_binary_data: bool) -> Res<Resource> {
            unimplemented!()
        }
    }

    struct FakeBuilder {
        rpc: Arc<FakeRpc>,
    }
    #[async_trait]
    impl NoteStoreClientBuilder for FakeBuilder {
        async fn build(&self, _note_store_url: &str, _context: RequestContext) -> CoreResult<Arc<dyn RpcClient>> {
            Ok(self.rpc.clone())
        }
    }
    #[async_trait]
    impl NoteStoreClientFactory for FakeBuilder {
        async fn client_for_note_store_url(&self, note_store_url: &str, auth_token: &str) -> CoreResult<Arc<dyn RpcClient>> {
            self.build(note_store_url, RequestContext::new(auth_token)).await
        }
    }

    fn build_provider(rpc: Arc<FakeRpc>, local_store: Arc<dyn LocalStore>) -> Arc<NoteStoreProvider> {
        let builder = Arc::new(FakeBuilder { rpc });
        let auth = Arc::new(AuthenticationProvider::new(
            Arc::new(FakeAuthenticator),
            Arc::new(FakeSecrets::default()),
            Arc::new(FakeSettings::default()),
            builder.clone(),
            "evercore",
            "www.evernote.com",
            chrono::Duration::minutes(30),
        ));
        Arc::new(NoteStoreProvider::new(
            auth,
            local_store,
            builder,
            account(),
            chrono::Duration::minutes(30),
        ))
    }

    fn sender(note_store_provider: Arc<NoteStoreProvider>, local_store: Arc<dyn LocalStore>) -> Sender {
        Sender::new(
            note_store_provider,
            local_store,
            Arc::new(FakeSyncStateStorage {
                state: StdMutex::new(SyncState::zero()),
            }),
            account(),
            TransportParams::default(),
        )
    }

    fn canceler() -> Arc<dyn Canceler> {
        Arc::new(TokenCanceler::new())
    }

    fn progress() -> Arc<dyn ProgressCallback> {
        Arc::new(NoopProgress)
    }

    #[tokio::test]
    async fn uploads_new_note_with_new_notebook_and_tag() {
        let local_store: Arc<dyn LocalStore> = Arc::new(FakeLocalStore::default());
        let rpc = Arc::new(FakeRpc::plain());
        let note_store_provider = build_provider(rpc, local_store.clone());

        let notebook = Notebook::new("Inbox");
        local_store.put_notebook(&notebook).await.unwrap();

        let tag = Tag::new("work");
        local_store.put_tag(&tag).await.unwrap();

        let mut note = Note::new("Hello", notebook.local_id);
        note.tag_local_ids.push(tag.local_id);
        local_store.put_note(&note).await.unwrap();

        let sender = sender(note_store_provider, local_store.clone());
        let result = sender.run(canceler(), progress()).await.unwrap();

        assert_eq!(result.user_own.tags.succeeded, 1);
        assert_eq!(result.user_own.notebooks.succeeded, 1);
        assert_eq!(result.user_own.notes.succeeded, 1);

        let stored_note = local_store.find_note(note.local_id, NoteFetchOptions::metadata_only()).await.unwrap().unwrap();
        assert!(!stored_note.locally_modified);
        assert!(stored_note.guid.is_some());
        assert_eq!(stored_note.tag_guids.len(), 1);
    }

    #[tokio::test]
    async fn note_skipped_when_new_notebook_fails() {
        let local_store: Arc<dyn LocalStore> = Arc::new(FakeLocalStore::default());
        let rpc = Arc::new(FakeRpc {
            next_usn: AtomicI32::new(0),
            fail_tag_name: None,
            fail_new_notebook: true,
        });
        let note_store_provider = build_provider(rpc, local_store.clone());

        let notebook = Notebook::new("Inbox");
        local_store.put_notebook(&notebook).await.unwrap();
        let mut note = Note::new("Hello", notebook.local_id);
        note.locally_modified = true;
        local_store.put_note(&note).await.unwrap();

        let sender = sender(note_store_provider, local_store.clone());
        let result = sender.run(canceler(), progress()).await.unwrap();

        assert_eq!(result.user_own.notebooks.failures.len(), 1);
        assert_eq!(result.user_own.notes.failures.len(), 1);
        assert_eq!(result.user_own.notes.succeeded, 0);

        let stored_note = local_store.find_note(note.local_id, NoteFetchOptions::metadata_only()).await.unwrap().unwrap();
        assert!(stored_note.locally_modified, "failed note must keep locally_modified set");
    }

    #[tokio::test]
    async fn cascading_tag_failure_marks_child_failed_without_rpc() {
        let local_store: Arc<dyn LocalStore> = Arc::new(FakeLocalStore::default());
        let rpc = Arc::new(FakeRpc {
            next_usn: AtomicI32::new(0),
            fail_tag_name: Some("parent".to_string()),
            fail_new_notebook: false,
        });
        let note_store_provider = build_provider(rpc, local_store.clone());

        let parent = Tag::new("parent");
        local_store.put_tag(&parent).await.unwrap();
        let mut child = Tag::new("child");
        child.parent_tag_local_id = Some(parent.local_id);
        local_store.put_tag(&child).await.unwrap();

        let sender = sender(note_store_provider, local_store.clone());
        let result = sender.run(canceler(), progress()).await.unwrap();

        assert_eq!(result.user_own.tags.failures.len(), 2);
        assert_eq!(result.user_own.tags.succeeded, 0);
    }

    #[tokio::test]
    async fn usn_gap_sets_need_to_repeat_incremental_sync() {
        let local_store: Arc<dyn LocalStore> = Arc::new(FakeLocalStore::default());
        let rpc = Arc::new(FakeRpc {
            // First assigned usn will be 6, which is not last(0)+1, so the
            // gap is detected immediately.
            next_usn: AtomicI32::new(5),
            fail_tag_name: None,
            fail_new_notebook: false,
        });
        let note_store_provider = build_provider(rpc, local_store.clone());

        let search = SavedSearch::new("q", "tag:x");
        local_store.put_saved_search(&search).await.unwrap();

        let sender = sender(note_store_provider, local_store.clone());
        let result = sender.run(canceler(), progress()).await.unwrap();

        assert!(result.user_own.need_to_repeat_incremental_sync);
    }
}
