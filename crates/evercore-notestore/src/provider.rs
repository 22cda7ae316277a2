//! NoteStoreProvider
//!
//! Produces a configured [`RpcClient`] for user-owned or linked-notebook
//! operations (§4.3). Caching is keyed by scope: one slot for the user's
//! own note store, one [`dashmap::DashMap`] entry per linked notebook guid.
//! An entry is returned only if its authentication has not gone about to
//! expire and the request-context transport parameters match exactly what
//! the cached client was built with; otherwise a fresh client is built via
//! the injected [`NoteStoreClientBuilder`] using freshly authenticated
//! info, mirroring §4.3's cache-validity rule.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use evercore_auth::{AuthMode, AuthenticationProvider};
use evercore_core::domain::{
    Account, Guid, LinkedNotebook, LocalId, Note, Notebook, RequestContext, TransportParams,
};
use evercore_core::error::{CoreError, CoreResult};
use evercore_core::ports::local_store::NoteFetchOptions;
use evercore_core::ports::{LocalStore, RpcClient};
use tokio::sync::Mutex;
use tracing::debug;

use crate::factory::NoteStoreClientBuilder;

/// A cached client plus the parameters it was built with, so a later call
/// can tell whether it is still valid for the requested transport.
#[derive(Clone)]
struct CachedEntry {
    client: Arc<dyn RpcClient>,
    expires_at: DateTime<Utc>,
    transport: TransportParams,
}

impl CachedEntry {
    fn is_usable(&self, now: DateTime<Utc>, threshold: chrono::Duration, transport: &TransportParams) -> bool {
        self.expires_at - now >= threshold && self.transport == *transport
    }
}

/// Resolves and caches RPC clients for the user's own note store and for
/// every linked notebook the account has synced.
pub struct NoteStoreProvider {
    auth: Arc<AuthenticationProvider>,
    local_store: Arc<dyn LocalStore>,
    client_builder: Arc<dyn NoteStoreClientBuilder>,
    account: Account,
    about_to_expire_threshold: chrono::Duration,
    user_own: Mutex<Option<CachedEntry>>,
    linked: DashMap<String, CachedEntry>,
}

impl NoteStoreProvider {
    pub fn new(
        auth: Arc<AuthenticationProvider>,
        local_store: Arc<dyn LocalStore>,
        client_builder: Arc<dyn NoteStoreClientBuilder>,
        account: Account,
        about_to_expire_threshold: chrono::Duration,
    ) -> Self {
        Self {
            auth,
            local_store,
            client_builder,
            account,
            about_to_expire_threshold,
            user_own: Mutex::new(None),
            linked: DashMap::new(),
        }
    }

    /// Returns a client for the user's own note store, building and
    /// caching a fresh one if none is cached or the cached one no longer
    /// matches.
    pub async fn user_own_note_store(&self, transport: TransportParams) -> CoreResult<Arc<dyn RpcClient>> {
        {
            let guard = self.user_own.lock().await;
            if let Some(entry) = guard.as_ref() {
                if entry.is_usable(Utc::now(), self.about_to_expire_threshold, &transport) {
                    debug!("note store cache hit (user-own)");
                    return Ok(entry.client.clone());
                }
            }
        }

        let info = self.auth.authenticate_account(&self.account, AuthMode::Cache).await?;
        let context = RequestContext::new(info.auth_token.clone())
            .with_cookies(info.user_store_cookies.clone())
            .with_transport(transport.clone());
        let client = self.client_builder.build(&info.note_store_url, context).await?;

        let mut guard = self.user_own.lock().await;
        *guard = Some(CachedEntry {
            client: client.clone(),
            expires_at: info.token_expiration_time,
            transport,
        });
        Ok(client)
    }

    /// Returns a client authenticated against `linked_notebook`'s endpoint.
    pub async fn linked_notebook_note_store(
        &self,
        linked_notebook: &LinkedNotebook,
        transport: TransportParams,
    ) -> CoreResult<Arc<dyn RpcClient>> {
        let guid = linked_notebook
            .guid
            .clone()
            .ok_or_else(|| CoreError::InvalidArgument("linked notebook has no guid".to_string()))?;

        if let Some(entry) = self.linked.get(guid.as_str()) {
            if entry.is_usable(Utc::now(), self.about_to_expire_threshold, &transport) {
                debug!(guid = %guid, "note store cache hit (linked notebook)");
                return Ok(entry.client.clone());
            }
        }

        let info = self
            .auth
            .authenticate_to_linked_notebook(&self.account, linked_notebook, AuthMode::Cache)
            .await?;
        // `AuthenticationProvider` already backfills `note_store_url` from
        // the linked notebook record when the cache-restore path is taken
        // (§4.3), so `info.note_store_url` is authoritative here.
        let context = RequestContext::new(info.auth_token.clone()).with_transport(transport.clone());
        let client = self.client_builder.build(&info.note_store_url, context).await?;

        self.linked.insert(
            guid.as_str().to_string(),
            CachedEntry {
                client: client.clone(),
                expires_at: info.token_expiration_time,
                transport,
            },
        );
        Ok(client)
    }

    /// Resolves whether `notebook` belongs to a linked notebook and
    /// delegates to [`Self::linked_notebook_note_store`] or
    /// [`Self::user_own_note_store`] accordingly.
    pub async fn note_store_for_notebook(
        &self,
        notebook: &Notebook,
        transport: TransportParams,
    ) -> CoreResult<Arc<dyn RpcClient>> {
        match &notebook.owning_linked_notebook_guid {
            Some(guid) => {
                let linked_notebook = self.find_linked_notebook_by_guid(guid).await?;
                self.linked_notebook_note_store(&linked_notebook, transport).await
            }
            None => self.user_own_note_store(transport).await,
        }
    }

    pub async fn note_store_for_notebook_local_id(
        &self,
        local_id: LocalId,
        transport: TransportParams,
    ) -> CoreResult<Arc<dyn RpcClient>> {
        let notebook = self
            .local_store
            .find_notebook(local_id)
            .await
            .map_err(|e| CoreError::RuntimeError(e.to_string()))?
            .ok_or_else(|| CoreError::RuntimeError(format!("notebook {local_id} not found locally")))?;
        self.note_store_for_notebook(&notebook, transport).await
    }

    pub async fn note_store_for_notebook_guid(
        &self,
        guid: &Guid,
        transport: TransportParams,
    ) -> CoreResult<Arc<dyn RpcClient>> {
        let notebook = self
            .local_store
            .find_notebook_by_guid(guid)
            .await
            .map_err(|e| CoreError::RuntimeError(e.to_string()))?
            .ok_or_else(|| CoreError::RuntimeError(format!("notebook {guid} not found locally")))?;
        self.note_store_for_notebook(&notebook, transport).await
    }

    /// Resolves the owning notebook first, then delegates.
    pub async fn note_store_for_note_local_id(
        &self,
        local_id: LocalId,
        transport: TransportParams,
    ) -> CoreResult<Arc<dyn RpcClient>> {
        let note = self
            .local_store
            .find_note(local_id, NoteFetchOptions::metadata_only())
            .await
            .map_err(|e| CoreError::RuntimeError(e.to_string()))?
            .ok_or_else(|| CoreError::RuntimeError(format!("note {local_id} not found locally")))?;
        self.note_store_for_note(&note, transport).await
    }

    pub async fn note_store_for_note_guid(
        &self,
        guid: &Guid,
        transport: TransportParams,
    ) -> CoreResult<Arc<dyn RpcClient>> {
        let note = self
            .local_store
            .find_note_by_guid(guid, NoteFetchOptions::metadata_only())
            .await
            .map_err(|e| CoreError::RuntimeError(e.to_string()))?
            .ok_or_else(|| CoreError::RuntimeError(format!("note {guid} not found locally")))?;
        self.note_store_for_note(&note, transport).await
    }

    async fn note_store_for_note(&self, note: &Note, transport: TransportParams) -> CoreResult<Arc<dyn RpcClient>> {
        self.note_store_for_notebook_local_id(note.notebook_local_id, transport).await
    }

    async fn find_linked_notebook_by_guid(&self, guid: &Guid) -> CoreResult<LinkedNotebook> {
        self.local_store
            .find_linked_notebook_by_guid(guid)
            .await
            .map_err(|e| CoreError::RuntimeError(e.to_string()))?
            .ok_or_else(|| CoreError::RuntimeError(format!("linked notebook {guid} not found locally")))
    }

    /// Drops every cached client. Used after `clear_caches` on the
    /// authentication provider, or in tests that need to force a rebuild.
    pub async fn clear_caches(&self) {
        *self.user_own.lock().await = None;
        self.linked.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use evercore_core::domain::{AuthenticationInfo, Cookie, Guid, Usn};
    use evercore_core::error::CoreResult as Res;
    use evercore_core::ports::rpc_client::{RpcSyncChunkFilter, RpcSyncState, SharedNotebookAuth};
    use evercore_core::ports::{Authenticator, NoteStoreClientFactory};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRpc;

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
        async fn create_notebook(&self, _n: &Notebook) -> Res<Notebook> {
            unimplemented!()
        }
        async fn update_notebook(&self, _n: &Notebook) -> Res<Usn> {
            unimplemented!()
        }
        async fn create_tag(&self, _t: &evercore_core::domain::Tag) -> Res<evercore_core::domain::Tag> {
            unimplemented!()
        }
        async fn update_tag(&self, _t: &evercore_core::domain::Tag) -> Res<Usn> {
            unimplemented!()
        }
        async fn create_saved_search(
            &self,
            _s: &evercore_core::domain::SavedSearch,
        ) -> Res<evercore_core::domain::SavedSearch> {
            unimplemented!()
        }
        async fn update_saved_search(&self, _s: &evercore_core::domain::SavedSearch) -> Res<Usn> {
            unimplemented!()
        }
        async fn create_note(&self, _n: &Note) -> Res<Note> {
            unimplemented!()
        }
        async fn update_note(&self, _n: &Note) -> Res<Usn> {
            unimplemented!()
        }
        async fn get_note_with_result_spec(&self, _guid: &Guid, _options: NoteFetchOptions) -> Res<Note> {
            unimplemented!()
        }
        async fn get_resource(
            &self,
            _guid: &Guid,
            _with_binary_data: bool,
        ) -> Res<evercore_core::domain::Resource> {
            unimplemented!()
        }
    }

    struct FakeBuilder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl NoteStoreClientBuilder for FakeBuilder {
        async fn build(&self, _note_store_url: &str, _context: RequestContext) -> CoreResult<Arc<dyn RpcClient>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FakeRpc))
        }
    }

    #[async_trait]
    impl NoteStoreClientFactory for FakeBuilder {
        async fn client_for_note_store_url(
            &self,
            note_store_url: &str,
            auth_token: &str,
        ) -> CoreResult<Arc<dyn RpcClient>> {
            self.build(note_store_url, RequestContext::new(auth_token)).await
        }
    }

    struct FakeAuthenticator;

    #[async_trait]
    impl Authenticator for FakeAuthenticator {
        async fn authenticate_new_account(&self) -> CoreResult<(Account, AuthenticationInfo)> {
            unimplemented!()
        }
        async fn authenticate_account(&self, account: &Account) -> CoreResult<AuthenticationInfo> {
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
    struct FakeSettings(std::sync::Mutex<std::collections::HashMap<(String, String), String>>);

    #[async_trait]
    impl evercore_core::ports::SettingsStore for FakeSettings {
        async fn get(&self, section: &str, key: &str) -> anyhow::Result<Option<String>> {
            Ok(self.0.lock().unwrap().get(&(section.to_string(), key.to_string())).cloned())
        }
        async fn set(&self, section: &str, key: &str, value: &str) -> anyhow::Result<()> {
            self.0
                .lock()
                .unwrap()
                .insert((section.to_string(), key.to_string()), value.to_string());
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
    struct FakeSecrets(std::sync::Mutex<std::collections::HashMap<(String, String), String>>);

    #[async_trait]
    impl evercore_core::ports::SecretStore for FakeSecrets {
        async fn read_password(
            &self,
            service: &str,
            key: &str,
        ) -> Result<String, evercore_core::ports::SecretStoreError> {
            self.0
                .lock()
                .unwrap()
                .get(&(service.to_string(), key.to_string()))
                .cloned()
                .ok_or_else(|| evercore_core::ports::SecretStoreError::EntryNotFound(key.to_string()))
        }
        async fn write_password(
            &self,
            service: &str,
            key: &str,
            value: &str,
        ) -> Result<(), evercore_core::ports::SecretStoreError> {
            self.0
                .lock()
                .unwrap()
                .insert((service.to_string(), key.to_string()), value.to_string());
            Ok(())
        }
        async fn delete_password(&self, _service: &str, _key: &str) -> Result<(), evercore_core::ports::SecretStoreError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeLocalStore;

    #[async_trait]
    impl LocalStore for FakeLocalStore {
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
            Ok(vec![])
        }
        async fn expunge_notebook(&self, _guid: &Guid) -> anyhow::Result<()> {
            Ok(())
        }
        async fn put_tag(&self, _t: &evercore_core::domain::Tag) -> anyhow::Result<()> {
            Ok(())
        }
        async fn find_tag(&self, _local_id: LocalId) -> anyhow::Result<Option<evercore_core::domain::Tag>> {
            Ok(None)
        }
        async fn find_tag_by_guid(&self, _guid: &Guid) -> anyhow::Result<Option<evercore_core::domain::Tag>> {
            Ok(None)
        }
        async fn list_tags(&self) -> anyhow::Result<Vec<evercore_core::domain::Tag>> {
            Ok(vec![])
        }
        async fn expunge_tag(&self, _guid: &Guid) -> anyhow::Result<()> {
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
        async fn put_linked_notebook(&self, _l: &LinkedNotebook) -> anyhow::Result<()> {
            Ok(())
        }
        async fn find_linked_notebook(&self, _local_id: LocalId) -> anyhow::Result<Option<LinkedNotebook>> {
            Ok(None)
        }
        async fn find_linked_notebook_by_guid(&self, _guid: &Guid) -> anyhow::Result<Option<LinkedNotebook>> {
            Ok(None)
        }
        async fn list_linked_notebooks(&self) -> anyhow::Result<Vec<LinkedNotebook>> {
            Ok(vec![])
        }
        async fn expunge_linked_notebook(&self, _guid: &Guid) -> anyhow::Result<()> {
            Ok(())
        }
        async fn put_note(&self, _n: &Note) -> anyhow::Result<()> {
            Ok(())
        }
        async fn find_note(&self, _local_id: LocalId, _options: NoteFetchOptions) -> anyhow::Result<Option<Note>> {
            Ok(None)
        }
        async fn find_note_by_guid(&self, _guid: &Guid, _options: NoteFetchOptions) -> anyhow::Result<Option<Note>> {
            Ok(None)
        }
        async fn list_notes(
            &self,
            _options: evercore_core::ports::local_store::NoteListOptions,
        ) -> anyhow::Result<Vec<Note>> {
            Ok(vec![])
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

    fn build_provider(builder: Arc<FakeBuilder>) -> NoteStoreProvider {
        let auth = Arc::new(AuthenticationProvider::new(
            Arc::new(FakeAuthenticator),
            Arc::new(FakeSecrets::default()),
            Arc::new(FakeSettings::default()),
            builder.clone(),
            "evercore",
            "www.evernote.com",
            chrono::Duration::minutes(30),
        ));
        NoteStoreProvider::new(
            auth,
            Arc::new(FakeLocalStore),
            builder,
            Account::new(1, "www.evernote.com", "alice"),
            chrono::Duration::minutes(30),
        )
    }

    #[tokio::test]
    async fn user_own_note_store_is_cached_across_calls() {
        let builder = Arc::new(FakeBuilder {
            calls: AtomicUsize::new(0),
        });
        let provider = build_provider(builder.clone());

        provider.user_own_note_store(TransportParams::default()).await.unwrap();
        provider.user_own_note_store(TransportParams::default()).await.unwrap();

        assert_eq!(builder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_transport_params_force_a_rebuild() {
        let builder = Arc::new(FakeBuilder {
            calls: AtomicUsize::new(0),
        });
        let provider = build_provider(builder.clone());

        provider.user_own_note_store(TransportParams::default()).await.unwrap();
        provider
            .user_own_note_store(TransportParams {
                retry_count: 9,
                ..TransportParams::default()
            })
            .await
            .unwrap();

        assert_eq!(builder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn clear_caches_forces_rebuild() {
        let builder = Arc::new(FakeBuilder {
            calls: AtomicUsize::new(0),
        });
        let provider = build_provider(builder.clone());

        provider.user_own_note_store(TransportParams::default()).await.unwrap();
        provider.clear_caches().await;
        provider.user_own_note_store(TransportParams::default()).await.unwrap();

        assert_eq!(builder.calls.load(Ordering::SeqCst), 2);
    }
}
