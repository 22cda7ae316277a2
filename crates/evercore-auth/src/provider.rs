//! AuthenticationProvider
//!
//! Produces a valid `AuthenticationInfo` for the user's own account and for
//! each linked notebook, per the caching and about-to-expire policy: an
//! in-memory cache backed by the settings store for non-secret metadata and
//! the secret store for tokens, with an interactive OAuth fallback.

use std::sync::Arc;

use chrono::{Duration, Utc};
use evercore_core::domain::{Account, AuthenticationInfo, Cookie, LinkedNotebook, LinkedNotebookAuthInfo};
use evercore_core::error::{CoreError, CoreResult};
use evercore_core::ports::{Authenticator, NoteStoreClientFactory, SecretStore, SettingsStore};
use tracing::{info, warn};

use crate::cache::AuthenticationCache;
use crate::keys;

/// Controls whether `authenticate_account`/`authenticate_to_linked_notebook`
/// may be served from the in-memory/settings/secret-store caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Cache,
    NoCache,
}

/// Selects which cache entries `clear_caches` removes.
#[derive(Debug, Clone)]
pub enum ClearCachesSelector {
    All,
    AllUsers,
    AllLinkedNotebooks,
    User(i32),
    LinkedNotebook(String),
}

pub struct AuthenticationProvider {
    authenticator: Arc<dyn Authenticator>,
    secret_store: Arc<dyn SecretStore>,
    settings_store: Arc<dyn SettingsStore>,
    client_factory: Arc<dyn NoteStoreClientFactory>,
    cache: AuthenticationCache,
    app_name: String,
    host: String,
    about_to_expire_threshold: Duration,
}

impl AuthenticationProvider {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        secret_store: Arc<dyn SecretStore>,
        settings_store: Arc<dyn SettingsStore>,
        client_factory: Arc<dyn NoteStoreClientFactory>,
        app_name: impl Into<String>,
        host: impl Into<String>,
        about_to_expire_threshold: Duration,
    ) -> Self {
        Self {
            authenticator,
            secret_store,
            settings_store,
            client_factory,
            cache: AuthenticationCache::new(),
            app_name: app_name.into(),
            host: host.into(),
            about_to_expire_threshold,
        }
    }

    /// Drives the interactive OAuth handshake, resolves the authenticated
    /// user's account, persists the result, and caches it in memory.
    /// Persistence failures are logged, never surfaced to the caller.
    pub async fn authenticate_new_account(&self) -> CoreResult<(Account, AuthenticationInfo)> {
        let (account, info) = self.authenticator.authenticate_new_account().await?;

        if let Err(e) = self.persist(&account, &info).await {
            warn!("failed to persist new account authentication info: {}", e);
        }
        self.cache.put_user(account.user_id, account.clone(), info.clone()).await;

        info!("authenticated new account user_id={}", account.user_id);
        Ok((account, info))
    }

    /// Produces a valid `AuthenticationInfo` for an already-known account.
    pub async fn authenticate_account(
        &self,
        account: &Account,
        mode: AuthMode,
    ) -> CoreResult<AuthenticationInfo> {
        if !account.is_evernote_account() {
            return Err(CoreError::InvalidArgument(
                "account is not an evernote account".to_string(),
            ));
        }

        if mode == AuthMode::Cache {
            if let Some((_, cached)) = self.cache.get_user(account.user_id).await {
                if !cached.is_about_to_expire(Utc::now(), self.about_to_expire_threshold) {
                    return Ok(cached);
                }
            }

            if let Some(info) = self.read_user_from_storage(account).await {
                if !info.is_about_to_expire(Utc::now(), self.about_to_expire_threshold) {
                    self.cache
                        .put_user(account.user_id, account.clone(), info.clone())
                        .await;
                    return Ok(info);
                }
            }
        }

        let info = self.authenticator.authenticate_account(account).await?;
        if let Err(e) = self.persist(account, &info).await {
            warn!("failed to persist authentication info: {}", e);
        }
        self.cache
            .put_user(account.user_id, account.clone(), info.clone())
            .await;
        Ok(info)
    }

    /// Produces a valid `LinkedNotebookAuthInfo` for `linked_notebook`.
    pub async fn authenticate_to_linked_notebook(
        &self,
        account: &Account,
        linked_notebook: &LinkedNotebook,
        mode: AuthMode,
    ) -> CoreResult<LinkedNotebookAuthInfo> {
        let guid = linked_notebook.guid.clone().ok_or_else(|| {
            CoreError::InvalidArgument("linked notebook has no guid".to_string())
        })?;

        // Documented public-notebook quirk (§9 open questions): the server
        // accepts the user's own token for public notebooks in practice,
        // though the documentation describes them as tokenless.
        if linked_notebook.is_public() {
            let own_info = self.authenticate_account(account, AuthMode::Cache).await?;
            return Ok(LinkedNotebookAuthInfo {
                linked_notebook_guid: guid,
                user_id: own_info.user_id,
                auth_token: own_info.auth_token,
                shard_id: own_info.shard_id,
                note_store_url: own_info.note_store_url,
                web_api_url_prefix: own_info.web_api_url_prefix,
                token_expiration_time: own_info.token_expiration_time,
                authentication_time: own_info.authentication_time,
            });
        }

        if mode == AuthMode::Cache {
            if let Some((_, cached)) = self.cache.get_linked_notebook(guid.as_str()).await {
                let matches_notebook = linked_notebook
                    .note_store_url
                    .as_deref()
                    .map(|url| url == cached.note_store_url)
                    .unwrap_or(true)
                    && cached.user_id == account.user_id;
                if matches_notebook
                    && !cached.is_about_to_expire(Utc::now(), self.about_to_expire_threshold)
                {
                    return Ok(cached);
                }
            }

            if let Some(info) = self.read_linked_notebook_from_storage(account, linked_notebook, &guid).await {
                if !info.is_about_to_expire(Utc::now(), self.about_to_expire_threshold) {
                    self.cache
                        .put_linked_notebook(guid.as_str().to_string(), account.clone(), info.clone())
                        .await;
                    return Ok(info);
                }
            }
        }

        let own_info = self.authenticate_account(account, AuthMode::Cache).await?;
        let note_store_url = linked_notebook.note_store_url.clone().ok_or_else(|| {
            CoreError::InvalidArgument("linked notebook has no note store url".to_string())
        })?;

        let client = self
            .client_factory
            .client_for_note_store_url(&note_store_url, &own_info.auth_token)
            .await?;

        let shared_auth = client
            .authenticate_to_shared_notebook(&linked_notebook.shared_notebook_global_id)
            .await?;

        let info = LinkedNotebookAuthInfo {
            linked_notebook_guid: guid.clone(),
            user_id: own_info.user_id,
            auth_token: shared_auth.auth_token,
            shard_id: shared_auth.shard_id,
            note_store_url: if shared_auth.note_store_url.is_empty() {
                note_store_url
            } else {
                shared_auth.note_store_url
            },
            web_api_url_prefix: shared_auth.web_api_url_prefix,
            token_expiration_time: shared_auth.expiration_time,
            authentication_time: Utc::now(),
        };

        if let Err(e) = self.persist_linked_notebook(account, &info).await {
            warn!("failed to persist linked notebook authentication info: {}", e);
        }
        self.cache
            .put_linked_notebook(guid.as_str().to_string(), account.clone(), info.clone())
            .await;
        Ok(info)
    }

    pub async fn clear_caches(&self, selector: ClearCachesSelector) {
        match selector {
            ClearCachesSelector::All => {
                self.cache.clear_all().await;
            }
            ClearCachesSelector::AllUsers => {
                self.cache.clear_all_users().await;
            }
            ClearCachesSelector::AllLinkedNotebooks => {
                self.cache.clear_all_linked_notebooks().await;
            }
            ClearCachesSelector::User(user_id) => {
                self.cache.remove_user(user_id).await;
                let (service, key) = keys::auth_token_key(&self.app_name, &self.host, user_id);
                self.delete_secret(&service, &key).await;
                let (service, key) = keys::shard_id_key(&self.app_name, &self.host, user_id);
                self.delete_secret(&service, &key).await;
                let section = keys::auth_section(&self.host, user_id);
                if let Err(e) = self.settings_store.clear_section(&section).await {
                    warn!("failed to clear settings section {}: {}", section, e);
                }
            }
            ClearCachesSelector::LinkedNotebook(guid) => {
                let evicted = self.cache.remove_linked_notebook(&guid).await;
                if let Some((account, _)) = evicted {
                    let (service, key) = keys::linked_notebook_auth_token_key(
                        &self.app_name,
                        &self.host,
                        account.user_id,
                        &guid,
                    );
                    self.delete_secret(&service, &key).await;

                    let section = keys::auth_section(&self.host, account.user_id);
                    if let Err(e) = self
                        .settings_store
                        .remove(&section, &keys::linked_notebook_expiration_timestamp_key(&guid))
                        .await
                    {
                        warn!("failed to clear linked notebook expiration setting for {}: {}", guid, e);
                    }
                    if let Err(e) = self
                        .settings_store
                        .remove(&section, &keys::linked_notebook_authentication_timestamp_key(&guid))
                        .await
                    {
                        warn!("failed to clear linked notebook authentication setting for {}: {}", guid, e);
                    }
                } else {
                    warn!(
                        guid = %guid,
                        "clearing linked notebook cache with no in-memory entry; its account is unknown so \
                         secret-store/settings keys cannot be targeted directly, clear via ClearCachesSelector::User instead"
                    );
                }
            }
        }
    }

    async fn persist(&self, account: &Account, info: &AuthenticationInfo) -> anyhow::Result<()> {
        let section = keys::auth_section(&self.host, account.user_id);
        self.settings_store
            .set(&section, keys::NOTE_STORE_URL, &info.note_store_url)
            .await?;
        self.settings_store
            .set(&section, keys::WEB_API_URL_PREFIX, &info.web_api_url_prefix)
            .await?;
        self.settings_store
            .set(
                &section,
                keys::EXPIRATION_TIMESTAMP,
                &info.token_expiration_time.timestamp_millis().to_string(),
            )
            .await?;
        self.settings_store
            .set(
                &section,
                keys::AUTHENTICATION_TIMESTAMP,
                &info.authentication_time.timestamp_millis().to_string(),
            )
            .await?;

        if let Some(cookie) = info.user_store_cookies.iter().find(|c| c.should_persist()) {
            self.settings_store
                .set(&section, keys::USER_STORE_COOKIE, &cookie.value)
                .await?;
        }

        let (service, key) = keys::auth_token_key(&self.app_name, &self.host, account.user_id);
        self.secret_store.write_password(&service, &key, &info.auth_token).await?;

        let (service, key) = keys::shard_id_key(&self.app_name, &self.host, account.user_id);
        self.secret_store.write_password(&service, &key, &info.shard_id).await?;

        Ok(())
    }

    async fn persist_linked_notebook(
        &self,
        account: &Account,
        info: &LinkedNotebookAuthInfo,
    ) -> anyhow::Result<()> {
        let section = keys::auth_section(&self.host, account.user_id);
        let guid = info.linked_notebook_guid.as_str();
        self.settings_store
            .set(
                &section,
                &keys::linked_notebook_expiration_timestamp_key(guid),
                &info.token_expiration_time.timestamp_millis().to_string(),
            )
            .await?;
        self.settings_store
            .set(
                &section,
                &keys::linked_notebook_authentication_timestamp_key(guid),
                &info.authentication_time.timestamp_millis().to_string(),
            )
            .await?;

        let (service, key) = keys::linked_notebook_auth_token_key(
            &self.app_name,
            &self.host,
            account.user_id,
            guid,
        );
        self.secret_store.write_password(&service, &key, &info.auth_token).await?;
        Ok(())
    }

    async fn read_user_from_storage(&self, account: &Account) -> Option<AuthenticationInfo> {
        let section = keys::auth_section(&self.host, account.user_id);

        let note_store_url = self.settings_store.get(&section, keys::NOTE_STORE_URL).await.ok()??;
        let web_api_url_prefix = self
            .settings_store
            .get(&section, keys::WEB_API_URL_PREFIX)
            .await
            .ok()?
            .unwrap_or_default();
        let expiration_ms: i64 = self
            .settings_store
            .get(&section, keys::EXPIRATION_TIMESTAMP)
            .await
            .ok()??
            .parse()
            .ok()?;
        let authentication_ms: i64 = self
            .settings_store
            .get(&section, keys::AUTHENTICATION_TIMESTAMP)
            .await
            .ok()??
            .parse()
            .ok()?;

        let (auth_token_service, auth_token_key) =
            keys::auth_token_key(&self.app_name, &self.host, account.user_id);
        let (shard_id_service, shard_id_key) =
            keys::shard_id_key(&self.app_name, &self.host, account.user_id);

        let (auth_token, shard_id) = tokio::join!(
            self.secret_store.read_password(&auth_token_service, &auth_token_key),
            self.secret_store.read_password(&shard_id_service, &shard_id_key)
        );
        let auth_token = auth_token.ok()?;
        let shard_id = shard_id.ok()?;

        let cookie_value = self
            .settings_store
            .get(&section, keys::USER_STORE_COOKIE)
            .await
            .ok()
            .flatten();

        Some(AuthenticationInfo {
            user_id: account.user_id,
            auth_token,
            shard_id,
            note_store_url,
            web_api_url_prefix,
            token_expiration_time: chrono::DateTime::from_timestamp_millis(expiration_ms)?,
            authentication_time: chrono::DateTime::from_timestamp_millis(authentication_ms)?,
            user_store_cookies: cookie_value
                .map(|v| vec![Cookie::new("webAPreUserGuid", v)])
                .unwrap_or_default(),
        })
    }

    async fn read_linked_notebook_from_storage(
        &self,
        account: &Account,
        linked_notebook: &LinkedNotebook,
        guid: &evercore_core::domain::Guid,
    ) -> Option<LinkedNotebookAuthInfo> {
        let section = keys::auth_section(&self.host, account.user_id);
        let expiration_ms: i64 = self
            .settings_store
            .get(
                &section,
                &keys::linked_notebook_expiration_timestamp_key(guid.as_str()),
            )
            .await
            .ok()??
            .parse()
            .ok()?;
        let authentication_ms: i64 = self
            .settings_store
            .get(
                &section,
                &keys::linked_notebook_authentication_timestamp_key(guid.as_str()),
            )
            .await
            .ok()??
            .parse()
            .ok()?;

        let (service, key) = keys::linked_notebook_auth_token_key(
            &self.app_name,
            &self.host,
            account.user_id,
            guid.as_str(),
        );
        let auth_token = self.secret_store.read_password(&service, &key).await.ok()?;

        // §4.2: "shard_id and note_store_url may come from the linked
        // notebook record itself rather than an RPC" - the cache-restore
        // path backfills both from the entity in scope at the call site
        // instead of leaving them blank. `web_api_url_prefix` has no
        // counterpart on `LinkedNotebook` and stays empty here; it is only
        // ever populated by a live `authenticate_to_shared_notebook` call.
        Some(LinkedNotebookAuthInfo {
            linked_notebook_guid: guid.clone(),
            user_id: account.user_id,
            auth_token,
            shard_id: linked_notebook.shard_id.clone().unwrap_or_default(),
            note_store_url: linked_notebook.note_store_url.clone().unwrap_or_default(),
            web_api_url_prefix: String::new(),
            token_expiration_time: chrono::DateTime::from_timestamp_millis(expiration_ms)?,
            authentication_time: chrono::DateTime::from_timestamp_millis(authentication_ms)?,
        })
    }

    async fn delete_secret(&self, service: &str, key: &str) {
        if let Err(e) = self.secret_store.delete_password(service, key).await {
            warn!("failed to delete secret {}/{}: {}", service, key, e);
        }
    }
}
