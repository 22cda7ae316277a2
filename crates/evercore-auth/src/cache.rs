//! In-memory authentication caches
//!
//! Two independently-locked maps, exactly as described in the
//! specification's §4.2/§5 shared-resource policy: reads take the read
//! lock, cache population and invalidation take the write lock.

use std::collections::HashMap;

use evercore_core::domain::{Account, AuthenticationInfo, LinkedNotebookAuthInfo};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct AuthenticationCache {
    user_accounts: RwLock<HashMap<i32, (Account, AuthenticationInfo)>>,
    linked_notebooks: RwLock<HashMap<String, (Account, LinkedNotebookAuthInfo)>>,
}

impl AuthenticationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_user(&self, user_id: i32) -> Option<(Account, AuthenticationInfo)> {
        self.user_accounts.read().await.get(&user_id).cloned()
    }

    pub async fn put_user(&self, user_id: i32, account: Account, info: AuthenticationInfo) {
        self.user_accounts
            .write()
            .await
            .insert(user_id, (account, info));
    }

    pub async fn remove_user(&self, user_id: i32) {
        self.user_accounts.write().await.remove(&user_id);
    }

    pub async fn clear_all_users(&self) {
        self.user_accounts.write().await.clear();
    }

    pub async fn get_linked_notebook(
        &self,
        guid: &str,
    ) -> Option<(Account, LinkedNotebookAuthInfo)> {
        self.linked_notebooks.read().await.get(guid).cloned()
    }

    pub async fn put_linked_notebook(
        &self,
        guid: String,
        account: Account,
        info: LinkedNotebookAuthInfo,
    ) {
        self.linked_notebooks
            .write()
            .await
            .insert(guid, (account, info));
    }

    /// Removes and returns the evicted entry, so a caller that needs the
    /// owning account (e.g. to derive secret-store/settings keys) doesn't
    /// have to look it up separately.
    pub async fn remove_linked_notebook(&self, guid: &str) -> Option<(Account, LinkedNotebookAuthInfo)> {
        self.linked_notebooks.write().await.remove(guid)
    }

    pub async fn clear_all_linked_notebooks(&self) {
        self.linked_notebooks.write().await.clear();
    }

    pub async fn clear_all(&self) {
        self.clear_all_users().await;
        self.clear_all_linked_notebooks().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn info(user_id: i32) -> AuthenticationInfo {
        AuthenticationInfo {
            user_id,
            auth_token: "tok".into(),
            shard_id: "s1".into(),
            note_store_url: "https://example.com/notestore".into(),
            web_api_url_prefix: "https://example.com/".into(),
            token_expiration_time: Utc::now() + chrono::Duration::hours(1),
            authentication_time: Utc::now(),
            user_store_cookies: vec![],
        }
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let cache = AuthenticationCache::new();
        let account = Account::new(1, "www.evernote.com", "alice");
        cache.put_user(1, account.clone(), info(1)).await;

        let (cached_account, cached_info) = cache.get_user(1).await.expect("present");
        assert_eq!(cached_account, account);
        assert_eq!(cached_info.auth_token, "tok");
    }

    #[tokio::test]
    async fn remove_user_evicts_entry() {
        let cache = AuthenticationCache::new();
        cache
            .put_user(1, Account::new(1, "www.evernote.com", "alice"), info(1))
            .await;
        cache.remove_user(1).await;
        assert!(cache.get_user(1).await.is_none());
    }
}
