//! Account identity and authentication snapshots
//!
//! `Account` is the key under which all persistent sync state and
//! authentication caches are addressed. `AuthenticationInfo` and
//! `LinkedNotebookAuthInfo` are immutable snapshots produced by a
//! successful authentication call; they carry secret fields (`auth_token`,
//! `shard_id`) that adapters must route through the secret store rather
//! than the plain settings store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::Guid;

/// Identity of a synchronized account: an Evernote user on a given service
/// host. This is the key for all persistent state (`SyncState`,
/// authentication caches, settings-store sections).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub user_id: i32,
    pub evernote_host: String,
    pub username: String,
    pub display_name: Option<String>,
}

impl Account {
    pub fn new(user_id: i32, evernote_host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id,
            evernote_host: evernote_host.into(),
            username: username.into(),
            display_name: None,
        }
    }

    /// Evernote accounts are the only ones this core can authenticate.
    /// A caller that passes some other provider's account is a programmer
    /// error (`CoreError::InvalidArgument`), checked by callers of this type.
    pub fn is_evernote_account(&self) -> bool {
        !self.evernote_host.is_empty()
    }
}

/// A single HTTP cookie observed during authentication.
///
/// Only cookies whose name matches `web*PreUserGuid` are persisted and
/// replayed on subsequent requests (§4.2); all others are dropped before
/// reaching the settings store. This filtering happens in the
/// `evercore-auth` adapter, not here - this type is just the carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Matches the `web*PreUserGuid` persistence pattern from §4.2.
    pub fn should_persist(&self) -> bool {
        self.name.starts_with("web") && self.name.ends_with("PreUserGuid")
    }
}

/// Immutable snapshot of authentication for the user's own account.
///
/// Produced once by the OAuth flow or the cached-credentials path; never
/// mutated afterward. `auth_token` and `shard_id` are secret; everything
/// else is non-secret metadata persisted in the settings store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationInfo {
    pub user_id: i32,
    pub auth_token: String,
    pub shard_id: String,
    pub note_store_url: String,
    pub web_api_url_prefix: String,
    pub token_expiration_time: DateTime<Utc>,
    pub authentication_time: DateTime<Utc>,
    pub user_store_cookies: Vec<Cookie>,
}

impl AuthenticationInfo {
    /// True when `expiration - now < threshold`, the predicate used
    /// everywhere token selection decides between "serve from cache" and
    /// "re-authenticate" (§4.2 "About-to-expire").
    pub fn is_about_to_expire(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        self.token_expiration_time - now < threshold
    }
}

/// Same shape as [`AuthenticationInfo`], additionally bound to the linked
/// notebook it authenticates access to. `shard_id` and `note_store_url`
/// may be taken directly from the linked notebook record rather than an
/// RPC response (§3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedNotebookAuthInfo {
    pub linked_notebook_guid: Guid,
    pub user_id: i32,
    pub auth_token: String,
    pub shard_id: String,
    pub note_store_url: String,
    pub web_api_url_prefix: String,
    pub token_expiration_time: DateTime<Utc>,
    pub authentication_time: DateTime<Utc>,
}

impl LinkedNotebookAuthInfo {
    pub fn is_about_to_expire(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        self.token_expiration_time - now < threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(expires_in_minutes: i64) -> AuthenticationInfo {
        let now = Utc::now();
        AuthenticationInfo {
            user_id: 1,
            auth_token: "tok".into(),
            shard_id: "s1".into(),
            note_store_url: "https://example.com/notestore".into(),
            web_api_url_prefix: "https://example.com/".into(),
            token_expiration_time: now + chrono::Duration::minutes(expires_in_minutes),
            authentication_time: now,
            user_store_cookies: vec![],
        }
    }

    #[test]
    fn about_to_expire_threshold_boundary() {
        let threshold = chrono::Duration::minutes(30);
        let now = Utc::now();

        let expiring_soon = info(29);
        assert!(expiring_soon.is_about_to_expire(now, threshold));

        let still_fresh = info(31);
        assert!(!still_fresh.is_about_to_expire(now, threshold));
    }

    #[test]
    fn cookie_persistence_filter() {
        assert!(Cookie::new("webAPreUserGuid", "x").should_persist());
        assert!(!Cookie::new("webB", "y").should_persist());
        assert!(!Cookie::new("session", "z").should_persist());
    }

    #[test]
    fn account_requires_host() {
        let acc = Account::new(1, "www.evernote.com", "alice");
        assert!(acc.is_evernote_account());
        let bad = Account::new(1, "", "alice");
        assert!(!bad.is_evernote_account());
    }
}
