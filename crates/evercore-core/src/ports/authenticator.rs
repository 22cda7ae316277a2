//! Low-level authentication port
//!
//! A one-shot, uncached OAuth exchange. `evercore-auth`'s
//! `AuthenticationProvider` wraps an `Authenticator` with the caching and
//! about-to-expire policy described in the specification's §4.2; this trait
//! itself knows nothing about caching.

use async_trait::async_trait;

use crate::domain::{Account, AuthenticationInfo};
use crate::error::CoreResult;

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Drives an interactive login (browser-based OAuth) and returns the
    /// account it authenticated along with the resulting credentials.
    async fn authenticate_new_account(&self) -> CoreResult<(Account, AuthenticationInfo)>;

    /// Re-authenticates a previously known account without further user
    /// interaction, if the underlying flow supports it (e.g. refresh token).
    async fn authenticate_account(&self, account: &Account) -> CoreResult<AuthenticationInfo>;
}
