//! Secret store port
//!
//! Stores auth tokens and shard ids outside the plain settings store -
//! backed by the OS keychain in the reference adapter, but the trait itself
//! has no knowledge of that.

use async_trait::async_trait;
use thiserror::Error;

/// Errors a secret store implementation can report. Kept narrow so callers
/// can distinguish "nothing stored yet" from everything else.
#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("no entry found for key {0}")]
    EntryNotFound(String),

    #[error("secret store error: {0}")]
    Other(String),
}

/// Port for storing and retrieving secret strings keyed by an opaque
/// service/key pair. `evercore-auth` builds the actual key strings (see its
/// key-naming scheme); this trait only knows about already-formed keys.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn read_password(&self, service: &str, key: &str) -> Result<String, SecretStoreError>;

    async fn write_password(
        &self,
        service: &str,
        key: &str,
        value: &str,
    ) -> Result<(), SecretStoreError>;

    async fn delete_password(&self, service: &str, key: &str) -> Result<(), SecretStoreError>;
}
