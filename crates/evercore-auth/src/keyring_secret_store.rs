//! Secret store backed by the OS keychain via the `keyring` crate.

use async_trait::async_trait;
use evercore_core::ports::{SecretStore, SecretStoreError};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct KeyringSecretStore;

#[async_trait]
impl SecretStore for KeyringSecretStore {
    async fn read_password(&self, service: &str, key: &str) -> Result<String, SecretStoreError> {
        let service = service.to_string();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &key)
                .map_err(|e| SecretStoreError::Other(e.to_string()))?;
            match entry.get_password() {
                Ok(password) => Ok(password),
                Err(keyring::Error::NoEntry) => Err(SecretStoreError::EntryNotFound(key)),
                Err(e) => Err(SecretStoreError::Other(e.to_string())),
            }
        })
        .await
        .map_err(|e| SecretStoreError::Other(e.to_string()))?
    }

    async fn write_password(
        &self,
        service: &str,
        key: &str,
        value: &str,
    ) -> Result<(), SecretStoreError> {
        let service = service.to_string();
        let key = key.to_string();
        let value = value.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &key)
                .map_err(|e| SecretStoreError::Other(e.to_string()))?;
            entry
                .set_password(&value)
                .map_err(|e| SecretStoreError::Other(e.to_string()))?;
            debug!("wrote secret for service={} key={}", service, key);
            Ok(())
        })
        .await
        .map_err(|e| SecretStoreError::Other(e.to_string()))?
    }

    async fn delete_password(&self, service: &str, key: &str) -> Result<(), SecretStoreError> {
        let service = service.to_string();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &key)
                .map_err(|e| SecretStoreError::Other(e.to_string()))?;
            match entry.delete_credential() {
                Ok(()) => Ok(()),
                Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(SecretStoreError::Other(e.to_string())),
            }
        })
        .await
        .map_err(|e| SecretStoreError::Other(e.to_string()))?
    }
}
