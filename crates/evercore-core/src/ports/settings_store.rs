//! Settings store port
//!
//! A grouped key-value store for non-secret per-account metadata: token
//! expiration times, persisted cookies, last-sync bookkeeping mirrors, and
//! similar. Grouped by `section` (typically an account-derived string) so
//! one physical store can hold several accounts' settings without key
//! collisions.

use async_trait::async_trait;

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, section: &str, key: &str) -> anyhow::Result<Option<String>>;

    async fn set(&self, section: &str, key: &str, value: &str) -> anyhow::Result<()>;

    async fn remove(&self, section: &str, key: &str) -> anyhow::Result<()>;

    /// Removes every key under `section`, used when clearing an account's
    /// cached authentication metadata entirely.
    async fn clear_section(&self, section: &str) -> anyhow::Result<()>;
}
