//! Sync state storage port

use async_trait::async_trait;

use crate::domain::{Account, SyncState};

/// Persists the per-account [`SyncState`] bookkeeping across cycles.
#[async_trait]
pub trait SyncStateStorage: Send + Sync {
    /// Returns [`SyncState::zero()`] for an account that has never synced.
    async fn get(&self, account: &Account) -> anyhow::Result<SyncState>;

    async fn set(&self, account: &Account, state: &SyncState) -> anyhow::Result<()>;
}
