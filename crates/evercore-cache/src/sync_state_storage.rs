//! SQLite-backed `SyncStateStorage`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evercore_core::domain::{Account, SyncState};
use evercore_core::ports::SyncStateStorage;
use sqlx::{Row, SqlitePool};

use crate::error::CacheError;

pub struct SqliteSyncStateStorage {
    pool: SqlitePool,
}

impl SqliteSyncStateStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CacheError::SerializationError(format!("failed to parse datetime '{s}': {e}")))
}

#[async_trait]
impl SyncStateStorage for SqliteSyncStateStorage {
    async fn get(&self, account: &Account) -> anyhow::Result<SyncState> {
        let row = sqlx::query(
            "SELECT user_data_update_count, user_data_last_sync_time FROM sync_state WHERE account_user_id = ?",
        )
        .bind(account.user_id)
        .fetch_optional(&self.pool)
        .await?;

        let mut state = match row {
            Some(r) => {
                let update_count: i32 = r.try_get("user_data_update_count")?;
                let last_sync_time: Option<String> = r.try_get("user_data_last_sync_time")?;
                SyncState {
                    user_data_update_count: update_count,
                    user_data_last_sync_time: last_sync_time.map(|s| parse_datetime(&s)).transpose()?,
                    linked_notebook_update_counts: Default::default(),
                    linked_notebook_last_sync_times: Default::default(),
                }
            }
            None => SyncState::zero(),
        };

        let linked_rows = sqlx::query(
            "SELECT linked_notebook_guid, update_count, last_sync_time \
             FROM sync_state_linked_notebooks WHERE account_user_id = ?",
        )
        .bind(account.user_id)
        .fetch_all(&self.pool)
        .await?;

        for row in linked_rows {
            let guid: String = row.try_get("linked_notebook_guid")?;
            let update_count: i32 = row.try_get("update_count")?;
            let last_sync_time: Option<String> = row.try_get("last_sync_time")?;

            state.linked_notebook_update_counts.insert(guid.clone(), update_count);
            if let Some(ts) = last_sync_time {
                state.linked_notebook_last_sync_times.insert(guid, parse_datetime(&ts)?);
            }
        }

        Ok(state)
    }

    async fn set(&self, account: &Account, state: &SyncState) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO sync_state (account_user_id, user_data_update_count, user_data_last_sync_time) \
             VALUES (?, ?, ?) \
             ON CONFLICT (account_user_id) DO UPDATE SET \
                user_data_update_count = excluded.user_data_update_count, \
                user_data_last_sync_time = excluded.user_data_last_sync_time",
        )
        .bind(account.user_id)
        .bind(state.user_data_update_count)
        .bind(state.user_data_last_sync_time.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        for (guid, update_count) in &state.linked_notebook_update_counts {
            let last_sync_time = state.linked_notebook_last_sync_times.get(guid).map(|t| t.to_rfc3339());
            sqlx::query(
                "INSERT INTO sync_state_linked_notebooks \
                     (account_user_id, linked_notebook_guid, update_count, last_sync_time) \
                 VALUES (?, ?, ?, ?) \
                 ON CONFLICT (account_user_id, linked_notebook_guid) DO UPDATE SET \
                     update_count = excluded.update_count, \
                     last_sync_time = excluded.last_sync_time",
            )
            .bind(account.user_id)
            .bind(guid)
            .bind(update_count)
            .bind(last_sync_time)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DatabasePool;

    async fn storage() -> SqliteSyncStateStorage {
        let pool = DatabasePool::in_memory().await.unwrap();
        SqliteSyncStateStorage::new(pool.pool().clone())
    }

    #[tokio::test]
    async fn unseen_account_returns_zero_state() {
        let storage = storage().await;
        let account = Account::new(1, "www.evernote.com", "alice");
        let state = storage.get(&account).await.unwrap();
        assert_eq!(state, SyncState::zero());
    }

    #[tokio::test]
    async fn set_then_get_roundtrips_user_and_linked_notebook_state() {
        let storage = storage().await;
        let account = Account::new(1, "www.evernote.com", "alice");

        let mut state = SyncState::zero();
        let guid = evercore_core::domain::Guid::new("ln1").unwrap();
        let t = Utc::now();
        state.advance_user_data(42, t);
        state.advance_linked_notebook(&guid, 7, t);

        storage.set(&account, &state).await.unwrap();
        let reloaded = storage.get(&account).await.unwrap();

        assert_eq!(reloaded.user_data_update_count, 42);
        assert_eq!(reloaded.linked_notebook_update_count(&guid), 7);
    }
}
