//! SQLite-backed `SettingsStore`

use async_trait::async_trait;
use evercore_core::ports::SettingsStore;
use sqlx::SqlitePool;

pub struct SqliteSettingsStore {
    pool: SqlitePool,
}

impl SqliteSettingsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn get(&self, section: &str, key: &str) -> anyhow::Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT value FROM settings WHERE section = ? AND key = ?",
        )
        .bind(section)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn set(&self, section: &str, key: &str, value: &str) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO settings (section, key, value) VALUES (?, ?, ?) \
             ON CONFLICT (section, key) DO UPDATE SET value = excluded.value",
        )
        .bind(section)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, section: &str, key: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM settings WHERE section = ? AND key = ?")
            .bind(section)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_section(&self, section: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM settings WHERE section = ?")
            .bind(section)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DatabasePool;

    async fn store() -> SqliteSettingsStore {
        let pool = DatabasePool::in_memory().await.unwrap();
        SqliteSettingsStore::new(pool.pool().clone())
    }

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let store = store().await;
        store.set("user:1", "noteStoreUrl", "https://example.com").await.unwrap();
        assert_eq!(
            store.get("user:1", "noteStoreUrl").await.unwrap(),
            Some("https://example.com".to_string())
        );
    }

    #[tokio::test]
    async fn set_overwrites_existing_value() {
        let store = store().await;
        store.set("user:1", "k", "v1").await.unwrap();
        store.set("user:1", "k", "v2").await.unwrap();
        assert_eq!(store.get("user:1", "k").await.unwrap(), Some("v2".to_string()));
    }

    #[tokio::test]
    async fn clear_section_removes_only_that_section() {
        let store = store().await;
        store.set("user:1", "k", "v").await.unwrap();
        store.set("user:2", "k", "v").await.unwrap();

        store.clear_section("user:1").await.unwrap();

        assert_eq!(store.get("user:1", "k").await.unwrap(), None);
        assert_eq!(store.get("user:2", "k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn get_missing_key_is_none() {
        let store = store().await;
        assert_eq!(store.get("user:1", "missing").await.unwrap(), None);
    }
}
