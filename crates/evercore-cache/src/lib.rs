//! evercore-cache - reference SQLite-backed persistence adapters
//!
//! This crate holds:
//! - **`pool`** - [`DatabasePool`], a WAL-mode `sqlx::SqlitePool` wrapper
//!   that runs schema migrations on first connection.
//! - **`settings_store`** - [`settings_store::SqliteSettingsStore`], the
//!   `evercore_core::ports::SettingsStore` adapter.
//! - **`local_store`** - [`local_store::SqliteLocalStore`], the
//!   `evercore_core::ports::LocalStore` adapter for every synchronized
//!   entity kind.
//! - **`sync_state_storage`** - [`sync_state_storage::SqliteSyncStateStorage`],
//!   the `evercore_core::ports::SyncStateStorage` adapter.
//!
//! None of this is required by the core: `evercore-sync` depends only on
//! the port traits, and any other persistence layer can be substituted by
//! implementing them.

pub mod error;
pub mod local_store;
pub mod pool;
pub mod settings_store;
pub mod sync_state_storage;

pub use error::CacheError;
pub use local_store::SqliteLocalStore;
pub use pool::DatabasePool;
pub use settings_store::SqliteSettingsStore;
pub use sync_state_storage::SqliteSyncStateStorage;
