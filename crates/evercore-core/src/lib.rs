//! evercore-core - domain logic and port definitions for the synchronization core
//!
//! This crate holds:
//! - **Domain entities** - `Account`, `AuthenticationInfo`, `SyncState`, `Notebook`,
//!   `Tag`, `SavedSearch`, `LinkedNotebook`, `Note`, `Resource`, `SyncChunk`.
//! - **Status accumulators** - `SyncChunksDataCounters`, `SendStatus`,
//!   `DownloadNotesStatus`, `DownloadResourcesStatus`.
//! - **Port definitions** - traits implemented by adapter crates: `SecretStore`,
//!   `SettingsStore`, `LocalStore`, `RpcClient`, `Authenticator`, `SyncStateStorage`,
//!   `Canceler`, `ProgressCallback`.
//! - **Error taxonomy** - `CoreError`, `ProtocolError`.
//!
//! This crate has no knowledge of SQLite, OAuth, or HTTP: those are adapter
//! concerns living in `evercore-cache`, `evercore-auth` and `evercore-notestore`.

pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
