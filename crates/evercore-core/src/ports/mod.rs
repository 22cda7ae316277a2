//! Port traits implemented by adapter crates.
//!
//! Everything in this module is an interface; `evercore-auth` provides the
//! concrete [`Authenticator`] and [`SecretStore`] adapters, `evercore-cache`
//! provides [`SettingsStore`], [`LocalStore`] and [`SyncStateStorage`], and
//! `evercore-notestore` provides [`RpcClient`]. [`Canceler`] and
//! [`ProgressCallback`] have simple built-in implementations usable directly
//! by callers.

pub mod authenticator;
pub mod cancel;
pub mod client_factory;
pub mod local_store;
pub mod progress;
pub mod rpc_client;
pub mod secret_store;
pub mod settings_store;
pub mod sync_state_storage;

pub use authenticator::Authenticator;
pub use cancel::{Canceler, TokenCanceler};
pub use client_factory::NoteStoreClientFactory;
pub use local_store::{LocalStore, NoteFetchOptions, NoteListOptions};
pub use progress::ProgressCallback;
pub use rpc_client::{RpcClient, RpcSyncChunkFilter, RpcSyncState, SharedNotebookAuth};
pub use secret_store::{SecretStore, SecretStoreError};
pub use settings_store::SettingsStore;
pub use sync_state_storage::SyncStateStorage;
