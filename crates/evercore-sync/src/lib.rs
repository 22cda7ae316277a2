//! evercore-sync - download pipeline, upload pipeline, and the orchestrator
//! that wires them together with the sync-state store.
//!
//! This crate holds:
//! - **`downloader`** - [`Downloader`], the full/incremental download cycle
//!   (§4.4).
//! - **`sender`** - [`Sender`], the upload ("send") cycle (§4.5).
//! - **`orchestrator`** - [`Orchestrator`], running a download cycle
//!   followed by a send cycle per account, composing the caller's canceler
//!   with the internal manual canceler armed on a fatal server signal (§5).
//! - **`scope`** - [`SyncScope`], the user-own-vs-linked-notebook
//!   distinction threaded through both pipelines.
//! - **`stale_data`** - full-sync stale-data expunging and linked-notebook
//!   tag garbage collection (§4.4 steps 1.a and 7).
//! - **`tag_sort`** - topological ordering of the tag forest before upload
//!   (§4.5.1, §9 "Cyclic graphs").
//! - **`error`** - [`SyncError`], the crate-local error type for logic that
//!   doesn't carry a [`evercore_core::error::CoreError`] directly.

pub mod downloader;
pub mod error;
pub mod orchestrator;
pub mod scope;
pub mod sender;
pub mod stale_data;
pub mod tag_sort;

pub use downloader::{DownloadResult, Downloader, LocalResult};
pub use error::{SyncError, SyncResult};
pub use orchestrator::{CycleResult, Orchestrator};
pub use scope::SyncScope;
pub use sender::{SendResult, Sender};
pub use stale_data::{FullSyncStaleDataExpunger, LinkedNotebookTagsCleaner};
