//! Domain types for the synchronization core: account identity,
//! authentication snapshots, synchronized entities, per-account sync state
//! and cycle status accumulators.

pub mod account;
pub mod entities;
pub mod errors;
pub mod newtypes;
pub mod request_context;
pub mod status;
pub mod sync_state;

pub use account::{Account, AuthenticationInfo, Cookie, LinkedNotebookAuthInfo};
pub use entities::{LinkedNotebook, Note, Notebook, Resource, SavedSearch, SyncChunk, Tag};
pub use errors::DomainError;
pub use newtypes::{EntityRef, Guid, LocalId, Usn};
pub use request_context::{RequestContext, TransportParams};
pub use status::{
    DownloadNotesStatus, DownloadResourcesStatus, EntityFailure, EntityKindCounters, SendKindStatus,
    SendStatus, StopSynchronizationError, SyncChunksDataCounters,
};
pub use sync_state::SyncState;
