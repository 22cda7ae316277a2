//! Status accumulators
//!
//! `SyncChunksDataCounters`, `DownloadNotesStatus`, `DownloadResourcesStatus`
//! and `SendStatus` are the per-cycle progress/failure accumulators
//! described in the specification's §4.6. They are plain data; the
//! orchestrator owns one set for the duration of a cycle and publishes an
//! independent snapshot copy to the progress callback on each update, the
//! way the teacher's `SyncResult` is snapshotted for its progress channel.

use serde::{Deserialize, Serialize};

use super::newtypes::{Guid, LocalId};
use crate::error::ProtocolError;

/// The fatal signal, if any, that stopped the current cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum StopSynchronizationError {
    #[default]
    None,
    RateLimitReached {
        seconds: u32,
    },
    AuthenticationExpired,
}

impl From<&ProtocolError> for Option<StopSynchronizationError> {
    fn from(err: &ProtocolError) -> Self {
        match err {
            ProtocolError::RateLimitReached { seconds } => {
                Some(StopSynchronizationError::RateLimitReached { seconds: *seconds })
            }
            ProtocolError::AuthExpired => Some(StopSynchronizationError::AuthenticationExpired),
            _ => None,
        }
    }
}

/// A single `(entity, error)` failure recorded by an accumulator. The
/// entity is identified by local id since a failed upload/download may not
/// have a server guid yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityFailure {
    pub local_id: LocalId,
    pub guid: Option<Guid>,
    pub error: String,
}

impl EntityFailure {
    pub fn new(local_id: LocalId, guid: Option<Guid>, error: impl Into<String>) -> Self {
        Self {
            local_id,
            guid,
            error: error.into(),
        }
    }
}

/// Totals and processed counts per entity kind within one scope's sync
/// chunks, split into `present` (created/updated) and `expunged` items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityKindCounters {
    pub total_present: u32,
    pub processed_present: u32,
    pub total_expunged: u32,
    pub processed_expunged: u32,
}

/// Accumulates progress across the four parallel entity-kind processors
/// (notebooks, tags, saved searches, linked notebooks) run against one
/// scope's sync chunks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncChunksDataCounters {
    pub notebooks: EntityKindCounters,
    pub tags: EntityKindCounters,
    pub saved_searches: EntityKindCounters,
    pub linked_notebooks: EntityKindCounters,
}

/// Accumulates the outcome of downloading note bodies: successes, download
/// failures, processing failures (e.g. local-store write failed after a
/// successful fetch), and cancellations. Every terminal event for an item
/// advances exactly one counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadNotesStatus {
    pub total_attempted: u32,
    pub total_succeeded: u32,
    pub failed_to_download: Vec<EntityFailure>,
    pub failed_to_process: Vec<EntityFailure>,
    pub cancelled: u32,
    pub stop_synchronization_error: StopSynchronizationError,
}

impl DownloadNotesStatus {
    pub fn record_success(&mut self) {
        self.total_attempted += 1;
        self.total_succeeded += 1;
    }

    pub fn record_download_failure(&mut self, failure: EntityFailure) {
        self.total_attempted += 1;
        self.failed_to_download.push(failure);
    }

    pub fn record_process_failure(&mut self, failure: EntityFailure) {
        self.total_attempted += 1;
        self.failed_to_process.push(failure);
    }

    pub fn record_cancelled(&mut self) {
        self.total_attempted += 1;
        self.cancelled += 1;
    }
}

/// Same contract as [`DownloadNotesStatus`], for resource binary downloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadResourcesStatus {
    pub total_attempted: u32,
    pub total_succeeded: u32,
    pub failed_to_download: Vec<EntityFailure>,
    pub failed_to_process: Vec<EntityFailure>,
    pub cancelled: u32,
    pub stop_synchronization_error: StopSynchronizationError,
}

impl DownloadResourcesStatus {
    pub fn record_success(&mut self) {
        self.total_attempted += 1;
        self.total_succeeded += 1;
    }

    pub fn record_download_failure(&mut self, failure: EntityFailure) {
        self.total_attempted += 1;
        self.failed_to_download.push(failure);
    }

    pub fn record_process_failure(&mut self, failure: EntityFailure) {
        self.total_attempted += 1;
        self.failed_to_process.push(failure);
    }

    pub fn record_cancelled(&mut self) {
        self.total_attempted += 1;
        self.cancelled += 1;
    }
}

/// Per-entity-kind attempted/succeeded counters and failure list, used
/// inside [`SendStatus`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendKindStatus {
    pub attempted: u32,
    pub succeeded: u32,
    pub failures: Vec<EntityFailure>,
}

impl SendKindStatus {
    pub fn record_success(&mut self) {
        self.attempted += 1;
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, failure: EntityFailure) {
        self.attempted += 1;
        self.failures.push(failure);
    }
}

/// Accumulates the outcome of one "send" (upload) cycle against one scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendStatus {
    pub tags: SendKindStatus,
    pub notebooks: SendKindStatus,
    pub saved_searches: SendKindStatus,
    pub notes: SendKindStatus,
    pub stop_synchronization_error: StopSynchronizationError,
    /// Set when a successful upload's returned USN was not exactly one
    /// more than the last recorded USN for that scope: the server has data
    /// this cycle hasn't downloaded yet.
    pub need_to_repeat_incremental_sync: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_notes_status_every_event_advances_one_counter() {
        let mut status = DownloadNotesStatus::default();
        status.record_success();
        status.record_download_failure(EntityFailure::new(LocalId::new(), None, "boom"));
        status.record_cancelled();

        assert_eq!(status.total_attempted, 3);
        assert_eq!(status.total_succeeded, 1);
        assert_eq!(status.failed_to_download.len(), 1);
        assert_eq!(status.cancelled, 1);
    }

    #[test]
    fn stop_synchronization_error_from_protocol_error() {
        let rl = ProtocolError::RateLimitReached { seconds: 120 };
        let mapped: Option<StopSynchronizationError> = (&rl).into();
        assert_eq!(
            mapped,
            Some(StopSynchronizationError::RateLimitReached { seconds: 120 })
        );

        let ae = ProtocolError::AuthExpired;
        let mapped: Option<StopSynchronizationError> = (&ae).into();
        assert_eq!(mapped, Some(StopSynchronizationError::AuthenticationExpired));

        let nf = ProtocolError::NotFound("x".into());
        let mapped: Option<StopSynchronizationError> = (&nf).into();
        assert_eq!(mapped, None);
    }

    #[test]
    fn send_kind_status_accumulates() {
        let mut s = SendKindStatus::default();
        s.record_success();
        s.record_failure(EntityFailure::new(LocalId::new(), None, "conflict"));
        assert_eq!(s.attempted, 2);
        assert_eq!(s.succeeded, 1);
        assert_eq!(s.failures.len(), 1);
    }
}
