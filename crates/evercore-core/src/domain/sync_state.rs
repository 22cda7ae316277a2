//! Per-account synchronization state
//!
//! `SyncState` is the small piece of bookkeeping that drives incrementality:
//! the last update sequence number and sync time seen for the user's own
//! data, and the same pair per linked notebook. It is owned by
//! `SyncStateStorage`; a snapshot is handed to the downloader and sender by
//! value at the start of a cycle and written back at completion.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::Guid;

/// Mutable per-account synchronization bookkeeping.
///
/// Invariant: `user_data_update_count` and every entry of
/// `linked_notebook_update_counts` are monotonically non-decreasing across
/// successful syncs, and likewise for the two last-sync-time fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub user_data_update_count: i32,
    pub user_data_last_sync_time: Option<DateTime<Utc>>,
    pub linked_notebook_update_counts: HashMap<String, i32>,
    pub linked_notebook_last_sync_times: HashMap<String, DateTime<Utc>>,
}

impl SyncState {
    /// The all-zero state returned for a never-before-synced account.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn linked_notebook_update_count(&self, guid: &Guid) -> i32 {
        self.linked_notebook_update_counts
            .get(guid.as_str())
            .copied()
            .unwrap_or(0)
    }

    pub fn linked_notebook_last_sync_time(&self, guid: &Guid) -> Option<DateTime<Utc>> {
        self.linked_notebook_last_sync_times
            .get(guid.as_str())
            .copied()
    }

    /// Applies a new high-water-mark USN and sync time for the user's own
    /// scope, enforcing the monotonicity invariant: a smaller incoming
    /// value is simply ignored (this should not happen in practice - the
    /// caller only calls this with a value already checked to be greater).
    pub fn advance_user_data(&mut self, update_count: i32, sync_time: DateTime<Utc>) {
        if update_count > self.user_data_update_count {
            self.user_data_update_count = update_count;
            self.user_data_last_sync_time = Some(sync_time);
        }
    }

    /// Applies a new high-water-mark USN and sync time for a linked
    /// notebook's scope.
    pub fn advance_linked_notebook(
        &mut self,
        guid: &Guid,
        update_count: i32,
        sync_time: DateTime<Utc>,
    ) {
        let current = self.linked_notebook_update_count(guid);
        if update_count > current {
            self.linked_notebook_update_counts
                .insert(guid.as_str().to_string(), update_count);
            self.linked_notebook_last_sync_times
                .insert(guid.as_str().to_string(), sync_time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_state_has_no_linked_notebooks() {
        let state = SyncState::zero();
        assert_eq!(state.user_data_update_count, 0);
        assert!(state.user_data_last_sync_time.is_none());
        assert!(state.linked_notebook_update_counts.is_empty());
    }

    #[test]
    fn advance_is_monotonic() {
        let mut state = SyncState::zero();
        let t1 = Utc::now();
        state.advance_user_data(10, t1);
        assert_eq!(state.user_data_update_count, 10);

        // A smaller or equal USN never regresses the stored state.
        let t0 = t1 - chrono::Duration::seconds(10);
        state.advance_user_data(5, t0);
        assert_eq!(state.user_data_update_count, 10);

        let t2 = t1 + chrono::Duration::seconds(10);
        state.advance_user_data(20, t2);
        assert_eq!(state.user_data_update_count, 20);
        assert_eq!(state.user_data_last_sync_time, Some(t2));
    }

    #[test]
    fn advance_linked_notebook_is_per_guid() {
        let mut state = SyncState::zero();
        let g1 = Guid::new("g1").unwrap();
        let g2 = Guid::new("g2").unwrap();
        let t = Utc::now();

        state.advance_linked_notebook(&g1, 3, t);
        state.advance_linked_notebook(&g2, 7, t);

        assert_eq!(state.linked_notebook_update_count(&g1), 3);
        assert_eq!(state.linked_notebook_update_count(&g2), 7);
    }
}
