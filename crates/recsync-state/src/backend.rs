//! Status backend trait definition.
//!
//! [`StatusBackend`] defines the storage contract for per-record-type sync
//! status, run history and archived failures. Model types live in
//! [`recsync_types::status`] and [`recsync_types::failure`].

use recsync_types::failure::FailureRecord;
use recsync_types::job::Operation;
use recsync_types::record::RecordType;
use recsync_types::status::{RunStats, RunStatus, StatusSummary, SyncStatus};

use crate::error;

/// Storage contract for sync status.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn StatusBackend>`.
pub trait StatusBackend: Send + Sync {
    /// Read the status of one record type.
    ///
    /// Returns a `NotSynced` status when nothing has been persisted yet.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn get_status(&self, record_type: &RecordType) -> error::Result<SyncStatus>;

    /// All persisted statuses, ordered by record type.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn list_statuses(&self) -> error::Result<Vec<SyncStatus>>;

    /// Upsert the status of one record type.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn put_status(&self, status: &SyncStatus) -> error::Result<()>;

    /// Move a synced record type to `Modified`.
    ///
    /// Returns `false` (and changes nothing) when the current state does not
    /// allow the transition.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn mark_modified(&self, record_type: &RecordType) -> error::Result<bool>;

    /// Forget everything known about a record type's sync status.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn reset_status(&self, record_type: &RecordType) -> error::Result<()>;

    /// Begin a record-type attempt, returning its run ID.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn start_run(&self, record_type: &RecordType, operation: Operation) -> error::Result<i64>;

    /// Finalize an attempt with status and aggregate stats.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats) -> error::Result<()>;

    /// Archive failed records for a run. Returns the count inserted.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn insert_failure_records(&self, run_id: i64, records: &[FailureRecord]) -> error::Result<u64>;

    /// Most recently archived failures for a record type, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn recent_failures(
        &self,
        record_type: &RecordType,
        limit: usize,
    ) -> error::Result<Vec<FailureRecord>>;

    /// Counts across all tracked record types.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn summary(&self) -> error::Result<StatusSummary> {
        let mut summary = StatusSummary::default();
        for status in self.list_statuses()? {
            summary.observe(status.state);
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify the trait is object-safe (can be used as `dyn StatusBackend`).
    #[test]
    fn trait_is_object_safe() {
        fn _assert_object_safe(_: &dyn StatusBackend) {}
    }
}
