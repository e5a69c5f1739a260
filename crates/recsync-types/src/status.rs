//! Per-record-type sync status and run history model types.
//!
//! Pure data types used by status backend implementations. Kept in the
//! types crate so the state and engine crates share them without a cycle.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SyncState
// ---------------------------------------------------------------------------

/// Sync state of one record type.
///
/// `NotSynced → Syncing → {Synced | PartiallySynced | Failed}`; a synced type
/// becomes `Modified` when its source rows change and re-enters `Syncing` on
/// the next run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    NotSynced,
    Syncing,
    Synced,
    PartiallySynced,
    Failed,
    Modified,
}

impl SyncState {
    /// Storage form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotSynced => "not_synced",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::PartiallySynced => "partially_synced",
            Self::Failed => "failed",
            Self::Modified => "modified",
        }
    }

    /// Parse the storage form. Unknown values read as `NotSynced`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "syncing" => Self::Syncing,
            "synced" => Self::Synced,
            "partially_synced" => Self::PartiallySynced,
            "failed" => Self::Failed,
            "modified" => Self::Modified,
            _ => Self::NotSynced,
        }
    }

    /// Whether the state machine allows `self → next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Syncing, Self::Syncing) => false,
            (_, Self::Syncing) | (_, Self::NotSynced) => true,
            (Self::Syncing, Self::Synced | Self::PartiallySynced | Self::Failed) => true,
            (Self::Synced | Self::PartiallySynced, Self::Modified) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last-known sync status for one record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub record_type: String,
    pub state: SyncState,
    /// ISO-8601 UTC timestamp of the last completed sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<String>,
    pub record_count: u64,
    pub records_processed: u64,
    pub records_failed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Fingerprint of the source rows after the last sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl SyncStatus {
    #[must_use]
    pub fn not_synced(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            state: SyncState::NotSynced,
            last_sync: None,
            record_count: 0,
            records_processed: 0,
            records_failed: 0,
            message: None,
            fingerprint: None,
        }
    }
}

/// Counts across every tracked record type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total: u64,
    pub synced: u64,
    pub partially_synced: u64,
    pub not_synced: u64,
    pub modified: u64,
    pub failed: u64,
}

impl StatusSummary {
    pub fn observe(&mut self, state: SyncState) {
        self.total += 1;
        match state {
            SyncState::Synced => self.synced += 1,
            SyncState::PartiallySynced => self.partially_synced += 1,
            SyncState::NotSynced | SyncState::Syncing => self.not_synced += 1,
            SyncState::Modified => self.modified += 1,
            SyncState::Failed => self.failed += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Run tracking
// ---------------------------------------------------------------------------

/// Status of one record-type attempt in run history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    PartiallyCompleted,
    Failed,
    TimedOut,
    Skipped,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::PartiallyCompleted => "partially_completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate statistics for a finished record-type attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub records_read: u64,
    pub records_processed: u64,
    pub records_failed: u64,
    pub identifiers_written: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_storage_form_roundtrips() {
        for state in [
            SyncState::NotSynced,
            SyncState::Syncing,
            SyncState::Synced,
            SyncState::PartiallySynced,
            SyncState::Failed,
            SyncState::Modified,
        ] {
            assert_eq!(SyncState::parse(state.as_str()), state);
        }
        assert_eq!(SyncState::parse("garbage"), SyncState::NotSynced);
    }

    #[test]
    fn state_machine_transitions() {
        use SyncState::*;
        assert!(NotSynced.can_transition_to(Syncing));
        assert!(Syncing.can_transition_to(Synced));
        assert!(Syncing.can_transition_to(PartiallySynced));
        assert!(Syncing.can_transition_to(Failed));
        assert!(Synced.can_transition_to(Modified));
        assert!(Modified.can_transition_to(Syncing));
        assert!(Failed.can_transition_to(Syncing));

        assert!(!NotSynced.can_transition_to(Synced));
        assert!(!NotSynced.can_transition_to(Modified));
        assert!(!Syncing.can_transition_to(Syncing));
        assert!(!Failed.can_transition_to(Modified));
    }

    #[test]
    fn summary_counts_states() {
        let mut summary = StatusSummary::default();
        summary.observe(SyncState::Synced);
        summary.observe(SyncState::Failed);
        summary.observe(SyncState::Modified);
        summary.observe(SyncState::NotSynced);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.synced, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.modified, 1);
        assert_eq!(summary.not_synced, 1);
    }

    #[test]
    fn run_status_as_str() {
        assert_eq!(RunStatus::TimedOut.as_str(), "timed_out");
        assert_eq!(RunStatus::PartiallyCompleted.to_string(), "partially_completed");
    }
}
