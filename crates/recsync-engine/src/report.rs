//! Sync report: the completion artifact of one orchestration.

use recsync_types::job::Operation;
use recsync_types::status::{RunStatus, SyncState};
use serde::{Deserialize, Serialize};

use crate::classify::{FailureGroup, Recommendation};

/// Final status of one record type within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeStatus {
    Synced,
    PartiallySynced,
    Failed,
    TimedOut,
    /// Nothing to send.
    Skipped,
}

impl TypeStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::PartiallySynced => "partially_synced",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Skipped => "skipped",
        }
    }

    /// Run-history status for this outcome.
    #[must_use]
    pub fn run_status(self) -> RunStatus {
        match self {
            Self::Synced => RunStatus::Completed,
            Self::PartiallySynced => RunStatus::PartiallyCompleted,
            Self::Failed => RunStatus::Failed,
            Self::TimedOut => RunStatus::TimedOut,
            Self::Skipped => RunStatus::Skipped,
        }
    }

    /// Persisted sync state, or `None` when the prior state must be kept.
    #[must_use]
    pub fn sync_state(self) -> Option<SyncState> {
        match self {
            Self::Synced => Some(SyncState::Synced),
            Self::PartiallySynced => Some(SyncState::PartiallySynced),
            Self::Failed => Some(SyncState::Failed),
            Self::TimedOut | Self::Skipped => None,
        }
    }
}

impl std::fmt::Display for TypeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-record-type section of a [`SyncReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeOutcome {
    pub record_type: String,
    pub operation: Operation,
    pub status: TypeStatus,
    /// Data rows read from the source store.
    pub records_read: u64,
    /// Rows dropped because every value was absent.
    pub blank_rows: u64,
    /// Rows a field transform rejected before dispatch.
    pub invalid: u64,
    /// Counts reported by the remote job. `processed == succeeded + failed`.
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Failed rows that already existed remotely (a subset of `failed`).
    pub duplicates: u64,
    pub identifiers_reconciled: u64,
    pub unmatched: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failure_groups: Vec<FailureGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<Recommendation>,
}

impl TypeOutcome {
    /// An empty outcome, initially `Failed` until the attempt settles it.
    #[must_use]
    pub fn new(record_type: impl Into<String>, operation: Operation) -> Self {
        Self {
            record_type: record_type.into(),
            operation,
            status: TypeStatus::Failed,
            records_read: 0,
            blank_rows: 0,
            invalid: 0,
            processed: 0,
            succeeded: 0,
            failed: 0,
            duplicates: 0,
            identifiers_reconciled: 0,
            unmatched: 0,
            job_id: None,
            message: None,
            failure_groups: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    /// Remote failures plus rows rejected before dispatch.
    #[must_use]
    pub fn total_failed(&self) -> u64 {
        self.failed + self.invalid
    }
}

/// Totals across every record type of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTotals {
    pub record_types: u64,
    pub synced: u64,
    pub partially_synced: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub skipped: u64,
    pub records_read: u64,
    pub records_processed: u64,
    pub records_succeeded: u64,
    pub records_failed: u64,
    pub identifiers_reconciled: u64,
}

impl ReportTotals {
    fn observe(&mut self, outcome: &TypeOutcome) {
        self.record_types += 1;
        match outcome.status {
            TypeStatus::Synced => self.synced += 1,
            TypeStatus::PartiallySynced => self.partially_synced += 1,
            TypeStatus::Failed => self.failed += 1,
            TypeStatus::TimedOut => self.timed_out += 1,
            TypeStatus::Skipped => self.skipped += 1,
        }
        self.records_read += outcome.records_read;
        self.records_processed += outcome.processed;
        self.records_succeeded += outcome.succeeded;
        self.records_failed += outcome.total_failed();
        self.identifiers_reconciled += outcome.identifiers_reconciled;
    }
}

/// One report per orchestration: per-type outcomes in processing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub started_at: String,
    pub finished_at: String,
    pub outcomes: Vec<TypeOutcome>,
    pub totals: ReportTotals,
}

impl SyncReport {
    #[must_use]
    pub fn new(started_at: String, finished_at: String, outcomes: Vec<TypeOutcome>) -> Self {
        let mut totals = ReportTotals::default();
        for outcome in &outcomes {
            totals.observe(outcome);
        }
        Self {
            started_at,
            finished_at,
            outcomes,
            totals,
        }
    }

    #[must_use]
    pub fn outcome(&self, record_type: &str) -> Option<&TypeOutcome> {
        self.outcomes.iter().find(|o| o.record_type == record_type)
    }

    /// `true` when no type failed or timed out.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.totals.failed == 0 && self.totals.timed_out == 0
    }

    /// One-line summary for logs and progress messages.
    #[must_use]
    pub fn summary_line(&self) -> String {
        let t = &self.totals;
        format!(
            "{} synced, {} partially synced, {} failed, {} timed out, {} skipped",
            t.synced, t.partially_synced, t.failed, t.timed_out, t.skipped
        )
    }
}

/// Result of pulling one record type into its sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullOutcome {
    pub record_type: String,
    /// Rows now in the sheet.
    pub records: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PullOutcome {
    #[must_use]
    pub fn pulled(record_type: impl Into<String>, records: u64) -> Self {
        Self {
            record_type: record_type.into(),
            records,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(record_type: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            records: 0,
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn is_pulled(&self) -> bool {
        self.error.is_none()
    }
}

/// One report per pull, outcomes in dependency order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullReport {
    pub started_at: String,
    pub finished_at: String,
    pub outcomes: Vec<PullOutcome>,
}

impl PullReport {
    #[must_use]
    pub fn outcome(&self, record_type: &str) -> Option<&PullOutcome> {
        self.outcomes.iter().find(|o| o.record_type == record_type)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_pulled()).count()
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed() == 0
    }

    #[must_use]
    pub fn summary_line(&self) -> String {
        let pulled = self.outcomes.len() - self.failed();
        let records: u64 = self.outcomes.iter().map(|o| o.records).sum();
        format!("{pulled} pulled ({records} records), {} failed", self.failed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(name: &str, status: TypeStatus, processed: u64, failed: u64) -> TypeOutcome {
        let mut o = TypeOutcome::new(name, Operation::Insert);
        o.status = status;
        o.records_read = processed;
        o.processed = processed;
        o.failed = failed;
        o.succeeded = processed - failed;
        o
    }

    #[test]
    fn totals_aggregate_outcomes() {
        let mut invalid = outcome("Pricebook2", TypeStatus::Failed, 0, 0);
        invalid.invalid = 2;
        let report = SyncReport::new(
            "2026-01-01T00:00:00Z".into(),
            "2026-01-01T00:01:00Z".into(),
            vec![
                outcome("Product2", TypeStatus::PartiallySynced, 10, 3),
                outcome("ProductCategory", TypeStatus::Synced, 4, 0),
                invalid,
                outcome("PricebookEntry", TypeStatus::TimedOut, 0, 0),
            ],
        );
        let t = &report.totals;
        assert_eq!(t.record_types, 4);
        assert_eq!(t.partially_synced, 1);
        assert_eq!(t.records_processed, 14);
        assert_eq!(t.records_succeeded, 11);
        assert_eq!(t.records_failed, 5);
        assert!(!report.is_clean());
        assert_eq!(
            report.summary_line(),
            "1 synced, 1 partially synced, 1 failed, 1 timed out, 0 skipped"
        );
        assert_eq!(report.outcome("Product2").unwrap().failed, 3);
    }

    #[test]
    fn status_mappings() {
        assert_eq!(TypeStatus::PartiallySynced.run_status(), RunStatus::PartiallyCompleted);
        assert_eq!(TypeStatus::TimedOut.sync_state(), None);
        assert_eq!(TypeStatus::Skipped.sync_state(), None);
        assert_eq!(TypeStatus::Failed.sync_state(), Some(SyncState::Failed));
    }

    #[test]
    fn pull_report_summary() {
        let report = PullReport {
            started_at: "a".into(),
            finished_at: "b".into(),
            outcomes: vec![
                PullOutcome::pulled("Product2", 12),
                PullOutcome::pulled("Pricebook2", 1),
                PullOutcome::failed("PricebookEntry", "bulk command failed: INVALID_FIELD"),
            ],
        };
        assert!(!report.is_clean());
        assert_eq!(report.summary_line(), "2 pulled (13 records), 1 failed");
        assert_eq!(report.outcome("Pricebook2").unwrap().records, 1);

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["outcomes"][0].get("error").is_none());
    }

    #[test]
    fn report_serializes_snake_case() {
        let report = SyncReport::new(
            "a".into(),
            "b".into(),
            vec![outcome("Product2", TypeStatus::TimedOut, 0, 0)],
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcomes"][0]["status"], "timed_out");
        assert!(json["outcomes"][0].get("failure_groups").is_none());
        assert_eq!(json["totals"]["timed_out"], 1);
    }
}
