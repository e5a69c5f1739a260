//! Bulk job model: operations, lifecycle status and summary counts.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Requested bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Insert,
    Update,
    Upsert,
}

impl Operation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Upsert => "upsert",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a bulk job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Submitted,
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
    /// The caller stopped waiting. The job may still finish remotely.
    TimedOut,
}

impl JobStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Submitted | Self::Running)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary counts reported by the remote system for one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub processed: u64,
    pub failed: u64,
    pub created: u64,
}

impl JobCounts {
    #[must_use]
    pub fn succeeded(&self) -> u64 {
        self.processed.saturating_sub(self.failed)
    }

    /// At least one record succeeded and at least one failed.
    #[must_use]
    pub fn is_partial_success(&self) -> bool {
        self.processed > 0 && self.failed > 0 && self.failed < self.processed
    }

    /// Every processed record failed.
    #[must_use]
    pub fn is_total_failure(&self) -> bool {
        self.processed > 0 && self.failed >= self.processed
    }
}

/// A dispatched bulk job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: String,
    pub operation: Operation,
    pub status: JobStatus,
    pub counts: JobCounts,
}

impl SyncJob {
    #[must_use]
    pub fn submitted(id: impl Into<String>, operation: Operation) -> Self {
        Self {
            id: id.into(),
            operation,
            status: JobStatus::Submitted,
            counts: JobCounts::default(),
        }
    }

    /// Apply a poll observation. Observations after a terminal status are
    /// ignored; returns whether the job is now terminal.
    pub fn observe(&mut self, status: JobStatus, counts: JobCounts) -> bool {
        if !self.status.is_terminal() {
            self.status = status;
            self.counts = counts;
        }
        self.status.is_terminal()
    }
}
