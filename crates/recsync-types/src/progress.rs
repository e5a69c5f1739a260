//! Progress snapshots published while an orchestration runs.

use serde::{Deserialize, Serialize};

/// Coarse phase of a running orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Initializing,
    Syncing,
    Completed,
}

/// What a polling caller sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub status: ProgressPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_type: Option<String>,
    pub completed: usize,
    pub total: usize,
    pub message: String,
}

impl ProgressSnapshot {
    #[must_use]
    pub fn initializing(total: usize) -> Self {
        Self {
            status: ProgressPhase::Initializing,
            current_type: None,
            completed: 0,
            total,
            message: "Preparing sync".to_string(),
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status == ProgressPhase::Completed
    }
}
