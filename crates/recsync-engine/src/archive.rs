//! Failure archive persistence helper used by the orchestrator.

use recsync_state::StatusBackend;
use recsync_types::failure::FailureRecord;
use recsync_types::record::RecordType;

use crate::classify::{truncate_error, ClassifiedFailure};

/// Convert classified failures into archive rows.
pub(crate) fn failure_records(
    record_type: &RecordType,
    failures: &[ClassifiedFailure],
    failed_at: &str,
) -> Vec<FailureRecord> {
    failures
        .iter()
        .map(|f| FailureRecord {
            record_type: record_type.to_string(),
            natural_key: f.outcome.natural_key.clone(),
            row: f.outcome.row,
            error_message: truncate_error(f.outcome.raw_error.as_deref().unwrap_or_default()),
            category: f.classification.category,
            resolution: f.classification.resolution.clone(),
            failed_at: failed_at.to_string(),
        })
        .collect()
}

/// Persist failed records to the status backend.
pub(crate) fn persist_failures(
    status_backend: &dyn StatusBackend,
    record_type: &RecordType,
    run_id: i64,
    records: &[FailureRecord],
) {
    if records.is_empty() {
        return;
    }

    let failure_count = records.len();

    match status_backend.insert_failure_records(run_id, records) {
        Ok(inserted) => {
            tracing::info!(
                record_type = record_type.as_str(),
                archived = inserted,
                "Archived failed records"
            );
        }
        Err(e) => {
            tracing::error!(
                record_type = record_type.as_str(),
                failure_count,
                error = %e,
                "Failed to archive failed records"
            );
        }
    }
}
