//! Partial-failure extraction: partition a job's per-record results into
//! succeeded, duplicate and failed outcomes.

use std::collections::HashMap;

use recsync_types::failure::FailureCategory;
use recsync_types::outcome::OutcomeRecord;
use recsync_types::record::RecordBatch;

use crate::classify::{classify, ClassifiedFailure};
use crate::dispatch::JobResults;

/// Per-record outcomes of one job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Created or updated records, with their new identifiers.
    pub succeeded: Vec<OutcomeRecord>,
    /// Rejected as already existing; each carries the existing identifier.
    pub duplicates: Vec<ClassifiedFailure>,
    pub failed: Vec<ClassifiedFailure>,
}

impl Extraction {
    /// Outcomes whose identifiers belong in the source store.
    pub fn reconcilable(&self) -> impl Iterator<Item = &OutcomeRecord> {
        self.succeeded
            .iter()
            .chain(self.duplicates.iter().map(|d| &d.outcome))
    }
}

/// Partition `results` for `batch`, attaching source row numbers by natural
/// key.
#[must_use]
pub fn extract(results: &JobResults, batch: &RecordBatch) -> Extraction {
    let mut rows: HashMap<&str, usize> = HashMap::new();
    for record in &batch.records {
        if let Some(key) = batch.natural_key_of(record) {
            rows.entry(key.trim()).or_insert(record.row);
        }
    }
    let row_of = |key: Option<&String>| key.and_then(|k| rows.get(k.trim()).copied());

    let mut out = Extraction::default();

    for row in &results.succeeded {
        let mut outcome = OutcomeRecord::succeeded(row.natural_key.clone(), &row.id, row.created);
        outcome.row = row_of(row.natural_key.as_ref());
        out.succeeded.push(outcome);
    }

    for row in &results.failed {
        let classification = classify(&row.error, &batch.record_type);
        let existing_id = (classification.category == FailureCategory::AlreadyExists)
            .then(|| classification.detail.as_ref().and_then(|d| d.existing_id()))
            .flatten()
            .map(str::to_string);

        let mut outcome = match existing_id {
            Some(id) => OutcomeRecord::duplicate(row.natural_key.clone(), id, &row.error),
            None => OutcomeRecord::failed(row.natural_key.clone(), &row.error),
        };
        outcome.row = row_of(row.natural_key.as_ref());

        let failure = ClassifiedFailure {
            outcome,
            classification,
        };
        if failure.outcome.external_id.is_some() {
            out.duplicates.push(failure);
        } else {
            out.failed.push(failure);
        }
    }

    tracing::debug!(
        record_type = batch.record_type.as_str(),
        succeeded = out.succeeded.len(),
        duplicates = out.duplicates.len(),
        failed = out.failed.len(),
        "Extracted job results"
    );
    out
}
