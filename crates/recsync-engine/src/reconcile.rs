//! Identifier reconciliation: write external identifiers back into the
//! source store by natural key.

use std::collections::HashMap;

use recsync_store::{IdentifierWrite, SheetBinding, SourceStore, StoreError, WriteOutcome};
use recsync_types::outcome::OutcomeRecord;
use serde::{Deserialize, Serialize};

/// Two different identifiers reported for one natural key in one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierConflict {
    pub natural_key: String,
    pub kept: String,
    pub discarded: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Mappings that matched at least one source row.
    pub reconciled: usize,
    /// Cells actually changed.
    pub rows_written: usize,
    /// Natural keys with no matching source row, then labels of outcomes
    /// that carried an identifier but no natural key.
    pub unmatched: Vec<String>,
    pub conflicts: Vec<IdentifierConflict>,
}

/// Write each outcome's identifier into `identifier_column`.
///
/// The first identifier seen for a natural key wins. All writes go to the
/// store as one batch. Running the same outcomes twice changes nothing the
/// second time.
///
/// # Errors
///
/// Returns [`StoreError`] when the store cannot be read or written.
pub fn reconcile(
    store: &dyn SourceStore,
    binding: &SheetBinding,
    identifier_column: &str,
    outcomes: &[OutcomeRecord],
) -> Result<Reconciliation, StoreError> {
    let mut result = Reconciliation::default();
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut writes = Vec::new();
    let mut keyless = Vec::new();

    for outcome in outcomes {
        let Some(mapping) = outcome.mapping() else {
            if outcome.external_id.is_some() {
                keyless.push(outcome.label());
            }
            continue;
        };
        let key = mapping.natural_key.trim().to_string();

        if let Some(kept) = seen.get(&key) {
            if *kept != mapping.external_id {
                tracing::warn!(
                    record_type = binding.record_type.as_str(),
                    natural_key = key.as_str(),
                    kept = kept.as_str(),
                    discarded = mapping.external_id.as_str(),
                    "Conflicting identifiers for one natural key, keeping the first"
                );
                result.conflicts.push(IdentifierConflict {
                    natural_key: key,
                    kept: kept.clone(),
                    discarded: mapping.external_id,
                });
            }
            continue;
        }

        writes.push(IdentifierWrite::new(key.clone(), mapping.external_id.clone()));
        seen.insert(key, mapping.external_id);
    }

    if !writes.is_empty() {
        let written = store.write_identifiers(binding, identifier_column, &writes)?;
        for (write, outcome) in writes.into_iter().zip(written) {
            match outcome {
                WriteOutcome::Written(n) => {
                    result.reconciled += 1;
                    result.rows_written += n;
                }
                WriteOutcome::Unchanged => result.reconciled += 1,
                WriteOutcome::NotFound => {
                    tracing::debug!(
                        record_type = binding.record_type.as_str(),
                        natural_key = write.natural_key.as_str(),
                        "No source row for reconciled identifier"
                    );
                    result.unmatched.push(write.natural_key);
                }
            }
        }
    }
    result.unmatched.extend(keyless);

    tracing::info!(
        record_type = binding.record_type.as_str(),
        reconciled = result.reconciled,
        rows_written = result.rows_written,
        unmatched = result.unmatched.len(),
        conflicts = result.conflicts.len(),
        "Identifiers reconciled"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use recsync_store::{MemorySourceStore, Sheet};

    fn store() -> MemorySourceStore {
        MemorySourceStore::new().with_sheet(
            "Product2",
            Sheet::new(vec!["Name*".into(), "Family".into()])
                .with_row(["Widget", "Hardware"])
                .with_row(["Gadget", ""])
                .with_row([" Gizmo ", "Tools"]),
        )
    }

    fn binding() -> SheetBinding {
        SheetBinding::new("Product2", "Product2", "Name")
    }

    fn ok(key: &str, id: &str) -> OutcomeRecord {
        OutcomeRecord::succeeded(Some(key.into()), id, true)
    }

    #[test]
    fn writes_ids_and_creates_column() {
        let store = store();
        let outcomes = vec![ok("Widget", "01tA"), ok("Gizmo", "01tC")];
        let result = reconcile(&store, &binding(), "Id", &outcomes).unwrap();
        assert_eq!(result.reconciled, 2);
        assert_eq!(result.rows_written, 2);
        assert!(result.unmatched.is_empty());

        let sheet = store.sheet("Product2").unwrap();
        assert_eq!(sheet.header, vec!["Name*", "Family", "Id"]);
        assert_eq!(sheet.rows[0], vec!["Widget", "Hardware", "01tA"]);
        assert_eq!(sheet.rows[1][2], "");
        assert_eq!(sheet.rows[2], vec![" Gizmo ", "Tools", "01tC"]);
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let store = store();
        let outcomes = vec![ok("Widget", "01tA"), ok("Gadget", "01tB")];
        reconcile(&store, &binding(), "Id", &outcomes).unwrap();
        let before = store.sheet("Product2").unwrap();

        let again = reconcile(&store, &binding(), "Id", &outcomes).unwrap();
        assert_eq!(again.reconciled, 2);
        assert_eq!(again.rows_written, 0);
        assert_eq!(store.sheet("Product2").unwrap(), before);
    }

    #[test]
    fn first_identifier_wins_on_conflict() {
        let store = store();
        let outcomes = vec![ok("Widget", "01tA"), ok("Widget", "01tZ"), ok("Widget", "01tA")];
        let result = reconcile(&store, &binding(), "Id", &outcomes).unwrap();
        assert_eq!(result.reconciled, 1);
        assert_eq!(
            result.conflicts,
            vec![IdentifierConflict {
                natural_key: "Widget".into(),
                kept: "01tA".into(),
                discarded: "01tZ".into(),
            }]
        );
        assert_eq!(store.sheet("Product2").unwrap().rows[0][2], "01tA");
    }

    #[test]
    fn unmatched_and_keyless_outcomes_are_noted() {
        let store = store();
        let outcomes = vec![
            ok("Nope", "01tX"),
            OutcomeRecord::succeeded(None, "01tY", true).with_row(7),
            OutcomeRecord::failed(Some("Widget".into()), "boom"),
        ];
        let result = reconcile(&store, &binding(), "Id", &outcomes).unwrap();
        assert_eq!(result.reconciled, 0);
        assert_eq!(result.unmatched, vec!["Nope".to_string(), "Row 7".to_string()]);
        assert_eq!(store.sheet("Product2").unwrap().header.len(), 2);
    }

    #[test]
    fn duplicate_outcome_is_reconciled() {
        let store = store();
        let outcomes = vec![OutcomeRecord::duplicate(
            Some("Gadget".into()),
            "01tOLD",
            "DUPLICATE_VALUE",
        )];
        let result = reconcile(&store, &binding(), "Id", &outcomes).unwrap();
        assert_eq!(result.reconciled, 1);
        assert_eq!(store.sheet("Product2").unwrap().rows[1][2], "01tOLD");
    }

    #[test]
    fn large_batch_reconciles_every_row() {
        let mut sheet = Sheet::new(vec!["Name".into()]);
        for i in 0..2_000 {
            sheet = sheet.with_row([format!("Product {i}")]);
        }
        let store = MemorySourceStore::new().with_sheet("Product2", sheet);
        let outcomes: Vec<OutcomeRecord> = (0..2_000)
            .rev()
            .map(|i| ok(&format!("Product {i}"), &format!("01t{i:05}")))
            .collect();

        let result = reconcile(&store, &binding(), "Id", &outcomes).unwrap();
        assert_eq!(result.reconciled, 2_000);
        assert_eq!(result.rows_written, 2_000);
        let sheet = store.sheet("Product2").unwrap();
        assert_eq!(sheet.rows[0], vec!["Product 0", "01t00000"]);
        assert_eq!(sheet.rows[1_999], vec!["Product 1999", "01t01999"]);
    }

    #[test]
    fn missing_sheet_is_an_error() {
        let store = MemorySourceStore::new();
        let err = reconcile(&store, &binding(), "Id", &[ok("Widget", "01tA")]).unwrap_err();
        assert!(matches!(err, StoreError::SheetNotFound(_)));
    }
}
