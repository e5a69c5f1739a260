//! Per-record job outcomes and identifier mappings.

use serde::{Deserialize, Serialize};

/// What happened to one submitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Created,
    Updated,
    /// Rejected because the record already exists remotely. Carries the
    /// existing identifier when the remote error reported one.
    Duplicate,
    Failed,
}

/// One row of a job's result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub natural_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub kind: OutcomeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_error: Option<String>,
    /// Source row, when the record never left the transformer or the row
    /// could be matched back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
}

impl OutcomeRecord {
    #[must_use]
    pub fn succeeded(natural_key: Option<String>, external_id: impl Into<String>, created: bool) -> Self {
        Self {
            natural_key,
            external_id: Some(external_id.into()),
            kind: if created {
                OutcomeKind::Created
            } else {
                OutcomeKind::Updated
            },
            raw_error: None,
            row: None,
        }
    }

    #[must_use]
    pub fn failed(natural_key: Option<String>, raw_error: impl Into<String>) -> Self {
        Self {
            natural_key,
            external_id: None,
            kind: OutcomeKind::Failed,
            raw_error: Some(raw_error.into()),
            row: None,
        }
    }

    /// A record the remote system already holds, with the identifier it
    /// reported for the existing copy.
    #[must_use]
    pub fn duplicate(
        natural_key: Option<String>,
        existing_id: impl Into<String>,
        raw_error: impl Into<String>,
    ) -> Self {
        Self {
            natural_key,
            external_id: Some(existing_id.into()),
            kind: OutcomeKind::Duplicate,
            raw_error: Some(raw_error.into()),
            row: None,
        }
    }

    #[must_use]
    pub fn with_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    /// Natural key and identifier, when both are known. Only these records
    /// can be reconciled back into the source store.
    #[must_use]
    pub fn mapping(&self) -> Option<IdentifierMapping> {
        match (&self.natural_key, &self.external_id) {
            (Some(key), Some(id)) if !key.is_empty() && !id.is_empty() => Some(IdentifierMapping {
                natural_key: key.clone(),
                external_id: id.clone(),
            }),
            _ => None,
        }
    }

    /// Human-readable label for reports.
    #[must_use]
    pub fn label(&self) -> String {
        match (&self.natural_key, self.row) {
            (Some(key), _) if !key.is_empty() => key.clone(),
            (_, Some(row)) => format!("Row {row}"),
            _ => "Unnamed record".to_string(),
        }
    }
}

/// Natural key → external identifier, used to back-write the source store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentifierMapping {
    pub natural_key: String,
    pub external_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succeeded_kind_tracks_created_flag() {
        let created = OutcomeRecord::succeeded(Some("A".into()), "01t1", true);
        assert_eq!(created.kind, OutcomeKind::Created);
        let updated = OutcomeRecord::succeeded(Some("A".into()), "01t1", false);
        assert_eq!(updated.kind, OutcomeKind::Updated);
    }

    #[test]
    fn mapping_requires_key_and_id() {
        let ok = OutcomeRecord::succeeded(Some("Widget".into()), "01t1", true);
        assert_eq!(
            ok.mapping(),
            Some(IdentifierMapping {
                natural_key: "Widget".into(),
                external_id: "01t1".into()
            })
        );
        assert!(OutcomeRecord::succeeded(None, "01t1", true).mapping().is_none());
        assert!(OutcomeRecord::failed(Some("Widget".into()), "boom").mapping().is_none());
        let dup = OutcomeRecord::duplicate(Some("Widget".into()), "01t9", "DUPLICATE_VALUE");
        assert_eq!(dup.kind, OutcomeKind::Duplicate);
        assert_eq!(dup.mapping().unwrap().external_id, "01t9");
    }

    #[test]
    fn label_falls_back_to_row() {
        assert_eq!(OutcomeRecord::failed(Some("W".into()), "x").label(), "W");
        assert_eq!(OutcomeRecord::failed(None, "x").with_row(4).label(), "Row 4");
        assert_eq!(OutcomeRecord::failed(None, "x").label(), "Unnamed record");
    }
}
