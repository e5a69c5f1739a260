//! Failure taxonomy shared by the classifier, reports and the failure archive.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCategory {
    /// Field or object access denied.
    Permission,
    /// A business rule rejected the record.
    Validation,
    /// Duplicate by natural key or unique field.
    AlreadyExists,
    /// Malformed value: wrong type, bad enumerated value, out-of-range number.
    Data,
    /// Broken or inaccessible reference to another record.
    Relationship,
    /// Anything unmatched, including capacity and rate limits.
    System,
}

impl FailureCategory {
    pub const ALL: [Self; 6] = [
        Self::Permission,
        Self::Validation,
        Self::AlreadyExists,
        Self::Data,
        Self::Relationship,
        Self::System,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Permission => "PERMISSION",
            Self::Validation => "VALIDATION",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::Data => "DATA",
            Self::Relationship => "RELATIONSHIP",
            Self::System => "SYSTEM",
        }
    }

    /// Parse the storage form produced by [`as_str`](Self::as_str).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured detail pulled out of a raw error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureDetail {
    /// A single offending field (or field list as reported).
    Field { name: String },
    /// Several offending fields.
    Fields { names: Vec<String> },
    /// The record duplicates an existing remote record.
    Duplicate { field: String, existing_id: String },
    /// Free-text detail (validation message, bad value, ...).
    Message { text: String },
}

impl FailureDetail {
    /// Identifier of the pre-existing remote record, for duplicates.
    #[must_use]
    pub fn existing_id(&self) -> Option<&str> {
        match self {
            Self::Duplicate { existing_id, .. } => Some(existing_id),
            _ => None,
        }
    }

    /// Field names mentioned by this detail.
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        match self {
            Self::Field { name } => vec![name.as_str()],
            Self::Fields { names } => names.iter().map(String::as_str).collect(),
            Self::Duplicate { field, .. } => vec![field.as_str()],
            Self::Message { .. } => Vec::new(),
        }
    }
}

/// Outcome of classifying one raw error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureClassification {
    pub category: FailureCategory,
    /// Name of the rule that matched, or `"unmatched"`.
    pub rule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<FailureDetail>,
    pub resolution: String,
}

/// Archived failed record, persisted by the status backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub record_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natural_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    pub error_message: String,
    pub category: FailureCategory,
    pub resolution: String,
    /// ISO-8601 UTC timestamp.
    pub failed_at: String,
}
