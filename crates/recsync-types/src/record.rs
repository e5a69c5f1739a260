//! Record model shared by the source store, transformer and dispatcher.
//!
//! A [`RecordBatch`] is one record type's worth of rows read from the
//! source-of-truth store. Values are [`FieldValue`]s so that "no value" is
//! never confused with `"false"` or `"0"`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RecordType
// ---------------------------------------------------------------------------

/// Remote object type name (e.g. `"Product2"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordType(String);

impl RecordType {
    /// Create a new record type name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for RecordType {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

/// Strip "required" markers (`*`) and surrounding whitespace from a header.
#[must_use]
pub fn clean_field_name(raw: &str) -> String {
    raw.replace('*', "").trim().to_string()
}

// ---------------------------------------------------------------------------
// FieldValue
// ---------------------------------------------------------------------------

/// A single cell value.
///
/// Serializes as `null` / string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum FieldValue {
    /// No value. Transmitted as an empty cell.
    #[default]
    Absent,
    /// Any present value, including `"false"` and `"0"`.
    Text(String),
}

static ABSENT: FieldValue = FieldValue::Absent;

impl FieldValue {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Absent => None,
            Self::Text(s) => Some(s),
        }
    }

    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Absent, Self::Text)
    }
}

impl From<FieldValue> for Option<String> {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Absent => None,
            FieldValue::Text(s) => Some(s),
        }
    }
}

// ---------------------------------------------------------------------------
// Record / RecordBatch
// ---------------------------------------------------------------------------

/// One row of a record set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// 1-based data row number in the source sheet (header excluded).
    pub row: usize,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    #[must_use]
    pub fn new(row: usize) -> Self {
        Self {
            row,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style setter, mostly for tests and fixtures.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), FieldValue::Text(value.into()));
        self
    }

    /// Value of `field`, or [`FieldValue::Absent`] when the field is missing.
    #[must_use]
    pub fn get(&self, field: &str) -> &FieldValue {
        self.fields.get(field).unwrap_or(&ABSENT)
    }

    #[must_use]
    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).as_text()
    }

    pub fn set(&mut self, field: impl Into<String>, value: FieldValue) {
        self.fields.insert(field.into(), value);
    }

    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.fields.remove(field)
    }

    /// `true` when every field is absent.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.fields.values().all(FieldValue::is_absent)
    }
}

/// Ordered record set for one record type.
///
/// Created per synchronization run from the source store and treated as
/// immutable once handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordBatch {
    pub record_type: RecordType,
    /// Natural-key field used to match remote results back to rows.
    pub natural_key: String,
    /// Column order, as read from the header row.
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl RecordBatch {
    #[must_use]
    pub fn new(
        record_type: impl Into<RecordType>,
        natural_key: impl Into<String>,
        columns: Vec<String>,
    ) -> Self {
        Self {
            record_type: record_type.into(),
            natural_key: natural_key.into(),
            columns,
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Natural-key value of `record` under this batch's key field.
    #[must_use]
    pub fn natural_key_of<'a>(&self, record: &'a Record) -> Option<&'a str> {
        record.text(&self.natural_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_type_display_and_as_str() {
        let rt = RecordType::new("Product2");
        assert_eq!(rt.as_str(), "Product2");
        assert_eq!(rt.to_string(), "Product2");
    }

    #[test]
    fn clean_field_name_strips_markers() {
        assert_eq!(clean_field_name(" Name* "), "Name");
        assert_eq!(clean_field_name("*Product Code"), "Product Code");
        assert_eq!(clean_field_name("Id"), "Id");
    }

    #[test]
    fn absent_is_not_false_or_zero() {
        assert_ne!(FieldValue::Absent, FieldValue::text("false"));
        assert_ne!(FieldValue::Absent, FieldValue::text("0"));
        assert!(FieldValue::Absent.is_absent());
        assert!(!FieldValue::text("").is_absent());
    }

    #[test]
    fn field_value_serializes_as_nullable_string() {
        let json = serde_json::to_string(&FieldValue::Absent).unwrap();
        assert_eq!(json, "null");
        let json = serde_json::to_string(&FieldValue::text("Active")).unwrap();
        assert_eq!(json, "\"Active\"");
        let back: FieldValue = serde_json::from_str("null").unwrap();
        assert_eq!(back, FieldValue::Absent);
    }

    #[test]
    fn missing_field_reads_as_absent() {
        let rec = Record::new(1).with("Name", "Widget");
        assert_eq!(rec.text("Name"), Some("Widget"));
        assert!(rec.get("Code").is_absent());
    }

    #[test]
    fn blank_record_detection() {
        let mut rec = Record::new(3);
        rec.set("Name", FieldValue::Absent);
        assert!(rec.is_blank());
        rec.set("Code", FieldValue::text("W-1"));
        assert!(!rec.is_blank());
    }

    #[test]
    fn batch_natural_key_lookup() {
        let mut batch = RecordBatch::new("Product2", "Name", vec!["Name".into()]);
        batch.push(Record::new(1).with("Name", "Widget"));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.natural_key_of(&batch.records[0]), Some("Widget"));
    }
}
