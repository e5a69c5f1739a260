//! Error classifier: maps raw per-record error text to an actionable
//! category, extracted detail and resolution text.
//!
//! Rules are an ordered list and the first match wins. Matching is
//! case-insensitive with `.` spanning newlines. Text no rule matches is
//! `SYSTEM`. Everything here is pure.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use recsync_types::failure::{FailureCategory, FailureClassification, FailureDetail};
use recsync_types::outcome::OutcomeRecord;
use recsync_types::record::RecordType;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Longest raw error kept in archives and reports.
pub const MAX_ERROR_CHARS: usize = 500;

const UNKNOWN_ERROR: &str = "Unknown error";
const FALLBACK_RULE: &str = "unmatched";
const FALLBACK_RESOLUTION: &str =
    "Unexpected error. Check the remote system status or contact your administrator.";

type Extractor = fn(&Captures<'_>) -> Option<FailureDetail>;

struct Rule {
    name: &'static str,
    pattern: Regex,
    category: FailureCategory,
    /// Empty means every record type.
    applies_to: &'static [&'static str],
    extract: Option<Extractor>,
    resolution: &'static str,
}

impl Rule {
    fn new(
        name: &'static str,
        pattern: &str,
        category: FailureCategory,
        resolution: &'static str,
    ) -> Self {
        Self {
            name,
            pattern: Regex::new(&format!("(?is){pattern}")).expect("valid classifier pattern"),
            category,
            applies_to: &[],
            extract: None,
            resolution,
        }
    }

    fn extract(mut self, f: Extractor) -> Self {
        self.extract = Some(f);
        self
    }

    fn only_for(mut self, record_types: &'static [&'static str]) -> Self {
        self.applies_to = record_types;
        self
    }

    fn applies(&self, record_type: &RecordType) -> bool {
        self.applies_to.is_empty() || self.applies_to.contains(&record_type.as_str())
    }
}

fn group(caps: &Captures<'_>, i: usize) -> Option<String> {
    caps.get(i)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn field_list(caps: &Captures<'_>) -> Option<FailureDetail> {
    let names: Vec<String> = group(caps, 1)?
        .split(',')
        .map(|f| f.trim().trim_end_matches('.').to_string())
        .filter(|f| !f.is_empty())
        .collect();
    match names.len() {
        0 => None,
        1 => names.into_iter().next().map(|name| FailureDetail::Field { name }),
        _ => Some(FailureDetail::Fields { names }),
    }
}

fn single_field(caps: &Captures<'_>) -> Option<FailureDetail> {
    group(caps, 1).map(|name| FailureDetail::Field { name })
}

fn message(caps: &Captures<'_>) -> Option<FailureDetail> {
    group(caps, 1).map(|text| FailureDetail::Message { text })
}

fn duplicate(caps: &Captures<'_>) -> Option<FailureDetail> {
    Some(FailureDetail::Duplicate {
        field: group(caps, 1)?,
        existing_id: group(caps, 2)?,
    })
}

use FailureCategory::{AlreadyExists, Data, Permission, Relationship, System, Validation};

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new(
            "invalid_transform",
            r"INVALID_TRANSFORM: field '([^']+)'",
            Data,
            "A value could not be converted before sending. Fix the highlighted field in the {object} sheet.",
        )
        .extract(single_field),
        Rule::new(
            "field_not_writable",
            r"Unable to create/update fields: ([A-Za-z0-9_, ]+)",
            Permission,
            "Check field-level security in Setup > Object Manager > {object} > Fields & Relationships. Ensure your profile or permission set has Edit access to these fields.",
        )
        .extract(field_list),
        Rule::new(
            "decimal_for_integer",
            r"INVALID_FIELD.*Failed to deserialize field.*'[\d.]+' is not a valid value for the type xsd:int",
            Data,
            "Integer field received decimal value. The data needs to be converted to whole numbers without decimals.",
        ),
        Rule::new(
            "invalid_field_for_insert_update",
            r"INVALID_FIELD_FOR_INSERT_UPDATE",
            Permission,
            "One or more fields cannot be updated. Check field-level security and field accessibility.",
        ),
        Rule::new(
            "child_in_group_input",
            r"INVALID_INPUT.*?The child product exists in the group",
            AlreadyExists,
            "This relationship already exists. The product is already associated with this group.",
        ),
        Rule::new(
            "sell_only_with_others",
            r"Sell only with other products|can't be assigned to the category because the Sell only with other products",
            Validation,
            "This product is configured as \"Sell only with other products\". Uncheck this option on the product record to allow category assignment.",
        )
        .only_for(&["ProductCategoryProduct"]),
        Rule::new(
            "custom_validation",
            r"FIELD_CUSTOM_VALIDATION_EXCEPTION.*?:(.+)",
            Validation,
            "Custom validation rule failed. Review the validation rules on {object} and ensure data meets all criteria.",
        )
        .extract(message),
        Rule::new(
            "invalid_operation",
            r"INVALID_OPERATION.*?:(.+)",
            Validation,
            "Operation not allowed due to object configuration or business rules.",
        )
        .extract(message),
        Rule::new(
            "duplicate_with_id",
            r"duplicate value found: (.+?) duplicates value on record with id: ([A-Za-z0-9]+)",
            AlreadyExists,
            "This record already exists. No action needed, the existing record remains unchanged.",
        )
        .extract(duplicate),
        Rule::new(
            "child_in_group",
            r"The child product exists in the group",
            AlreadyExists,
            "This relationship already exists. The product is already associated with this group.",
        ),
        Rule::new(
            "duplicate_value",
            r"DUPLICATE_VALUE",
            AlreadyExists,
            "Record already exists. The existing record remains unchanged.",
        ),
        Rule::new(
            "required_fields_list",
            r"Required fields are missing: \[(.+?)\]",
            Data,
            "Provide values for all required fields. Check the object definition for required field list.",
        )
        .extract(field_list),
        Rule::new(
            "required_field_missing",
            r"REQUIRED_FIELD_MISSING.*?:(.+)",
            Data,
            "Required field is missing. Ensure all mandatory fields have values.",
        )
        .extract(message),
        Rule::new(
            "id_of_incorrect_type",
            r"id value of incorrect type: (.+)",
            Relationship,
            "The ID format is incorrect for the referenced object. Ensure you are using valid record IDs (18 or 15 characters).",
        )
        .extract(message),
        Rule::new(
            "entity_deleted",
            r"entity is deleted",
            Relationship,
            "The referenced record has been deleted. Use an active record or remove this reference.",
        ),
        Rule::new(
            "cross_reference_access",
            r"insufficient access rights on cross-reference id",
            Relationship,
            "You do not have access to the referenced record. Ensure you have at least Read access to all parent/related records.",
        ),
        Rule::new(
            "invalid_cross_reference",
            r"INVALID_CROSS_REFERENCE_KEY",
            Relationship,
            "Invalid reference to another record. Verify that all referenced records exist and are accessible.",
        ),
        Rule::new(
            "invalid_date",
            r"Invalid date.*?:(.+)",
            Data,
            "Date format is invalid. Use YYYY-MM-DD format for dates.",
        )
        .extract(message),
        Rule::new(
            "invalid_number",
            r"Invalid number.*?:(.+)",
            Data,
            "Number format is invalid. Ensure numeric fields contain valid numbers without text.",
        )
        .extract(message),
        Rule::new(
            "invalid_boolean",
            r"Invalid boolean.*?:(.+)",
            Data,
            "Boolean value is invalid. Use true/false or TRUE/FALSE for boolean fields.",
        )
        .extract(message),
        Rule::new(
            "restricted_picklist",
            r"bad value for restricted picklist field: (.+)",
            Data,
            "Invalid picklist value. Check Setup > Object Manager > {object} for valid picklist values.",
        )
        .extract(message),
        Rule::new(
            "storage_limit",
            r"STORAGE_LIMIT_EXCEEDED",
            System,
            "Storage limit exceeded. Free up space in your org or increase storage limits.",
        ),
        Rule::new(
            "request_limit",
            r"REQUEST_LIMIT_EXCEEDED",
            System,
            "API request limit exceeded. Wait and retry, or process in smaller batches.",
        ),
    ]
});

/// Classify one raw error for `record_type`.
#[must_use]
pub fn classify(raw_error: &str, record_type: &RecordType) -> FailureClassification {
    let text = if raw_error.trim().is_empty() {
        UNKNOWN_ERROR
    } else {
        raw_error
    };

    for rule in RULES.iter().filter(|r| r.applies(record_type)) {
        if let Some(caps) = rule.pattern.captures(text) {
            return FailureClassification {
                category: rule.category,
                rule: rule.name.to_string(),
                detail: rule.extract.and_then(|f| f(&caps)),
                resolution: rule.resolution.replace("{object}", record_type.as_str()),
            };
        }
    }

    FailureClassification {
        category: FailureCategory::System,
        rule: FALLBACK_RULE.to_string(),
        detail: None,
        resolution: FALLBACK_RESOLUTION.to_string(),
    }
}

/// Cut `raw` to [`MAX_ERROR_CHARS`] characters.
#[must_use]
pub fn truncate_error(raw: &str) -> String {
    match raw.char_indices().nth(MAX_ERROR_CHARS) {
        Some((cut, _)) => raw[..cut].to_string(),
        None => raw.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Grouping and recommendations
// ---------------------------------------------------------------------------

/// A failed (or duplicate) outcome with its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedFailure {
    pub outcome: OutcomeRecord,
    pub classification: FailureClassification,
}

/// One failed record inside a [`FailureGroup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupedRecord {
    pub label: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<FailureDetail>,
}

/// Failures of one category, aggregated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureGroup {
    pub category: FailureCategory,
    pub count: usize,
    /// Distinct, first-seen order.
    pub resolutions: Vec<String>,
    /// Distinct field names pulled from details, first-seen order.
    pub fields: Vec<String>,
    pub records: Vec<GroupedRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Aggregated, actionable advice for one failure category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: FailureCategory,
    pub priority: Priority,
    pub summary: String,
    pub action: String,
    pub steps: Vec<String>,
}

fn push_distinct(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// Group failures by category, in category order.
#[must_use]
pub fn group_failures(failures: &[ClassifiedFailure]) -> Vec<FailureGroup> {
    let mut groups: BTreeMap<FailureCategory, FailureGroup> = BTreeMap::new();
    for failure in failures {
        let category = failure.classification.category;
        let group = groups.entry(category).or_insert_with(|| FailureGroup {
            category,
            count: 0,
            resolutions: Vec::new(),
            fields: Vec::new(),
            records: Vec::new(),
        });
        group.count += 1;
        push_distinct(&mut group.resolutions, &failure.classification.resolution);
        if let Some(detail) = &failure.classification.detail {
            for name in detail.field_names() {
                push_distinct(&mut group.fields, name);
            }
        }
        group.records.push(GroupedRecord {
            label: failure.outcome.label(),
            error: truncate_error(failure.outcome.raw_error.as_deref().unwrap_or(UNKNOWN_ERROR)),
            detail: failure.classification.detail.clone(),
        });
    }
    groups.into_values().collect()
}

fn steps(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|s| (*s).to_string()).collect()
}

/// One recommendation per group, highest priority first.
#[must_use]
pub fn recommend(groups: &[FailureGroup], record_type: &RecordType) -> Vec<Recommendation> {
    let object = record_type.as_str();
    let mut out: Vec<Recommendation> = groups
        .iter()
        .map(|group| {
            let (priority, action, steps) = match group.category {
                FailureCategory::Permission => (
                    Priority::High,
                    "Review Field-Level Security",
                    vec![
                        format!("Navigate to Setup > Object Manager > {object}"),
                        "Click on Fields & Relationships".to_string(),
                        "Review field-level security for affected fields".to_string(),
                        "Ensure your profile or permission set has Edit access".to_string(),
                    ],
                ),
                FailureCategory::Validation if object == "ProductCategoryProduct" => (
                    Priority::High,
                    "Update Product Configuration",
                    steps(&[
                        "Open the affected product records",
                        "Uncheck \"Sell only with other products\"",
                        "Save the changes",
                        "Run the sync again for these records",
                    ]),
                ),
                FailureCategory::Validation => (
                    Priority::High,
                    "Review Validation Rules",
                    vec![
                        format!("Go to Setup > Object Manager > {object}"),
                        "Click on Validation Rules".to_string(),
                        "Review active validation rules".to_string(),
                        "Ensure your data meets all validation criteria".to_string(),
                    ],
                ),
                FailureCategory::Relationship => (
                    Priority::Medium,
                    "Verify Parent Records",
                    steps(&[
                        "Check that all referenced parent records exist",
                        "Ensure you have at least Read access to parent records",
                        "Sync parent record types first if they are missing",
                        "Verify that record IDs are in the correct format",
                    ]),
                ),
                FailureCategory::Data => (
                    Priority::Medium,
                    "Fix Data Format Issues",
                    steps(&[
                        "Review the sheet for data format issues",
                        "Ensure dates are in YYYY-MM-DD format",
                        "Verify numeric fields contain only numbers",
                        "Check that required fields are populated",
                    ]),
                ),
                FailureCategory::System => (
                    Priority::Medium,
                    "Check System Limits",
                    steps(&[
                        "Check the remote system status and org limits",
                        "Retry the sync later or with fewer records",
                        "Contact your administrator if the error persists",
                    ]),
                ),
                FailureCategory::AlreadyExists => (
                    Priority::Low,
                    "Handle Duplicate Records",
                    steps(&[
                        "Review the existing records",
                        "Use upsert with an external ID to update existing records",
                        "Remove duplicate rows from the sheet",
                    ]),
                ),
            };
            let mut summary = format!(
                "{} {} record(s) failed with {} errors",
                group.count, object, group.category
            );
            if !group.fields.is_empty() {
                summary.push_str(&format!(" (fields: {})", group.fields.join(", ")));
            }
            Recommendation {
                category: group.category,
                priority,
                summary,
                action: action.to_string(),
                steps,
            }
        })
        .collect();
    out.sort_by_key(|r| r.priority);
    out
}
