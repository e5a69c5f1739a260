//! Field transformer: turns a raw sheet batch into a transmittable one.
//!
//! Per record, in order:
//! 1. header names lose their `*` markers and surrounding whitespace
//! 2. empty values and "no value" stand-ins become [`FieldValue::Absent`]
//! 3. rows with nothing but absent values are dropped
//! 4. configured per-field transforms run, in field order
//! 5. never-transmit fields are removed
//!
//! Inserts also leave out the identifier column.
//!
//! A transform that rejects a value marks only that record invalid; the
//! record is reported as a failed outcome carrying an `INVALID_TRANSFORM`
//! error and is left out of the dispatched batch.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use recsync_types::job::Operation;
use recsync_types::outcome::OutcomeRecord;
use recsync_types::record::{clean_field_name, FieldValue, Record, RecordBatch};

use crate::config::types::{CodeConfig, TransformConfig};
use crate::registry::RecordTypeSpec;

/// Prefix of the synthetic error attached to records a transform rejected.
pub const INVALID_TRANSFORM: &str = "INVALID_TRANSFORM";

const ABSENT_STAND_INS: &[&str] = &["nan", "NaN", "None", "null", "NULL", "#N/A"];

const STOP_WORDS: &[&str] = &[
    "THE", "AND", "FOR", "OF", "IN", "ON", "AT", "TO", "A", "AN", "MANAGED", "PACK", "PACKAGE",
];

/// Signature of a programmatically registered transform.
pub type CustomTransformFn =
    dyn Fn(&FieldValue, &Record) -> Result<FieldValue, String> + Send + Sync;

/// A per-field value transform. Pure: the output depends only on the
/// field's value and the other fields of the same record.
#[derive(Clone)]
pub enum FieldTransform {
    StatusLabel { active: String, inactive: String },
    ProductCode(CodeConfig),
    Sku(CodeConfig),
    Integer,
    Constant(String),
    Custom(Arc<CustomTransformFn>),
}

impl fmt::Debug for FieldTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StatusLabel { active, inactive } => f
                .debug_struct("StatusLabel")
                .field("active", active)
                .field("inactive", inactive)
                .finish(),
            Self::ProductCode(code) => f.debug_tuple("ProductCode").field(code).finish(),
            Self::Sku(code) => f.debug_tuple("Sku").field(code).finish(),
            Self::Integer => f.write_str("Integer"),
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<&TransformConfig> for FieldTransform {
    fn from(config: &TransformConfig) -> Self {
        match config {
            TransformConfig::StatusLabel { active, inactive } => Self::StatusLabel {
                active: active.clone(),
                inactive: inactive.clone(),
            },
            TransformConfig::ProductCode(code) => Self::ProductCode(code.clone()),
            TransformConfig::Sku(code) => Self::Sku(code.clone()),
            TransformConfig::Integer => Self::Integer,
            TransformConfig::Constant { value } => Self::Constant(value.clone()),
        }
    }
}

impl FieldTransform {
    /// Wrap a closure as a transform. A panic inside the closure rejects
    /// the record being transformed, like an `Err` would.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&FieldValue, &Record) -> Result<FieldValue, String> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Transform one value.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the value cannot be converted.
    pub fn apply(&self, value: &FieldValue, record: &Record) -> Result<FieldValue, String> {
        match self {
            Self::StatusLabel { active, inactive } => Ok(match value.as_text() {
                Some(text) => match text.trim().to_ascii_uppercase().as_str() {
                    "TRUE" | "ACTIVE" => FieldValue::text(active.clone()),
                    "FALSE" | "INACTIVE" => FieldValue::text(inactive.clone()),
                    _ => value.clone(),
                },
                None => FieldValue::Absent,
            }),
            Self::ProductCode(code) => Ok(if value.is_absent() {
                FieldValue::text(product_code(record.text(&code.source), code))
            } else {
                value.clone()
            }),
            Self::Sku(code) => Ok(if value.is_absent() {
                FieldValue::text(format!("SKU-{}", product_code(record.text(&code.source), code)))
            } else {
                value.clone()
            }),
            Self::Integer => match value.as_text() {
                Some(text) => whole_number(text).map(FieldValue::text),
                None => Ok(FieldValue::Absent),
            },
            Self::Constant(default) => Ok(if value.is_absent() {
                FieldValue::text(default.clone())
            } else {
                value.clone()
            }),
            Self::Custom(f) => panic::catch_unwind(AssertUnwindSafe(|| f(value, record)))
                .unwrap_or_else(|payload| {
                    Err(format!("transform panicked: {}", panic_message(&*payload)))
                }),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// `true` for empty, whitespace-only and "no value" stand-in strings.
#[must_use]
pub fn is_absent_stand_in(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty() || ABSENT_STAND_INS.contains(&trimmed)
}

fn coalesce(value: &FieldValue) -> FieldValue {
    match value.as_text() {
        Some(text) if !is_absent_stand_in(text) => value.clone(),
        _ => FieldValue::Absent,
    }
}

fn whole_number(text: &str) -> Result<String, String> {
    let trimmed = text.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Ok(n.to_string());
    }
    match trimmed.parse::<f64>() {
        #[allow(clippy::cast_possible_truncation)]
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
            Ok((f as i64).to_string())
        }
        Ok(_) => Err(format!("'{trimmed}' is not a whole number")),
        Err(_) => Err(format!("'{trimmed}' is not a number")),
    }
}

/// Derive a product code from a product name.
///
/// `{prefix}-{line}-{abbrev}-{type}`, or `{prefix}-AUTO-GEN-CODE` when
/// there is no name to work from.
#[must_use]
pub fn product_code(name: Option<&str>, config: &CodeConfig) -> String {
    let Some(name) = name.filter(|n| !n.trim().is_empty()) else {
        return format!("{}-AUTO-GEN-CODE", config.prefix);
    };
    let upper = name.to_uppercase();

    let line = if upper.contains("HRM") {
        "HRM"
    } else if upper.contains("DCS") {
        "DCS"
    } else {
        config.default_line.as_str()
    };

    let type_code = if upper.contains("BUNDLE") {
        "BUN"
    } else if upper.contains("SERVICE") {
        "SVC"
    } else if upper.contains("SUPPORT") {
        "SUP"
    } else {
        "CMP"
    };

    let cleaned: String = upper
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect();
    let words: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|w| !STOP_WORDS.contains(w))
        .collect();

    let abbreviation = match words.as_slice() {
        [] => "GEN".to_string(),
        [only] => only.chars().take(4).collect(),
        [first, second] => first.chars().take(2).chain(second.chars().take(2)).collect(),
        many => many.iter().take(4).filter_map(|w| w.chars().next()).collect(),
    };

    format!("{}-{line}-{abbreviation}-{type_code}", config.prefix)
}

/// Result of transforming one batch.
#[derive(Debug, Clone)]
pub struct TransformedBatch {
    /// Records ready for dispatch.
    pub batch: RecordBatch,
    /// Records a transform rejected, as failed outcomes.
    pub invalid: Vec<OutcomeRecord>,
    /// Count of rows dropped because every value was absent.
    pub blank_rows: usize,
}

/// Clean and reshape `batch` for `spec`. Total: never fails as a whole.
///
/// Inserts never carry the identifier column: a row already written back
/// by an earlier run is resent by natural key only.
#[must_use]
pub fn transform_batch(
    batch: &RecordBatch,
    spec: &RecordTypeSpec,
    operation: Operation,
) -> TransformedBatch {
    let withheld = (operation == Operation::Insert).then_some(spec.identifier_column.as_str());

    let mut cleaned_columns: Vec<(String, String)> = Vec::new();
    for raw in &batch.columns {
        let clean = clean_field_name(raw);
        if Some(clean.as_str()) == withheld {
            continue;
        }
        if !cleaned_columns.iter().any(|(_, c)| c == &clean) {
            cleaned_columns.push((raw.clone(), clean));
        }
    }

    let columns: Vec<String> = cleaned_columns
        .iter()
        .map(|(_, clean)| clean.clone())
        .filter(|c| !spec.never_transmit.contains(c))
        .collect();
    let mut out = RecordBatch::new(batch.record_type.clone(), spec.natural_key.clone(), columns);
    let mut invalid = Vec::new();
    let mut blank_rows = 0;

    for source in &batch.records {
        let mut record = Record::new(source.row);
        for (raw, clean) in &cleaned_columns {
            record.set(clean.clone(), coalesce(source.get(raw)));
        }
        if record.is_blank() {
            blank_rows += 1;
            continue;
        }

        match apply_transforms(&mut record, spec, &out.columns) {
            Ok(()) => {
                for field in &spec.never_transmit {
                    record.remove(field);
                }
                out.push(record);
            }
            Err(message) => {
                let key = record.text(&spec.natural_key).map(str::to_string);
                invalid.push(OutcomeRecord::failed(key, message).with_row(record.row));
            }
        }
    }

    TransformedBatch {
        batch: out,
        invalid,
        blank_rows,
    }
}

fn apply_transforms(
    record: &mut Record,
    spec: &RecordTypeSpec,
    columns: &[String],
) -> Result<(), String> {
    for (field, transform) in &spec.transforms {
        if !columns.contains(field) {
            continue;
        }
        let value = transform
            .apply(record.get(field), &*record)
            .map_err(|reason| format!("{INVALID_TRANSFORM}: field '{field}': {reason}"))?;
        record.set(field.clone(), value);
    }
    Ok(())
}
