use proptest::prelude::*;
use recsync_engine::classify::{classify, truncate_error, MAX_ERROR_CHARS};
use recsync_engine::transform::{transform_batch, FieldTransform};
use recsync_engine::RecordTypeSpec;
use recsync_types::job::Operation;
use recsync_types::record::{Record, RecordBatch, RecordType};

const CODES: &[&str] = &[
    "REQUIRED_FIELD_MISSING",
    "DUPLICATE_VALUE",
    "INVALID_CROSS_REFERENCE_KEY",
    "FIELD_CUSTOM_VALIDATION_EXCEPTION",
    "UNABLE_TO_LOCK_ROW",
    "ENTITY_IS_DELETED",
    "SOMETHING_NEW",
];

const OBJECTS: &[&str] = &["Product2", "PricebookEntry", "ProductCategoryProduct"];

proptest! {
    #[test]
    fn classification_is_deterministic(
        code in prop::sample::select(CODES),
        body in ".{0,120}",
        object in prop::sample::select(OBJECTS),
    ) {
        let raw = format!("{code}:{body}:--");
        let rt = RecordType::new(object);
        let first = classify(&raw, &rt);
        let second = classify(&raw, &rt);
        prop_assert_eq!(&first, &second);
        prop_assert!(!first.resolution.is_empty());
    }

    #[test]
    fn truncated_errors_fit_the_archive(raw in ".{0,1200}") {
        let truncated = truncate_error(&raw);
        prop_assert!(truncated.chars().count() <= MAX_ERROR_CHARS);
        prop_assert!(raw.starts_with(&truncated));
    }

    #[test]
    fn transform_accounts_for_every_row(
        rows in prop::collection::vec(
            (prop::option::of("[A-Za-z ]{0,12}"), prop::option::of("(-?[0-9]{1,4}|[a-z]{1,4}|nan|)")),
            0..40,
        )
    ) {
        let mut batch = RecordBatch::new(
            "Product2",
            "Name",
            vec!["Name*".to_string(), "Quantity".to_string()],
        );
        for (i, (name, quantity)) in rows.iter().enumerate() {
            let mut record = Record::new(i + 1);
            if let Some(name) = name {
                record = record.with("Name*", name.as_str());
            }
            if let Some(quantity) = quantity {
                record = record.with("Quantity", quantity.as_str());
            }
            batch.push(record);
        }
        let spec = RecordTypeSpec::new("Product2", Operation::Insert)
            .transform("Quantity", FieldTransform::Integer);

        let out = transform_batch(&batch, &spec, Operation::Insert);

        prop_assert_eq!(out.batch.len() + out.invalid.len() + out.blank_rows, rows.len());
        for record in &out.batch.records {
            prop_assert!(!record.is_blank());
            prop_assert!(!record.fields.contains_key("Name*"));
        }
    }
}
