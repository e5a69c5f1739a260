//! Integration tests for config parsing, validation and a full run over a
//! CSV directory store built from the same config.

mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use common::{test_options, FakeBulkApi};
use recsync_engine::config::{parse_config, validate_config};
use recsync_engine::{EngineOptions, Registry, RunRequest, SyncEngine, TypeStatus};
use recsync_state::SqliteStatusBackend;
use recsync_store::{CsvDirectoryStore, Sheet};
use recsync_types::job::Operation;
use recsync_types::progress::ProgressSnapshot;
use recsync_types::record::RecordType;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn load_catalog() -> recsync_engine::config::SyncConfig {
    std::env::set_var("RECSYNC_FIXTURE_ORG", "fixture-sandbox");
    let config = parse_config(&fixture("catalog.yaml")).expect("Failed to parse fixture config");
    validate_config(&config).expect("Validation should pass");
    config
}

#[test]
fn test_parse_and_validate_fixture_catalog() {
    let config = load_catalog();

    assert_eq!(config.connection.target_org, "fixture-sandbox");
    assert_eq!(config.connection.cli_command, "sf");
    assert_eq!(config.connection.command_timeout_secs, 60);
    assert_eq!(config.record_types.len(), 3);
    assert_eq!(config.record_types[0].operation, Operation::Upsert);
    assert_eq!(config.record_types[1].sheet.as_deref(), Some("Products"));

    let options = EngineOptions::from_config(&config.dispatch);
    assert_eq!(options.poll_interval, Duration::from_secs(2));
    assert_eq!(options.timeout, Duration::from_secs(300));
}

#[test]
fn test_registry_orders_fixture_by_dependency() {
    let registry = Registry::from_config(&load_catalog()).unwrap();
    let order: Vec<&str> = registry.iter().map(|s| s.record_type.as_str()).collect();
    assert_eq!(order, vec!["Product2", "Pricebook2", "PricebookEntry"]);

    let products = registry.get(&RecordType::new("Product2")).unwrap();
    assert!(products.never_transmit.contains("Type"));
    assert_eq!(products.transforms.len(), 4);
}

#[test]
fn test_invalid_fixture_reports_every_problem() {
    let config = parse_config(&fixture("invalid_catalog.yaml")).unwrap();
    let err = validate_config(&config).unwrap_err().to_string();

    assert!(err.contains("Unsupported config version '2.0'"), "got: {err}");
    assert!(err.contains("target_org must not be empty"), "got: {err}");
    assert!(err.contains("shorter than poll_interval_secs"), "got: {err}");
    assert!(err.contains("Duplicate record type 'Product2'"), "got: {err}");
    assert!(err.contains("external_id is only used by upsert"), "got: {err}");
    assert!(err.contains("depends on itself"), "got: {err}");
}

#[test]
fn test_missing_env_var_is_named() {
    std::env::remove_var("RECSYNC_FIXTURE_UNSET_ORG");
    let yaml = r#"
version: "1.0"
connection:
  target_org: ${RECSYNC_FIXTURE_UNSET_ORG}
record_types:
  - name: Product2
"#;
    let err = recsync_engine::config::parse_config_str(yaml).unwrap_err();
    assert!(err.to_string().contains("RECSYNC_FIXTURE_UNSET_ORG"));
}

#[tokio::test]
async fn test_full_run_over_csv_directory() {
    let config = load_catalog();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CsvDirectoryStore::open(dir.path()).unwrap());

    store
        .save_sheet(
            "Products",
            &Sheet::new(
                ["Name*", "IsActive", "Type", "ProductCode", "Quantity"]
                    .map(String::from)
                    .to_vec(),
            )
            .with_row(["Cyber Edge Firewall", "TRUE", "Base", "", "3"])
            .with_row(["", "", "", "", ""])
            .with_row(["Cyber Edge Support", "FALSE", "Service", "CUSTOM-1", "1.0"]),
        )
        .unwrap();
    store
        .save_sheet(
            "Price Books",
            &Sheet::new(vec!["Name".into(), "Currency".into()]).with_row(["Standard", ""]),
        )
        .unwrap();
    store
        .save_sheet(
            "Price Book Entries",
            &Sheet::new(vec!["Name".into(), "UnitPrice".into()])
                .with_row(["Cyber Edge Firewall Standard", "100"]),
        )
        .unwrap();

    let api = Arc::new(FakeBulkApi::new());
    let status = Arc::new(SqliteStatusBackend::open(&dir.path().join("state.db")).unwrap());
    let engine = SyncEngine::new(
        api.clone(),
        store.clone(),
        status,
        Arc::new(Registry::from_config(&config).unwrap()),
        test_options(),
    );

    let (tx, _rx) = tokio::sync::watch::channel(ProgressSnapshot::initializing(0));
    let report = engine.run(&RunRequest::all(), &tx).await.unwrap();

    let order: Vec<&str> = report.outcomes.iter().map(|o| o.record_type.as_str()).collect();
    assert_eq!(order, vec!["Product2", "Pricebook2", "PricebookEntry"]);
    assert!(report.outcomes.iter().all(|o| o.status == TypeStatus::Synced));

    let products = report.outcome("Product2").unwrap();
    assert_eq!(products.records_read, 3);
    assert_eq!(products.blank_rows, 1);
    assert_eq!(products.identifiers_reconciled, 2);

    let submissions = api.submissions();
    let sent = &submissions[0];
    assert_eq!(sent.record_type, "Product2");
    let first = &sent.records[0];
    assert!(first.fields.get("Type").is_none());
    assert_eq!(first.text("IsActive"), Some("Active"));
    assert!(first.text("ProductCode").unwrap().starts_with("CYB-"));
    assert_eq!(sent.records[1].text("ProductCode"), Some("CUSTOM-1"));
    assert_eq!(sent.records[1].text("Quantity"), Some("1"));

    let pricebooks = &submissions[1];
    assert_eq!(pricebooks.records[0].text("Currency"), Some("USD"));

    let entries = &submissions[2];
    assert_eq!(entries.operation, Operation::Upsert);
    assert_eq!(entries.external_id.as_deref(), Some("Id"));

    let on_disk = store.load_sheet("Products").unwrap();
    assert_eq!(on_disk.header.last().map(String::as_str), Some("Id"));
    assert_eq!(on_disk.rows.len(), 3);
    assert!(on_disk.rows[0].last().is_some_and(|id| !id.is_empty()));
    assert!(!on_disk.rows[1].iter().any(|cell| !cell.is_empty()));
}
