use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use recsync_engine::{RunRequest, SyncReport, TypeOutcome};
use recsync_types::job::Operation;
use serde::Serialize;

use super::Workspace;

/// Execute the `run` command: parse, validate, and sync record types.
pub async fn execute(
    config_path: &Path,
    types: &[String],
    operations: &[String],
    progress_file: Option<&Path>,
    report_out: Option<&Path>,
) -> Result<()> {
    let workspace = Workspace::load(config_path)?;

    let mut request = RunRequest::all();
    for name in types {
        request = request.with_type(name.trim());
    }
    for raw in operations {
        let (record_type, operation) = parse_operation_override(raw)?;
        request = request.with_operation(record_type, operation);
    }

    tracing::info!(
        target_org = workspace.config.connection.target_org.as_str(),
        record_types = workspace.registry.len(),
        "Sync config validated"
    );

    let engine = Arc::new(workspace.engine()?);

    let modified = engine.detect_changes().await?;
    if !modified.is_empty() {
        tracing::info!(count = modified.len(), "Source changes detected since last sync");
    }

    let mut handle = Arc::clone(&engine).spawn(request);
    if let Some(path) = progress_file {
        let snapshot = handle.progress.borrow().clone();
        write_json(path, &snapshot).await?;
    }
    while handle.progress.changed().await.is_ok() {
        let snapshot = handle.progress.borrow_and_update().clone();
        tracing::debug!(
            completed = snapshot.completed,
            total = snapshot.total,
            "{}",
            snapshot.message
        );
        if let Some(path) = progress_file {
            write_json(path, &snapshot).await?;
        }
    }

    let report = handle.join.await.context("Sync task panicked")??;

    print_report(&report);
    if let Some(path) = report_out {
        write_json(path, &report).await?;
        println!("\nReport written to {}", path.display());
    }

    if report.is_clean() {
        Ok(())
    } else {
        anyhow::bail!(
            "{} record type(s) failed or timed out",
            report.totals.failed + report.totals.timed_out
        )
    }
}

/// Parse `TYPE=OP` into a record type name and operation.
fn parse_operation_override(raw: &str) -> Result<(String, Operation)> {
    let (record_type, operation) = raw
        .split_once('=')
        .with_context(|| format!("Invalid operation override '{raw}', expected TYPE=OP"))?;
    let record_type = record_type.trim();
    if record_type.is_empty() {
        anyhow::bail!("Invalid operation override '{raw}': missing record type");
    }
    let operation = match operation.trim().to_ascii_lowercase().as_str() {
        "insert" => Operation::Insert,
        "update" => Operation::Update,
        "upsert" => Operation::Upsert,
        other => anyhow::bail!(
            "Invalid operation '{other}' for {record_type}, expected insert, update or upsert"
        ),
    };
    Ok((record_type.to_string(), operation))
}

pub(crate) async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn print_report(report: &SyncReport) {
    println!("Sync completed: {}", report.summary_line());
    println!("  Started:         {}", report.started_at);
    println!("  Finished:        {}", report.finished_at);
    println!("  Records read:    {}", report.totals.records_read);
    println!("  Processed:       {}", report.totals.records_processed);
    println!("  Succeeded:       {}", report.totals.records_succeeded);
    println!("  Failed:          {}", report.totals.records_failed);
    println!("  Identifiers:     {}", report.totals.identifiers_reconciled);

    for outcome in &report.outcomes {
        print_outcome(outcome);
    }
}

fn print_outcome(outcome: &TypeOutcome) {
    println!();
    println!(
        "{} ({}): {}",
        outcome.record_type, outcome.operation, outcome.status
    );
    if let Some(message) = &outcome.message {
        println!("  {message}");
    }
    if let Some(job_id) = &outcome.job_id {
        println!("  Job:             {job_id}");
    }
    if outcome.processed > 0 || outcome.invalid > 0 {
        println!(
            "  Processed {} / succeeded {} / failed {} (duplicates {}, rejected before send {})",
            outcome.processed,
            outcome.succeeded,
            outcome.failed,
            outcome.duplicates,
            outcome.invalid
        );
        println!(
            "  Identifiers written: {}{}",
            outcome.identifiers_reconciled,
            if outcome.unmatched > 0 {
                format!(" ({} unmatched)", outcome.unmatched)
            } else {
                String::new()
            }
        );
    }
    if outcome.blank_rows > 0 {
        println!("  Blank rows skipped: {}", outcome.blank_rows);
    }

    for group in &outcome.failure_groups {
        println!("  [{}] {} record(s)", group.category, group.count);
        if !group.fields.is_empty() {
            println!("    Fields: {}", group.fields.join(", "));
        }
        for resolution in &group.resolutions {
            println!("    - {resolution}");
        }
    }
    for rec in &outcome.recommendations {
        println!("  {:?} priority: {}", rec.priority, rec.action);
        for (i, step) in rec.steps.iter().enumerate() {
            println!("    {}. {step}", i + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_overrides_parse() {
        assert_eq!(
            parse_operation_override("Product2=upsert").unwrap(),
            ("Product2".to_string(), Operation::Upsert)
        );
        assert_eq!(
            parse_operation_override(" PricebookEntry = INSERT ").unwrap(),
            ("PricebookEntry".to_string(), Operation::Insert)
        );
        assert!(parse_operation_override("Product2").is_err());
        assert!(parse_operation_override("=upsert").is_err());
        assert!(parse_operation_override("Product2=delete").is_err());
    }

    #[tokio::test]
    async fn json_files_are_written_pretty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let snapshot = recsync_types::progress::ProgressSnapshot::initializing(3);

        write_json(&path, &snapshot).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["status"], "initializing");
        assert_eq!(value["total"], 3);
        assert!(text.contains('\n'));
    }
}
