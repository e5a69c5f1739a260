use std::path::Path;

use anyhow::Result;
use recsync_state::{SqliteStatusBackend, StatusBackend};
use recsync_types::status::SyncStatus;

use super::Workspace;

/// Execute the `status` command: detect source changes, then print the
/// status of every configured record type.
pub async fn execute(config_path: &Path, failures: usize) -> Result<()> {
    let workspace = Workspace::load(config_path)?;

    let modified = workspace.engine()?.detect_changes().await?;
    for record_type in &modified {
        tracing::info!(record_type = record_type.as_str(), "Marked modified");
    }

    let backend = workspace.open_status()?;
    print_statuses(&workspace, &backend, failures)
}

fn print_statuses(
    workspace: &Workspace,
    backend: &SqliteStatusBackend,
    failures: usize,
) -> Result<()> {
    println!(
        "{:24} {:18} {:22} {:>9} {:>7}",
        "RECORD TYPE", "STATE", "LAST SYNC", "PROCESSED", "FAILED"
    );
    for spec in workspace.registry.iter() {
        let status = backend.get_status(&spec.record_type)?;
        println!("{}", status_line(&status));
        if let Some(message) = &status.message {
            println!("  {message}");
        }

        if failures > 0 {
            for failure in backend.recent_failures(&spec.record_type, failures)? {
                let key = failure.natural_key.as_deref().unwrap_or("<no key>");
                let row = failure
                    .row
                    .map(|r| format!(" (row {r})"))
                    .unwrap_or_default();
                println!("  ! [{}] {key}{row}: {}", failure.category, failure.resolution);
            }
        }
    }

    let summary = backend.summary()?;
    println!(
        "\n{} tracked: {} synced, {} partially synced, {} modified, {} failed, {} not synced",
        summary.total,
        summary.synced,
        summary.partially_synced,
        summary.modified,
        summary.failed,
        summary.not_synced
    );
    Ok(())
}

fn status_line(status: &SyncStatus) -> String {
    format!(
        "{:24} {:18} {:22} {:>9} {:>7}",
        status.record_type,
        status.state.as_str(),
        status.last_sync.as_deref().unwrap_or("never"),
        status.records_processed,
        status.records_failed
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use recsync_types::status::SyncState;

    #[test]
    fn never_synced_line() {
        let line = status_line(&SyncStatus::not_synced("Product2"));
        assert!(line.starts_with("Product2"));
        assert!(line.contains("not_synced"));
        assert!(line.contains("never"));
    }

    #[test]
    fn synced_line_shows_counts() {
        let status = SyncStatus {
            state: SyncState::PartiallySynced,
            last_sync: Some("2026-01-01T00:00:00Z".into()),
            records_processed: 10,
            records_failed: 3,
            ..SyncStatus::not_synced("Product2")
        };
        let line = status_line(&status);
        assert!(line.contains("partially_synced"));
        assert!(line.contains("2026-01-01T00:00:00Z"));
        assert!(line.trim_end().ends_with('3'));
    }
}
