use std::path::Path;

use anyhow::Result;
use recsync_state::StatusBackend;

use super::Workspace;

/// Execute the `mark-modified` command.
pub fn execute(config_path: &Path, record_type: &str) -> Result<()> {
    let workspace = Workspace::load(config_path)?;
    let record_type = workspace.record_type(record_type)?;
    let backend = workspace.open_status()?;

    if backend.mark_modified(&record_type)? {
        println!("{record_type} marked modified; the next run will resend it.");
        Ok(())
    } else {
        let current = backend.get_status(&record_type)?;
        anyhow::bail!(
            "{record_type} is {}; only synced or partially synced record types can be marked modified",
            current.state
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::write_config;
    use recsync_types::status::{SyncState, SyncStatus};

    #[test]
    fn only_synced_types_can_be_marked() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path());

        let err = execute(&config, "Product2").unwrap_err().to_string();
        assert!(err.contains("not_synced"), "got: {err}");

        let workspace = Workspace::load(&config).unwrap();
        let backend = workspace.open_status().unwrap();
        backend
            .put_status(&SyncStatus {
                state: SyncState::Synced,
                ..SyncStatus::not_synced("Product2")
            })
            .unwrap();
        drop(backend);

        execute(&config, "Product2").unwrap();
        let backend = workspace.open_status().unwrap();
        assert_eq!(
            backend.get_status(&"Product2".into()).unwrap().state,
            SyncState::Modified
        );
    }
}
