use std::path::Path;

use anyhow::Result;
use recsync_state::StatusBackend;

use super::Workspace;

/// Execute the `reset` command. Identifiers already written to the source
/// sheets are left alone.
pub fn execute(config_path: &Path, record_type: &str) -> Result<()> {
    let workspace = Workspace::load(config_path)?;
    let record_type = workspace.record_type(record_type)?;
    let backend = workspace.open_status()?;

    let previous = backend.get_status(&record_type)?;
    backend.reset_status(&record_type)?;
    tracing::info!(
        record_type = record_type.as_str(),
        previous = previous.state.as_str(),
        "Sync status reset"
    );
    println!("{record_type} reset (was {}).", previous.state);
    Ok(())
}
