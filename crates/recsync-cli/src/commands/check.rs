use std::path::Path;

use anyhow::Result;
use recsync_state::StatusBackend;
use recsync_store::SourceStore;
use recsync_types::record::clean_field_name;

use super::Workspace;

/// Execute the `check` command: validate config, source sheets, the status
/// database and org connectivity.
pub async fn execute(config_path: &Path) -> Result<()> {
    // 1. Parse and validate config, build the registry
    let workspace = Workspace::load(config_path)?;
    println!("Sync config:        OK");
    let order: Vec<&str> = workspace
        .registry
        .iter()
        .map(|s| s.record_type.as_str())
        .collect();
    println!("Sync order:         {}", order.join(" -> "));

    let mut ok = true;

    // 2. Source sheets
    match workspace.open_store() {
        Ok(store) => {
            for spec in workspace.registry.iter() {
                let label = format!("Sheet '{}':", spec.sheet);
                match store.read(&spec.binding()) {
                    Ok(batch) => {
                        let has_key = batch
                            .columns
                            .iter()
                            .any(|c| clean_field_name(c) == spec.natural_key);
                        if has_key {
                            println!("{label:20}OK ({} rows)", batch.len());
                        } else {
                            ok = false;
                            println!("{label:20}FAILED");
                            println!("  missing natural key column '{}'", spec.natural_key);
                        }
                    }
                    Err(e) => {
                        ok = false;
                        println!("{label:20}FAILED");
                        println!("  {e}");
                    }
                }
            }
        }
        Err(e) => {
            ok = false;
            println!("Source store:       FAILED");
            println!("  {e:#}");
        }
    }

    // 3. Status database
    match workspace
        .open_status()
        .and_then(|s| s.list_statuses().map_err(Into::into))
    {
        Ok(statuses) => println!("Status database:    OK ({} tracked)", statuses.len()),
        Err(e) => {
            ok = false;
            println!("Status database:    FAILED");
            println!("  {e:#}");
        }
    }

    // 4. Org access through the bulk tool
    match workspace.bulk_api().check_org().await {
        Ok(username) => println!("Target org:         OK ({username})"),
        Err(e) => {
            ok = false;
            println!("Target org:         FAILED");
            println!("  {e}");
        }
    }

    if ok {
        println!("\nAll checks passed.");
        Ok(())
    } else {
        anyhow::bail!("One or more checks failed")
    }
}
