use std::path::Path;

use anyhow::Result;
use recsync_engine::PullReport;

use super::run::write_json;
use super::Workspace;

/// Execute the `pull` command: refresh source sheets from the org.
pub async fn execute(config_path: &Path, types: &[String], report_out: Option<&Path>) -> Result<()> {
    let workspace = Workspace::load(config_path)?;
    let types: Vec<String> = types.iter().map(|t| t.trim().to_string()).collect();

    tracing::info!(
        target_org = workspace.config.connection.target_org.as_str(),
        "Pulling record types"
    );
    let report = workspace.engine()?.pull(&types).await?;

    print_report(&report);
    if let Some(path) = report_out {
        write_json(path, &report).await?;
        println!("\nReport written to {}", path.display());
    }

    if report.is_clean() {
        Ok(())
    } else {
        anyhow::bail!("{} record type(s) could not be pulled", report.failed())
    }
}

fn print_report(report: &PullReport) {
    println!("Pull completed: {}", report.summary_line());
    for outcome in &report.outcomes {
        match &outcome.error {
            None => println!("  {:<24} {} records", outcome.record_type, outcome.records),
            Some(error) => println!("  {:<24} FAILED: {error}", outcome.record_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::write_config;

    #[tokio::test]
    async fn unknown_type_fails_before_contacting_the_org() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path());
        let err = execute(&config, &["Account".to_string()], None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Account"), "got: {err}");
    }
}
