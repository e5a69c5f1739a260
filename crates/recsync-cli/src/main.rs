mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "recsync",
    version,
    about = "Identifier-aware bulk record sync"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync record types and write identifiers back to the source sheets
    Run {
        /// Path to sync config YAML file
        config: PathBuf,
        /// Only sync these record types (comma separated)
        #[arg(long, value_delimiter = ',')]
        types: Vec<String>,
        /// Override the operation for one run, as TYPE=insert|update|upsert
        #[arg(long = "operation", value_name = "TYPE=OP")]
        operations: Vec<String>,
        /// Mirror progress snapshots to this JSON file
        #[arg(long, env = "RECSYNC_PROGRESS_FILE")]
        progress_file: Option<PathBuf>,
        /// Write the final sync report as JSON
        #[arg(long)]
        report_out: Option<PathBuf>,
    },
    /// Refresh source sheets from the org, keeping their identifier columns
    Pull {
        /// Path to sync config YAML file
        config: PathBuf,
        /// Only pull these record types (comma separated)
        #[arg(long, value_delimiter = ',')]
        types: Vec<String>,
        /// Write the pull report as JSON
        #[arg(long)]
        report_out: Option<PathBuf>,
    },
    /// Validate config, source sheets, status database and org access
    Check {
        /// Path to sync config YAML file
        config: PathBuf,
    },
    /// Show per-record-type sync status
    Status {
        /// Path to sync config YAML file
        config: PathBuf,
        /// Also list the most recent archived failures per record type
        #[arg(long, default_value_t = 0)]
        failures: usize,
    },
    /// Flag a synced record type as modified so the next run resends it
    MarkModified {
        /// Path to sync config YAML file
        config: PathBuf,
        /// Record type name (e.g., "Product2")
        record_type: String,
    },
    /// Forget the sync status of a record type
    Reset {
        /// Path to sync config YAML file
        config: PathBuf,
        /// Record type name (e.g., "Product2")
        record_type: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run {
            config,
            types,
            operations,
            progress_file,
            report_out,
        } => {
            commands::run::execute(
                &config,
                &types,
                &operations,
                progress_file.as_deref(),
                report_out.as_deref(),
            )
            .await
        }
        Commands::Pull {
            config,
            types,
            report_out,
        } => commands::pull::execute(&config, &types, report_out.as_deref()).await,
        Commands::Check { config } => commands::check::execute(&config).await,
        Commands::Status { config, failures } => {
            commands::status::execute(&config, failures).await
        }
        Commands::MarkModified {
            config,
            record_type,
        } => commands::mark_modified::execute(&config, &record_type),
        Commands::Reset {
            config,
            record_type,
        } => commands::reset::execute(&config, &record_type),
    }
}
