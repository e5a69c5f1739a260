pub mod check;
pub mod mark_modified;
pub mod pull;
pub mod reset;
pub mod run;
pub mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use recsync_engine::config::{parse_config, validate_config, SyncConfig};
use recsync_engine::{EngineOptions, Registry, SfCliBulkApi, SyncEngine};
use recsync_state::SqliteStatusBackend;
use recsync_store::CsvDirectoryStore;
use recsync_types::record::RecordType;

/// A validated sync config with its relative paths resolved against the
/// directory the config file lives in.
pub struct Workspace {
    pub config: SyncConfig,
    pub registry: Arc<Registry>,
    pub store_path: PathBuf,
    pub state_path: PathBuf,
}

impl Workspace {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config = parse_config(config_path)
            .with_context(|| format!("Failed to parse sync config: {}", config_path.display()))?;
        validate_config(&config)?;
        let registry = Registry::from_config(&config).context("Invalid record type registry")?;

        let base = config_path.parent().unwrap_or_else(|| Path::new("."));
        Ok(Self {
            store_path: base.join(&config.store.path),
            state_path: base.join(&config.state.path),
            registry: Arc::new(registry),
            config,
        })
    }

    pub fn open_store(&self) -> Result<CsvDirectoryStore> {
        CsvDirectoryStore::open(&self.store_path).with_context(|| {
            format!("Failed to open source store: {}", self.store_path.display())
        })
    }

    pub fn open_status(&self) -> Result<SqliteStatusBackend> {
        SqliteStatusBackend::open(&self.state_path).with_context(|| {
            format!("Failed to open status database: {}", self.state_path.display())
        })
    }

    /// Bulk API for the configured org. Submission and result files go in a
    /// `work` directory next to the status database.
    pub fn bulk_api(&self) -> SfCliBulkApi {
        let work_dir = self
            .state_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("work");
        SfCliBulkApi::from_config(&self.config.connection).with_work_dir(work_dir)
    }

    pub fn engine(&self) -> Result<SyncEngine> {
        Ok(SyncEngine::new(
            Arc::new(self.bulk_api()),
            Arc::new(self.open_store()?),
            Arc::new(self.open_status()?),
            Arc::clone(&self.registry),
            EngineOptions::from_config(&self.config.dispatch),
        ))
    }

    /// Resolve a record type name given on the command line.
    pub fn record_type(&self, name: &str) -> Result<RecordType> {
        let record_type = RecordType::new(name);
        if self.registry.get(&record_type).is_none() {
            let known: Vec<&str> = self.registry.iter().map(|s| s.record_type.as_str()).collect();
            anyhow::bail!(
                "Unknown record type '{name}' (configured: {})",
                known.join(", ")
            );
        }
        Ok(record_type)
    }
}
