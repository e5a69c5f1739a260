use std::collections::BTreeMap;

use recsync_types::job::Operation;
use serde::{Deserialize, Serialize};

/// Top-level sync configuration, as read from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub version: String,
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    pub record_types: Vec<RecordTypeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Org alias or username passed as `--target-org`.
    pub target_org: String,
    #[serde(default = "default_cli_command")]
    pub cli_command: String,
    /// Upper bound for any single CLI invocation.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_cli_command() -> String {
    "sf".to_string()
}
fn default_command_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one `<sheet>.csv` per record type.
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "data".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_state_path")]
    pub path: String,
}

fn default_state_path() -> String {
    ".recsync/state.db".to_string()
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Bound on waiting for a job to reach a terminal status.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    5
}
fn default_timeout_secs() -> u64 {
    600
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// One record type: where it lives, how it is keyed, how it is sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordTypeConfig {
    pub name: String,
    /// Sheet name; defaults to the record type name.
    #[serde(default)]
    pub sheet: Option<String>,
    #[serde(default = "default_natural_key")]
    pub natural_key: String,
    #[serde(default = "default_identifier_column")]
    pub identifier_column: String,
    #[serde(default = "default_operation")]
    pub operation: Operation,
    /// External-id field for upserts; defaults to `Id`.
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub never_transmit: Vec<String>,
    #[serde(default)]
    pub transforms: BTreeMap<String, TransformConfig>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

fn default_natural_key() -> String {
    "Name".to_string()
}
fn default_identifier_column() -> String {
    "Id".to_string()
}
fn default_operation() -> Operation {
    Operation::Insert
}

/// Built-in per-field value transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformConfig {
    StatusLabel {
        #[serde(default = "default_active_label")]
        active: String,
        #[serde(default = "default_inactive_label")]
        inactive: String,
    },
    ProductCode(CodeConfig),
    Sku(CodeConfig),
    Integer,
    Constant {
        value: String,
    },
}

fn default_active_label() -> String {
    "Active".to_string()
}
fn default_inactive_label() -> String {
    "Inactive".to_string()
}

/// Settings for generated product codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeConfig {
    /// Field the code is derived from.
    #[serde(default = "default_code_source")]
    pub source: String,
    #[serde(default = "default_code_prefix")]
    pub prefix: String,
    /// Product line used when the name mentions no known line.
    #[serde(default = "default_code_prefix")]
    pub default_line: String,
}

fn default_code_source() -> String {
    "Name".to_string()
}
fn default_code_prefix() -> String {
    "CYB".to_string()
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            source: default_code_source(),
            prefix: default_code_prefix(),
            default_line: default_code_prefix(),
        }
    }
}
