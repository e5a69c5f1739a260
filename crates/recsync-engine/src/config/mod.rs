//! Sync configuration: YAML types, parsing and semantic validation.

pub mod parser;
pub mod types;
pub mod validator;

pub use parser::{parse_config, parse_config_str};
pub use types::SyncConfig;
pub use validator::validate_config;
