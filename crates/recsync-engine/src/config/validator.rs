//! Semantic validation for parsed sync configuration values.

use std::collections::HashSet;

use anyhow::{bail, Result};
use recsync_types::job::Operation;

use crate::config::types::{RecordTypeConfig, SyncConfig, TransformConfig};

fn validate_record_type(
    rt: &RecordTypeConfig,
    known: &HashSet<&str>,
    errors: &mut Vec<String>,
) {
    let ctx = format!("record type '{}'", rt.name);

    if rt.natural_key.trim().is_empty() {
        errors.push(format!("{ctx}: natural_key must not be empty"));
    }
    if rt.identifier_column.trim().is_empty() {
        errors.push(format!("{ctx}: identifier_column must not be empty"));
    }
    if let Some(sheet) = &rt.sheet {
        if sheet.trim().is_empty() {
            errors.push(format!("{ctx}: sheet must not be empty when set"));
        }
    }
    if rt.operation != Operation::Upsert && rt.external_id.is_some() {
        errors.push(format!(
            "{ctx}: external_id is only used by upsert, but operation is '{}'",
            rt.operation
        ));
    }
    if rt.never_transmit.iter().any(|f| f == &rt.natural_key) {
        errors.push(format!(
            "{ctx}: natural_key '{}' cannot be never_transmit",
            rt.natural_key
        ));
    }

    for (field, transform) in &rt.transforms {
        if rt.never_transmit.contains(field) {
            errors.push(format!(
                "{ctx}: transform on '{field}' is pointless, the field is never_transmit"
            ));
        }
        match transform {
            TransformConfig::Constant { value } if value.trim().is_empty() => {
                errors.push(format!("{ctx}: constant transform on '{field}' has no value"));
            }
            TransformConfig::ProductCode(code) | TransformConfig::Sku(code) => {
                if code.source.trim().is_empty() {
                    errors.push(format!("{ctx}: code transform on '{field}' has no source"));
                }
                if code.prefix.trim().is_empty() {
                    errors.push(format!("{ctx}: code transform on '{field}' has no prefix"));
                }
            }
            _ => {}
        }
    }

    for dep in &rt.depends_on {
        if dep == &rt.name {
            errors.push(format!("{ctx}: depends on itself"));
        } else if !known.contains(dep.as_str()) {
            errors.push(format!("{ctx}: depends on unknown record type '{dep}'"));
        }
    }
}

/// Validate a parsed sync configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the config.
pub fn validate_config(config: &SyncConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported config version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.connection.target_org.trim().is_empty() {
        errors.push("connection.target_org must not be empty".to_string());
    }
    if config.connection.cli_command.trim().is_empty() {
        errors.push("connection.cli_command must not be empty".to_string());
    }
    if config.connection.command_timeout_secs == 0 {
        errors.push("connection.command_timeout_secs must be > 0".to_string());
    }

    if config.dispatch.poll_interval_secs == 0 {
        errors.push("dispatch.poll_interval_secs must be > 0".to_string());
    }
    if config.dispatch.timeout_secs == 0 {
        errors.push("dispatch.timeout_secs must be > 0".to_string());
    } else if config.dispatch.timeout_secs < config.dispatch.poll_interval_secs {
        errors.push(format!(
            "dispatch.timeout_secs ({}) is shorter than poll_interval_secs ({})",
            config.dispatch.timeout_secs, config.dispatch.poll_interval_secs
        ));
    }

    if config.record_types.is_empty() {
        errors.push("At least one record type must be configured".to_string());
    }

    let mut seen = HashSet::new();
    for (i, rt) in config.record_types.iter().enumerate() {
        if rt.name.trim().is_empty() {
            errors.push(format!("record_types[{i}] has an empty name"));
        } else if !seen.insert(rt.name.as_str()) {
            errors.push(format!("Duplicate record type '{}'", rt.name));
        }
    }

    for rt in &config.record_types {
        validate_record_type(rt, &seen, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Sync config validation failed:\n  - {}", errors.join("\n  - "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::parse_config_str;

    fn base_yaml() -> String {
        r#"
version: "1.0"
connection:
  target_org: dev
record_types:
  - name: ProductCategory
  - name: Product2
    operation: upsert
    external_id: ProductCode
    depends_on: [ProductCategory]
"#
        .to_string()
    }

    #[test]
    fn test_valid_config_passes() {
        let config = parse_config_str(&base_yaml()).unwrap();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_wrong_version() {
        let yaml = base_yaml().replace("\"1.0\"", "\"2.0\"");
        let config = parse_config_str(&yaml).unwrap();
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("Unsupported config version '2.0'"));
    }

    #[test]
    fn test_all_errors_reported_together() {
        let yaml = r#"
version: "1.0"
connection:
  target_org: ""
  command_timeout_secs: 0
dispatch:
  poll_interval_secs: 10
  timeout_secs: 5
record_types:
  - name: Product2
    natural_key: Name
    never_transmit: [Name]
    depends_on: [Product2, Ghost]
  - name: Product2
"#;
        let config = parse_config_str(yaml).unwrap();
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("target_org must not be empty"), "got: {err}");
        assert!(err.contains("command_timeout_secs must be > 0"), "got: {err}");
        assert!(err.contains("shorter than poll_interval_secs"), "got: {err}");
        assert!(err.contains("Duplicate record type 'Product2'"), "got: {err}");
        assert!(err.contains("cannot be never_transmit"), "got: {err}");
        assert!(err.contains("depends on itself"), "got: {err}");
        assert!(err.contains("unknown record type 'Ghost'"), "got: {err}");
    }

    #[test]
    fn test_external_id_requires_upsert() {
        let yaml = r#"
version: "1.0"
connection:
  target_org: dev
record_types:
  - name: Pricebook2
    operation: insert
    external_id: Name
"#;
        let config = parse_config_str(yaml).unwrap();
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("only used by upsert"));
    }

    #[test]
    fn test_transform_checks() {
        let yaml = r#"
version: "1.0"
connection:
  target_org: dev
record_types:
  - name: Product2
    never_transmit: [Type]
    transforms:
      Type: { kind: integer }
      Family: { kind: constant, value: " " }
      ProductCode: { kind: product_code, prefix: "" }
"#;
        let config = parse_config_str(yaml).unwrap();
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("transform on 'Type' is pointless"), "got: {err}");
        assert!(err.contains("constant transform on 'Family'"), "got: {err}");
        assert!(err.contains("has no prefix"), "got: {err}");
    }

    #[test]
    fn test_no_record_types() {
        let yaml = "version: \"1.0\"\nconnection:\n  target_org: dev\nrecord_types: []\n";
        let config = parse_config_str(yaml).unwrap();
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("At least one record type"));
    }
}
