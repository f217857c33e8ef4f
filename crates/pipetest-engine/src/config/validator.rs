//! Semantic validation for parsed runner configuration values.

use anyhow::{bail, Result};

use crate::config::types::PipetestConfig;

/// Validate a parsed runner configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the config.
pub fn validate_config(config: &PipetestConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported config version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.catalog.path.as_os_str().is_empty() {
        errors.push("catalog.path must not be empty".to_string());
    }

    if let Some(repo) = &config.repository {
        if repo.path.as_os_str().is_empty() {
            errors.push("repository.path must not be empty".to_string());
        }
    }

    if let Some(engine) = &config.engine {
        if engine.command.trim().is_empty() {
            errors.push("engine.command must not be empty".to_string());
        }
    }

    if let Some(field) = &config.runner.test_name_field {
        if field.trim().is_empty() {
            errors.push("runner.test_name_field must not be blank when set".to_string());
        }
    }

    if config.runner.parallelism == 0 {
        errors.push("runner.parallelism must be at least 1".to_string());
    }

    if config.runner.timeout_seconds == Some(0) {
        errors.push("runner.timeout_seconds must be > 0".to_string());
    }

    for name in config.variables.keys().chain(config.parameters.keys()) {
        if name.trim().is_empty() {
            errors.push("variable and parameter names must not be empty".to_string());
            break;
        }
    }

    if !errors.is_empty() {
        bail!(
            "Config validation failed:\n  - {}",
            errors.join("\n  - ")
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::parse_config_str;

    fn valid_yaml() -> &'static str {
        r#"
version: "1.0"
catalog:
  kind: directory
  path: catalog
engine:
  command: run-pipeline
"#
    }

    #[test]
    fn test_valid_config_passes() {
        let config = parse_config_str(valid_yaml()).unwrap();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_all_errors_reported_together() {
        let yaml = r#"
version: "2.0"
catalog:
  kind: directory
  path: catalog
engine:
  command: "  "
runner:
  parallelism: 0
  timeout_seconds: 0
"#;
        let config = parse_config_str(yaml).unwrap();
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("Unsupported config version '2.0'"));
        assert!(err.contains("engine.command"));
        assert!(err.contains("parallelism"));
        assert!(err.contains("timeout_seconds"));
    }

    #[test]
    fn test_blank_test_name_field_rejected() {
        let yaml = format!("{}runner:\n  test_name_field: \"\"\n", valid_yaml());
        let config = parse_config_str(&yaml).unwrap();
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("test_name_field"));
    }
}
