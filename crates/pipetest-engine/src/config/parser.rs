//! Runner YAML parsing with environment variable substitution.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::types::PipetestConfig;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error naming every referenced environment variable that is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let mut missing = Vec::new();

    for cap in ENV_VAR_RE.captures_iter(input) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(val) => {
                result = result.replace(&cap[0], &val);
            }
            Err(_) => {
                if !missing.iter().any(|m| m == var_name) {
                    missing.push(var_name.to_string());
                }
            }
        }
    }

    if !missing.is_empty() {
        anyhow::bail!("Missing environment variable(s): {}", missing.join(", "));
    }

    Ok(result)
}

/// Parse a runner config YAML string (after env var substitution).
///
/// # Errors
///
/// Returns an error if env var substitution fails or the YAML is invalid.
pub fn parse_config_str(yaml_str: &str) -> Result<PipetestConfig> {
    let substituted = substitute_env_vars(yaml_str)?;
    let config: PipetestConfig =
        serde_yaml::from_str(&substituted).context("Failed to parse pipetest config YAML")?;
    Ok(config)
}

/// Parse a runner config file. Relative paths inside it are resolved
/// against the file's directory.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the YAML is invalid.
pub fn parse_config(path: &Path) -> Result<PipetestConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut config = parse_config_str(&content)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    config.resolve_paths(dir);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::CatalogKind;
    use pipetest_types::TestCategory;

    const MINIMAL: &str = r#"
version: "1.0"
catalog:
  kind: directory
  path: catalog
"#;

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("PT_TEST_CATALOG", "/srv/catalog");
        let result = substitute_env_vars("path: ${PT_TEST_CATALOG}").unwrap();
        assert_eq!(result, "path: /srv/catalog");
        std::env::remove_var("PT_TEST_CATALOG");
    }

    #[test]
    fn test_multiple_missing_env_vars_all_reported() {
        let err = substitute_env_vars("${PT_MISSING_X} and ${PT_MISSING_Y} and ${PT_MISSING_X}")
            .unwrap_err()
            .to_string();
        assert!(err.contains("PT_MISSING_X"));
        assert!(err.contains("PT_MISSING_Y"));
        assert_eq!(err.matches("PT_MISSING_X").count(), 1);
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = parse_config_str(MINIMAL).unwrap();
        assert_eq!(config.catalog.kind, CatalogKind::Directory);
        assert!(config.engine.is_none());
        assert!(config.repository.is_none());
        assert_eq!(config.runner.parallelism, 1);
        assert_eq!(config.runner.log_level, "info");
        assert!(config.runner.category.is_none());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
version: "1.0"
catalog:
  kind: sqlite
  path: /var/lib/pipetest/catalog.db
repository:
  path: repo
engine:
  command: run-pipeline
  args: ["--quiet"]
data_sets:
  base_dir: data
runner:
  test_name_field: test_name
  category: development
  base_path: /pipelines
  timeout_seconds: 30
  parallelism: 4
variables:
  REGION: eu
parameters:
  LIMIT: "10"
"#;
        let config = parse_config_str(yaml).unwrap();
        assert_eq!(config.catalog.kind, CatalogKind::Sqlite);
        assert_eq!(config.engine.as_ref().unwrap().args, vec!["--quiet"]);
        assert_eq!(config.runner.category, Some(TestCategory::Development));
        assert_eq!(config.runner.timeout_seconds, Some(30));
        assert_eq!(config.variables["REGION"], "eu");
        assert_eq!(config.parameters["LIMIT"], "10");
    }

    #[test]
    fn test_relative_paths_follow_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipetest.yaml");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = parse_config(&path).unwrap();
        assert_eq!(config.catalog.path, dir.path().join("catalog"));
        assert_eq!(config.data_sets.base_dir.as_deref(), Some(dir.path()));
    }

    #[test]
    fn test_parse_config_file_not_found() {
        let err = parse_config(Path::new("/nonexistent/pipetest.yaml"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("Failed to read config file"));
    }
}
