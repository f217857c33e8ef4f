//! Pipeline definitions and the repository they can be loaded from.
//!
//! The engine treats a pipeline as an opaque graph of named steps: it only
//! needs step names (to validate bindings) and the definition itself (to
//! hand to the pipeline engine).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::vars::Variables;

/// One node of a pipeline graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Step settings, opaque to the test engine.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub config: serde_json::Value,
}

/// Directed edge between two steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    pub from: String,
    pub to: String,
}

/// A loaded pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    /// Repository object id, when the pipeline lives in a repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub hops: Vec<Hop>,
    /// Declared parameters with their default values.
    #[serde(default)]
    pub parameters: Variables,
    /// Declared variables with their default values.
    #[serde(default)]
    pub variables: Variables,
}

impl PipelineDefinition {
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.name == name)
    }

    #[must_use]
    pub fn has_step(&self, name: &str) -> bool {
        self.step(name).is_some()
    }

    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.name.as_str())
    }
}

/// Parse a pipeline definition from YAML (JSON is accepted too).
///
/// # Errors
///
/// Returns an error if the document is invalid or declares no steps.
pub fn parse_pipeline_str(raw: &str) -> Result<PipelineDefinition> {
    let definition: PipelineDefinition =
        serde_yaml::from_str(raw).context("Failed to parse pipeline definition")?;
    if definition.steps.is_empty() {
        anyhow::bail!("Pipeline '{}' declares no steps", definition.name);
    }
    Ok(definition)
}

/// Read and parse a pipeline file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn parse_pipeline_file(path: &Path) -> Result<PipelineDefinition> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;
    parse_pipeline_str(&raw).with_context(|| format!("Invalid pipeline file: {}", path.display()))
}

/// A directory located inside a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDirectory {
    /// Normalized repository path, always starting with `/`.
    pub path: String,
}

/// Repository of stored pipelines.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn PipelineRepository>`.
pub trait PipelineRepository: Send + Sync {
    /// Human-readable repository name, used in logs.
    fn name(&self) -> &str;

    /// Load the latest revision of the pipeline with object id `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if no pipeline has that id or it cannot be read.
    fn load_by_id(&self, id: &str) -> Result<PipelineDefinition>;

    /// Locate a directory by repository path; `Ok(None)` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be queried.
    fn find_directory(&self, path: &str) -> Result<Option<RepositoryDirectory>>;

    /// Load the pipeline called `name` from `directory`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline does not exist or cannot be read.
    fn load_by_name(&self, directory: &RepositoryDirectory, name: &str)
        -> Result<PipelineDefinition>;
}

/// Repository backed by a directory tree of pipeline YAML files.
///
/// Repository path `/dir/sub/name` maps to `<root>/dir/sub/name.yaml`;
/// object ids are the `id` declared inside each file.
#[derive(Debug, Clone)]
pub struct DirectoryRepository {
    root: PathBuf,
    name: String,
}

impl DirectoryRepository {
    /// Open a repository rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not a directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            anyhow::bail!("Repository root {} is not a directory", root.display());
        }
        let name = root.display().to_string();
        Ok(Self { root, name })
    }

    fn dir_path(&self, repo_path: &str) -> PathBuf {
        repo_path
            .split('/')
            .filter(|part| !part.is_empty() && *part != ".")
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }

    fn pipeline_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to list {}", dir.display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        entries.sort();
        for path in entries {
            if path.is_dir() {
                Self::pipeline_files(&path, out)?;
            } else if is_yaml(&path) {
                out.push(path);
            }
        }
        Ok(())
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == "yaml" || e == "yml")
}

fn normalize_repo_path(path: &str) -> String {
    let parts: Vec<&str> = path
        .split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();
    format!("/{}", parts.join("/"))
}

impl PipelineRepository for DirectoryRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn load_by_id(&self, id: &str) -> Result<PipelineDefinition> {
        let mut files = Vec::new();
        Self::pipeline_files(&self.root, &mut files)?;
        for path in files {
            match parse_pipeline_file(&path) {
                Ok(def) if def.id.as_deref() == Some(id) => return Ok(def),
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "Skipping unreadable pipeline file");
                }
            }
        }
        anyhow::bail!("No pipeline with object id '{id}' in repository {}", self.name)
    }

    fn find_directory(&self, path: &str) -> Result<Option<RepositoryDirectory>> {
        let dir = self.dir_path(path);
        Ok(dir.is_dir().then(|| RepositoryDirectory {
            path: normalize_repo_path(path),
        }))
    }

    fn load_by_name(
        &self,
        directory: &RepositoryDirectory,
        name: &str,
    ) -> Result<PipelineDefinition> {
        let dir = self.dir_path(&directory.path);
        for ext in ["yaml", "yml"] {
            let candidate = dir.join(format!("{name}.{ext}"));
            if candidate.is_file() {
                return parse_pipeline_file(&candidate);
            }
        }
        anyhow::bail!(
            "Pipeline '{name}' not found in repository directory '{}'",
            directory.path
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const ORDERS: &str = r"
name: orders
id: orders-1
steps:
  - name: read
    type: input
  - name: total
    type: group_by
    config:
      keys: [customer]
hops:
  - from: read
    to: total
";

    #[test]
    fn parses_steps_and_hops() {
        let def = parse_pipeline_str(ORDERS).unwrap();
        assert_eq!(def.name, "orders");
        assert_eq!(def.step_names().collect::<Vec<_>>(), vec!["read", "total"]);
        assert!(def.has_step("total"));
        assert!(!def.has_step("write"));
        assert_eq!(def.step("total").unwrap().config["keys"][0], "customer");
        assert_eq!(def.hops.len(), 1);
    }

    #[test]
    fn rejects_pipeline_without_steps() {
        let err = parse_pipeline_str("name: empty\nsteps: []\n").unwrap_err();
        assert!(err.to_string().contains("declares no steps"));
    }

    #[test]
    fn directory_repository_loads_by_path_and_id() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sales/daily")).unwrap();
        std::fs::write(dir.path().join("sales/daily/orders.yaml"), ORDERS).unwrap();

        let repo = DirectoryRepository::open(dir.path()).unwrap();
        let found = repo.find_directory("/sales/daily/").unwrap().unwrap();
        assert_eq!(found.path, "/sales/daily");
        assert_eq!(repo.load_by_name(&found, "orders").unwrap().name, "orders");
        assert!(repo.load_by_name(&found, "returns").is_err());
        assert!(repo.find_directory("/marketing").unwrap().is_none());

        assert_eq!(repo.load_by_id("orders-1").unwrap().name, "orders");
        assert!(repo.load_by_id("missing").is_err());
    }

    #[test]
    fn root_directory_is_slash() {
        let dir = tempdir().unwrap();
        let repo = DirectoryRepository::open(dir.path()).unwrap();
        assert_eq!(repo.find_directory("/").unwrap().unwrap().path, "/");
    }
}
