//! Runner configuration types.

use std::path::{Path, PathBuf};

use pipetest_types::TestCategory;
use serde::Deserialize;

use crate::vars::Variables;

/// Top-level `pipetest.yaml` document.
#[derive(Debug, Clone, Deserialize)]
pub struct PipetestConfig {
    pub version: String,
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub repository: Option<RepositoryConfig>,
    #[serde(default)]
    pub engine: Option<EngineConfig>,
    #[serde(default)]
    pub data_sets: DataSetsConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Variables propagated to every test run.
    #[serde(default)]
    pub variables: Variables,
    /// Parameters propagated to every test run.
    #[serde(default)]
    pub parameters: Variables,
}

/// Which catalog back-end holds test and data-set definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    Directory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    pub kind: CatalogKind,
    pub path: PathBuf,
}

/// Pipeline repository root, for tests that reference pipelines by
/// object id or repository path.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryConfig {
    pub path: PathBuf,
}

/// External pipeline engine invoked once per test.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataSetsConfig {
    /// Directory that relative data-set locations are resolved against.
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Field of the upstream row source that carries test names.
    #[serde(default)]
    pub test_name_field: Option<String>,
    /// Restrict batch mode to one category.
    #[serde(default)]
    pub category: Option<TestCategory>,
    /// Default base path for relative pipeline files.
    #[serde(default)]
    pub base_path: Option<String>,
    /// Upper bound on a single pipeline run.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Log level handed to the pipeline engine.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_parallelism() -> usize {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            test_name_field: None,
            category: None,
            base_path: None,
            timeout_seconds: None,
            parallelism: default_parallelism(),
            log_level: default_log_level(),
        }
    }
}

impl PipetestConfig {
    /// Make every relative path in the config relative to `dir`, usually
    /// the directory the config file was read from.
    pub fn resolve_paths(&mut self, dir: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        };
        join(&mut self.catalog.path);
        if let Some(repo) = self.repository.as_mut() {
            join(&mut repo.path);
        }
        if let Some(engine) = self.engine.as_mut() {
            if let Some(wd) = engine.working_dir.as_mut() {
                join(wd);
            }
        }
        if let Some(base) = self.runner.base_path.as_mut() {
            if !base.contains("${") && Path::new(base.as_str()).is_relative() {
                *base = dir.join(base.as_str()).display().to_string();
            }
        }
        match self.data_sets.base_dir.as_mut() {
            Some(base) => join(base),
            None => self.data_sets.base_dir = Some(dir.to_path_buf()),
        }
    }
}
