pub mod check;
pub mod list;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pipetest_engine::config::parser;
use pipetest_engine::config::types::PipetestConfig;
use pipetest_engine::config::validator;
use pipetest_engine::{jsonl, CatalogTestHost, PipelineIdentity, TestHost, TestRunner};
use pipetest_catalog::TestCatalog;
use pipetest_types::RowSet;

use crate::Selection;

/// Parse and validate the runner configuration.
pub fn load_config(path: &Path) -> Result<PipetestConfig> {
    let config = parser::parse_config(path)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;
    validator::validate_config(&config)?;
    tracing::debug!(
        config = %path.display(),
        catalog = %config.catalog.path.display(),
        "Configuration loaded"
    );
    Ok(config)
}

/// Parse `object:<id>`, `repository:<path>` or a pipeline file path.
pub fn parse_identity(raw: &str) -> Result<PipelineIdentity> {
    if let Some(id) = raw.strip_prefix("object:") {
        return Ok(PipelineIdentity::ObjectId(id.to_string()));
    }
    if let Some(path) = raw.strip_prefix("repository:") {
        return Ok(PipelineIdentity::RepositoryPath(path.to_string()));
    }
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        return Ok(PipelineIdentity::File(path));
    }
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(PipelineIdentity::File(cwd.join(path)))
}

/// Read the rows of a `--tests-from` file.
pub fn read_input(path: &Path) -> Result<RowSet> {
    jsonl::read_untyped_rows(path)
        .with_context(|| format!("Failed to read test names from {}", path.display()))
}

/// What a [`Selection`] asks the runner to do.
pub enum Plan {
    /// Exactly these tests, in order.
    Names(Vec<String>),
    /// Let the runner select (batch mode, or stream mode with input rows).
    Select(Option<RowSet>),
}

/// Turn CLI selection flags into a plan. Explicit names win over
/// `--pipeline`, which wins over `--tests-from`.
pub fn plan(runner: &TestRunner, selection: &Selection) -> Result<Plan> {
    if !selection.tests.is_empty() {
        return Ok(Plan::Names(selection.tests.clone()));
    }
    if let Some(raw) = &selection.pipeline {
        let identity = parse_identity(raw)?;
        let host = CatalogTestHost::new(runner.context().catalog.clone());
        let mut names = host.known_tests(&identity)?;
        if let Some(category) = runner.options().category {
            let catalog = &runner.context().catalog;
            let mut kept = Vec::with_capacity(names.len());
            for name in names {
                if catalog.get_test(&name)?.category == category {
                    kept.push(name);
                }
            }
            names = kept;
        }
        tracing::info!(pipeline = %identity, tests = names.len(), "Selected tests for pipeline");
        return Ok(Plan::Names(names));
    }
    let input = selection.tests_from.as_deref().map(read_input).transpose()?;
    Ok(Plan::Select(input))
}
