//! Pipeline reference loading and test-mode preparation.
//!
//! [`PipelineLoader::load`] turns a [`TestDefinition`] into a
//! [`PreparedPipeline`]: the referenced pipeline is located (file, then
//! repository object id, then repository path), every binding is checked
//! against its steps, fixture data sets are resolved, and the test-mode
//! variables are injected.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use pipetest_types::{
    Binding, PipelineReference, RowSet, TestDefinition, UNRESOLVED_PIPELINE,
};

use crate::errors::{ResolutionError, TestError};
use crate::execution::RunSettings;
use crate::pipeline::{parse_pipeline_file, PipelineDefinition, PipelineRepository};
use crate::resolve::LocationResolver;
use crate::vars::{
    merged, substitute, Variables, BASE_PATH_VAR, RUN_UNIT_TEST_VAR, SUPPRESS_TEST_ERRORS_VAR,
    UNIT_TEST_NAME_VAR,
};

/// Input rows substituted for one step's normal upstream data.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub step: String,
    pub data_set: String,
    pub rows: RowSet,
}

/// A pipeline ready to be run as one unit test.
#[derive(Debug, Clone)]
pub struct PreparedPipeline {
    pub definition: PipelineDefinition,
    pub test: TestDefinition,
    /// Pipeline defaults, then calling-context values, then test-mode flags.
    pub variables: Variables,
    /// Pipeline defaults overridden by calling-context values.
    pub parameters: Variables,
    pub fixtures: Vec<Fixture>,
    /// Where the definition came from, for logs and error records.
    pub source: String,
}

impl PreparedPipeline {
    #[must_use]
    pub fn pipeline_name(&self) -> &str {
        &self.definition.name
    }

    #[must_use]
    pub fn test_name(&self) -> &str {
        &self.test.name
    }

    /// Golden bindings, in declaration order.
    #[must_use]
    pub fn goldens(&self) -> &[Binding] {
        &self.test.goldens
    }

    /// Steps whose output the engine has to capture.
    #[must_use]
    pub fn capture_steps(&self) -> Vec<&str> {
        let mut steps: Vec<&str> = Vec::new();
        for binding in &self.test.goldens {
            if !steps.contains(&binding.step.as_str()) {
                steps.push(&binding.step);
            }
        }
        steps
    }
}

/// Split a repository path into directory and pipeline name.
///
/// `"/dir/sub/name"` → `("/dir/sub", "name")`; a bare name lives in `"/"`.
#[must_use]
pub fn split_repository_path(path: &str) -> (String, String) {
    let trimmed = path.trim().trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((dir, name)) if !dir.is_empty() => (dir.to_string(), name.to_string()),
        Some((_, name)) => ("/".to_string(), name.to_string()),
        None => ("/".to_string(), trimmed.to_string()),
    }
}

/// Label identifying the pipeline a test declares, for records produced
/// before (or instead of) a successful load.
#[must_use]
pub fn reference_label(test: &TestDefinition) -> String {
    test.pipeline_reference()
        .map_or_else(|| UNRESOLVED_PIPELINE.to_string(), |r| r.to_string())
}

/// Resolve a pipeline file against an optional base path.
///
/// Absolute files are returned unchanged. Relative files are joined onto
/// the base (when there is one) and must exist.
///
/// # Errors
///
/// Returns an error if a relative file does not exist under the base.
pub fn resolve_file(file: &str, base: Option<&str>) -> anyhow::Result<PathBuf> {
    let path = Path::new(file);
    let Some(base) = base.filter(|b| !b.trim().is_empty()) else {
        return Ok(path.to_path_buf());
    };
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let joined = Path::new(base).join(path);
    let meta = std::fs::metadata(&joined)
        .with_context(|| format!("{} is not accessible", joined.display()))?;
    if !meta.is_file() {
        anyhow::bail!("{} is not a file", joined.display());
    }
    Ok(joined)
}

/// Locates and prepares the pipeline a test refers to.
#[derive(Clone)]
pub struct PipelineLoader {
    resolver: LocationResolver,
    repository: Option<Arc<dyn PipelineRepository>>,
    settings: RunSettings,
}

impl PipelineLoader {
    #[must_use]
    pub fn new(
        resolver: LocationResolver,
        repository: Option<Arc<dyn PipelineRepository>>,
        settings: RunSettings,
    ) -> Self {
        Self {
            resolver,
            repository,
            settings,
        }
    }

    #[must_use]
    pub fn resolver(&self) -> &LocationResolver {
        &self.resolver
    }

    /// Load and prepare the pipeline for `test`.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::MissingReference`], [`TestError::PathResolution`],
    /// [`TestError::NoRepository`], [`TestError::Load`] or
    /// [`TestError::Resolution`].
    pub fn load(&self, test: &TestDefinition) -> Result<PreparedPipeline, TestError> {
        let (definition, source) = self.locate(test)?;
        self.prepare(test, definition, source)
    }

    /// Locate and parse the referenced pipeline, without preparing it.
    ///
    /// # Errors
    ///
    /// See [`PipelineLoader::load`].
    pub fn locate(
        &self,
        test: &TestDefinition,
    ) -> Result<(PipelineDefinition, String), TestError> {
        let reference = test
            .pipeline_reference()
            .ok_or_else(|| TestError::MissingReference {
                test: test.name.clone(),
            })?;

        match reference {
            PipelineReference::File(raw) => {
                let file = substitute(raw, &self.settings.variables);
                let base = test
                    .base_path
                    .as_deref()
                    .filter(|b| !b.trim().is_empty())
                    .map(|b| substitute(b, &self.settings.variables))
                    .or_else(|| self.settings.variables.get(BASE_PATH_VAR).cloned());

                let path = resolve_file(&file, base.as_deref()).map_err(|source| {
                    TestError::PathResolution {
                        file: file.clone(),
                        base: base.clone().unwrap_or_default(),
                        source,
                    }
                })?;
                tracing::info!(
                    test = test.name,
                    file = %path.display(),
                    "Loading pipeline from file"
                );
                let definition = parse_pipeline_file(&path).map_err(|source| TestError::Load {
                    reference: path.display().to_string(),
                    source,
                })?;
                Ok((definition, path.display().to_string()))
            }
            PipelineReference::ObjectId(id) => {
                let repo = self.repository(test, &reference)?;
                tracing::info!(
                    test = test.name,
                    object_id = id,
                    repository = repo.name(),
                    "Loading pipeline by object id"
                );
                let definition = repo.load_by_id(id).map_err(|source| TestError::Load {
                    reference: reference.to_string(),
                    source,
                })?;
                Ok((definition, reference.to_string()))
            }
            PipelineReference::RepositoryPath(path) => {
                let repo = self.repository(test, &reference)?;
                let (dir, name) = split_repository_path(path);
                tracing::info!(
                    test = test.name,
                    directory = dir,
                    pipeline = name,
                    repository = repo.name(),
                    "Loading pipeline by repository path"
                );
                let load_err = |source: anyhow::Error| TestError::Load {
                    reference: reference.to_string(),
                    source,
                };
                let directory = repo
                    .find_directory(&dir)
                    .map_err(load_err)?
                    .ok_or_else(|| {
                        load_err(anyhow::anyhow!("repository directory '{dir}' not found"))
                    })?;
                let definition = repo.load_by_name(&directory, &name).map_err(load_err)?;
                Ok((definition, reference.to_string()))
            }
        }
    }

    fn repository(
        &self,
        test: &TestDefinition,
        reference: &PipelineReference<'_>,
    ) -> Result<&Arc<dyn PipelineRepository>, TestError> {
        self.repository
            .as_ref()
            .ok_or_else(|| TestError::NoRepository {
                test: test.name.clone(),
                reference: reference.to_string(),
            })
    }

    /// Apply test-mode configuration to a located pipeline.
    fn prepare(
        &self,
        test: &TestDefinition,
        definition: PipelineDefinition,
        source: String,
    ) -> Result<PreparedPipeline, TestError> {
        for binding in test.inputs.iter().chain(test.goldens.iter()) {
            if !definition.has_step(&binding.step) {
                return Err(ResolutionError::UnknownStep {
                    pipeline: definition.name.clone(),
                    step: binding.step.clone(),
                    data_set: binding.data_set.clone(),
                }
                .into());
            }
        }

        let mut fixtures = Vec::with_capacity(test.inputs.len());
        for binding in &test.inputs {
            let resolved = self.resolver.resolve(binding, &[])?;
            fixtures.push(Fixture {
                step: binding.step.clone(),
                data_set: binding.data_set.clone(),
                rows: resolved.rows,
            });
        }

        let mut variables = merged(&definition.variables, &self.settings.variables);
        variables.insert(SUPPRESS_TEST_ERRORS_VAR.to_string(), "Y".to_string());
        variables.insert(RUN_UNIT_TEST_VAR.to_string(), "Y".to_string());
        variables.insert(UNIT_TEST_NAME_VAR.to_string(), test.name.clone());
        let parameters = merged(&definition.parameters, &self.settings.parameters);

        tracing::debug!(
            test = test.name,
            pipeline = definition.name,
            fixtures = fixtures.len(),
            goldens = test.goldens.len(),
            "Prepared pipeline for unit test"
        );

        Ok(PreparedPipeline {
            definition,
            test: test.clone(),
            variables,
            parameters,
            fixtures,
            source,
        })
    }
}
