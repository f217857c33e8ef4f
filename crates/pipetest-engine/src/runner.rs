//! Test runner: selects tests, drives each through load, run and
//! validation, and emits result records in request order.
//!
//! ```text
//! INIT ──(no input)──> BATCH ──┐
//!   └──(input rows)──> STREAM ─┴─> RUNNING ──> DONE
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pipetest_catalog::{SqliteCatalog, TestCatalog, YamlDirCatalog};
use pipetest_types::{ResultRecord, RowSet, TestCategory, Value, UNRESOLVED_PIPELINE};
use tokio::task::JoinSet;

use crate::check::check_tests;
use crate::command::CommandEngine;
use crate::config::types::{CatalogKind, PipetestConfig, RunnerConfig};
use crate::errors::TestError;
use crate::execution::{ExecutionCoordinator, PipelineEngine, RunSettings};
use crate::loader::{reference_label, PipelineLoader};
use crate::pipeline::{DirectoryRepository, PipelineRepository};
use crate::resolve::{FactoryHierarchy, LocationResolver};
use crate::result::{RunSummary, TestCheck};
use crate::sink::ResultSink;
use crate::validate::Validator;
use crate::vars::BASE_PATH_VAR;

/// Everything the runner shares with the tests it drives.
///
/// Catalog, factories and repository are only read.
#[derive(Clone)]
pub struct RunnerContext {
    pub catalog: Arc<dyn TestCatalog>,
    pub factories: Arc<FactoryHierarchy>,
    pub repository: Option<Arc<dyn PipelineRepository>>,
    pub engine: Option<Arc<dyn PipelineEngine>>,
    pub settings: RunSettings,
}

impl RunnerContext {
    #[must_use]
    pub fn new(catalog: Arc<dyn TestCatalog>, factories: Arc<FactoryHierarchy>) -> Self {
        Self {
            catalog,
            factories,
            repository: None,
            engine: None,
            settings: RunSettings::default(),
        }
    }

    #[must_use]
    pub fn with_repository(mut self, repository: Arc<dyn PipelineRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    #[must_use]
    pub fn with_engine(mut self, engine: Arc<dyn PipelineEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the catalog, factories, repository and engine a config names.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog or repository cannot be opened.
    pub fn from_config(config: &PipetestConfig) -> anyhow::Result<Self> {
        let catalog: Arc<dyn TestCatalog> = match config.catalog.kind {
            CatalogKind::Directory => Arc::new(YamlDirCatalog::open(&config.catalog.path)?),
            CatalogKind::Sqlite => Arc::new(SqliteCatalog::open(&config.catalog.path)?),
        };
        let base_dir = config
            .data_sets
            .base_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let mut context = Self::new(catalog, Arc::new(FactoryHierarchy::with_defaults(base_dir)));

        if let Some(repo) = &config.repository {
            context = context.with_repository(Arc::new(DirectoryRepository::open(&repo.path)?));
        }
        if let Some(engine) = &config.engine {
            context = context.with_engine(Arc::new(CommandEngine::from_config(engine)));
        }

        let mut variables = config.variables.clone();
        if let Some(base) = &config.runner.base_path {
            variables
                .entry(BASE_PATH_VAR.to_string())
                .or_insert_with(|| base.clone());
        }
        context.settings = RunSettings {
            log_level: config.runner.log_level.clone(),
            arguments: Vec::new(),
            variables,
            parameters: config.parameters.clone(),
        };
        Ok(context)
    }
}

/// Test selection and scheduling options.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Field of the input rows carrying test names. Required with input.
    pub test_name_field: Option<String>,
    /// Batch-mode category filter; `None` runs every category.
    pub category: Option<TestCategory>,
    pub timeout: Option<Duration>,
    /// Tests run concurrently; records are still emitted in request order.
    pub parallelism: usize,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            test_name_field: None,
            category: None,
            timeout: None,
            parallelism: 1,
        }
    }
}

impl RunnerOptions {
    #[must_use]
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self {
            test_name_field: config.test_name_field.clone(),
            category: config.category,
            timeout: config.timeout_seconds.map(Duration::from_secs),
            parallelism: config.parallelism.max(1),
        }
    }
}

/// Per-test pipeline shared by every scheduled test.
struct TestDriver {
    catalog: Arc<dyn TestCatalog>,
    loader: PipelineLoader,
    coordinator: ExecutionCoordinator,
    validator: Validator,
    settings: RunSettings,
}

impl TestDriver {
    /// Every record for one test. Never fails: problems become records.
    async fn run_test(&self, name: &str) -> Vec<ResultRecord> {
        let started = Instant::now();
        tracing::info!(test = name, "Starting unit test");

        let mut records = Vec::new();
        if let Err((pipeline, err)) = self.drive(name, &mut records).await {
            tracing::warn!(
                test = name,
                pipeline = pipeline,
                error = %err,
                "Unit test failed before validation"
            );
            records.push(ResultRecord::test_failure(
                pipeline,
                Some(name.to_string()),
                err.report(),
            ));
        }

        tracing::info!(
            test = name,
            records = records.len(),
            error = records.iter().any(|r| r.error),
            duration_secs = started.elapsed().as_secs_f64(),
            "Unit test finished"
        );
        records
    }

    /// Load, run and validate. The error carries the best pipeline label
    /// known when it happened.
    async fn drive(
        &self,
        name: &str,
        records: &mut Vec<ResultRecord>,
    ) -> Result<(), (String, TestError)> {
        let test = self
            .catalog
            .get_test(name)
            .map_err(|e| (UNRESOLVED_PIPELINE.to_string(), TestError::from(e)))?;
        let label = reference_label(&test);

        let loader = self.loader.clone();
        let prepared = tokio::task::spawn_blocking(move || loader.load(&test))
            .await
            .map_err(|e| {
                let err = TestError::Load {
                    reference: label.clone(),
                    source: anyhow::anyhow!("load task panicked: {e}"),
                };
                (label.clone(), err)
            })?
            .map_err(|e| (label.clone(), e))?;
        let prepared = Arc::new(prepared);
        let pipeline = prepared.pipeline_name().to_string();
        tracing::info!(
            test = name,
            pipeline = pipeline,
            source = prepared.source,
            "Loaded pipeline"
        );

        let run = self
            .coordinator
            .execute(Arc::clone(&prepared), &self.settings)
            .await
            .map_err(|e| (pipeline.clone(), e))?;

        if run.error_count() > 0 {
            tracing::warn!(
                test = name,
                pipeline = pipeline,
                error_count = run.error_count(),
                "Pipeline run reported errors"
            );
            records.push(ResultRecord::run_failure(
                &pipeline,
                name,
                format!(
                    "Pipeline run reported {} error(s)\n{}",
                    run.error_count(),
                    run.log_text()
                ),
            ));
        }

        let validator = self.validator.clone();
        let validated = tokio::task::spawn_blocking(move || validator.validate(&prepared, &run))
            .await
            .map_err(|e| {
                let err = TestError::Execution {
                    pipeline: pipeline.clone(),
                    source: anyhow::anyhow!("validation task panicked: {e}"),
                };
                (pipeline.clone(), err)
            })?;
        records.extend(validated);
        Ok(())
    }
}

/// Runs unit tests from a catalog.
pub struct TestRunner {
    context: RunnerContext,
    options: RunnerOptions,
}

impl TestRunner {
    #[must_use]
    pub fn new(context: RunnerContext, options: RunnerOptions) -> Self {
        Self { context, options }
    }

    #[must_use]
    pub fn context(&self) -> &RunnerContext {
        &self.context
    }

    #[must_use]
    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    #[must_use]
    pub fn resolver(&self) -> LocationResolver {
        LocationResolver::new(
            Arc::clone(&self.context.catalog),
            Arc::clone(&self.context.factories),
        )
    }

    #[must_use]
    pub fn loader(&self) -> PipelineLoader {
        PipelineLoader::new(
            self.resolver(),
            self.context.repository.clone(),
            self.context.settings.clone(),
        )
    }

    /// Test names to attempt, in order.
    ///
    /// With `input` (stream mode) the names come from the configured
    /// test-name field of every row, in row order; rows without a name are
    /// skipped. Without input (batch mode) the catalog is listed and
    /// filtered by category.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::Configuration`] if input is given and the
    /// test-name field is unset, or absent from the schema of non-empty
    /// input, or
    /// [`TestError::Catalog`] if listing fails.
    pub fn select_tests(&self, input: Option<&RowSet>) -> Result<Vec<String>, TestError> {
        let Some(rows) = input else {
            let names = self.context.catalog.list_tests(self.options.category)?;
            tracing::info!(
                mode = "batch",
                category = self.options.category.map(TestCategory::as_str),
                tests = names.len(),
                "Selected tests from catalog"
            );
            return Ok(names);
        };

        let field = self
            .options
            .test_name_field
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .ok_or_else(|| {
                TestError::Configuration(
                    "an input row source is connected but no test-name field is configured"
                        .to_string(),
                )
            })?;
        if rows.is_empty() {
            tracing::info!(mode = "stream", tests = 0, "Input rows are empty, nothing to run");
            return Ok(Vec::new());
        }
        let idx = rows.index_of(field).ok_or_else(|| {
            TestError::Configuration(format!(
                "test-name field '{field}' is not present in the input rows"
            ))
        })?;

        let mut names = Vec::with_capacity(rows.len());
        for (row_idx, row) in rows.rows.iter().enumerate() {
            match row.get(idx) {
                Some(Value::String(s)) if !s.trim().is_empty() => names.push(s.trim().to_string()),
                Some(value) if !value.is_null() && !matches!(value, Value::String(_)) => {
                    names.push(value.to_string());
                }
                _ => tracing::warn!(row = row_idx + 1, field, "Input row has no test name, skipping"),
            }
        }
        tracing::info!(mode = "stream", tests = names.len(), "Selected tests from input rows");
        Ok(names)
    }

    /// Run the selected tests and emit their records to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::Configuration`] before any test is attempted if
    /// no engine is configured or the input field is missing,
    /// [`TestError::Catalog`] if the catalog cannot be listed, and
    /// [`TestError::Output`] if the sink fails. Every other failure is
    /// reported as a record.
    pub async fn run(
        &self,
        input: Option<RowSet>,
        sink: &mut dyn ResultSink,
    ) -> Result<RunSummary, TestError> {
        let names = self
            .require_engine()
            .and_then(|_| self.select_tests(input.as_ref()))
            .inspect_err(|e| tracing::error!(error = %e, "Unit test run aborted"))?;
        self.run_tests(names, sink).await
    }

    /// Run exactly `names`, in order.
    ///
    /// # Errors
    ///
    /// See [`TestRunner::run`].
    pub async fn run_tests(
        &self,
        names: Vec<String>,
        sink: &mut dyn ResultSink,
    ) -> Result<RunSummary, TestError> {
        let engine = self
            .require_engine()
            .inspect_err(|e| tracing::error!(error = %e, "Unit test run aborted"))?;
        let resolver = self.resolver();
        let driver = Arc::new(TestDriver {
            catalog: Arc::clone(&self.context.catalog),
            loader: self.loader(),
            coordinator: ExecutionCoordinator::new(engine, self.options.timeout),
            validator: Validator::new(resolver),
            settings: self.context.settings.clone(),
        });

        let started = Instant::now();
        let mut summary = RunSummary::default();
        if self.options.parallelism <= 1 || names.len() <= 1 {
            for name in &names {
                let records = driver.run_test(name).await;
                emit_all(sink, &mut summary, records)?;
            }
        } else {
            run_parallel(driver, names, self.options.parallelism, sink, &mut summary).await?;
        }

        sink.finish().map_err(TestError::Output)?;
        summary.duration_secs = started.elapsed().as_secs_f64();
        tracing::info!(
            tests = summary.tests_attempted,
            records = summary.records_emitted,
            failed_tests = summary.failed_tests,
            duration_secs = summary.duration_secs,
            "Unit test run complete"
        );
        Ok(summary)
    }

    /// Load every selected test and resolve its bindings without running.
    ///
    /// # Errors
    ///
    /// Same selection errors as [`TestRunner::select_tests`].
    pub async fn check(&self, input: Option<RowSet>) -> Result<Vec<TestCheck>, TestError> {
        let names = self.select_tests(input.as_ref())?;
        let catalog = Arc::clone(&self.context.catalog);
        let loader = self.loader();
        tokio::task::spawn_blocking(move || check_tests(&catalog, &loader, &names))
            .await
            .map_err(|e| TestError::Configuration(format!("check task failed: {e}")))
    }

    fn require_engine(&self) -> Result<Arc<dyn PipelineEngine>, TestError> {
        self.context.engine.clone().ok_or_else(|| {
            TestError::Configuration("no pipeline engine is configured".to_string())
        })
    }
}

fn emit_all(
    sink: &mut dyn ResultSink,
    summary: &mut RunSummary,
    records: Vec<ResultRecord>,
) -> Result<(), TestError> {
    summary.record_test(&records);
    for record in records {
        sink.emit(record).map_err(TestError::Output)?;
    }
    Ok(())
}

/// Run tests concurrently, flushing each test's records only after every
/// earlier test has been flushed.
async fn run_parallel(
    driver: Arc<TestDriver>,
    names: Vec<String>,
    parallelism: usize,
    sink: &mut dyn ResultSink,
    summary: &mut RunSummary,
) -> Result<(), TestError> {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(parallelism));
    let mut join_set: JoinSet<(usize, Vec<ResultRecord>)> = JoinSet::new();
    tracing::debug!(parallelism, tests = names.len(), "Running unit tests concurrently");

    for (idx, name) in names.into_iter().enumerate() {
        let driver = Arc::clone(&driver);
        let semaphore = Arc::clone(&semaphore);
        join_set.spawn(async move {
            let records = match semaphore.acquire_owned().await {
                Ok(_permit) => driver.run_test(&name).await,
                Err(e) => vec![ResultRecord::test_failure(
                    UNRESOLVED_PIPELINE,
                    Some(name.clone()),
                    format!("scheduler closed: {e}"),
                )],
            };
            (idx, records)
        });
    }

    let mut pending: BTreeMap<usize, Vec<ResultRecord>> = BTreeMap::new();
    let mut next = 0;
    while let Some(joined) = join_set.join_next().await {
        let (idx, records) = match joined {
            Ok(done) => done,
            Err(join_err) => {
                join_set.abort_all();
                return Err(TestError::Execution {
                    pipeline: UNRESOLVED_PIPELINE.to_string(),
                    source: anyhow::anyhow!("unit test task panicked: {join_err}"),
                });
            }
        };
        pending.insert(idx, records);
        while let Some(records) = pending.remove(&next) {
            if let Err(e) = emit_all(sink, summary, records) {
                join_set.abort_all();
                return Err(e);
            }
            next += 1;
        }
    }
    Ok(())
}
