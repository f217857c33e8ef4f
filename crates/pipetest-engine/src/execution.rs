//! Pipeline engine abstraction and the execution coordinator.
//!
//! The pipeline engine itself is external. [`PipelineEngine`] starts a run
//! of a [`PreparedPipeline`] and returns a [`RunHandle`];
//! [`ExecutionCoordinator`] drives that handle to completion on the
//! blocking pool, optionally bounded by a timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pipetest_types::RowSet;

use crate::errors::TestError;
use crate::loader::PreparedPipeline;
use crate::vars::Variables;

/// How long a stopped run gets to release its resources before the
/// coordinator stops waiting for it.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Settings propagated from the calling context into every run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Log level handed to the engine.
    pub log_level: String,
    /// Extra invocation arguments handed to the engine.
    pub arguments: Vec<String>,
    pub variables: Variables,
    pub parameters: Variables,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            arguments: Vec::new(),
            variables: Variables::new(),
            parameters: Variables::new(),
        }
    }
}

/// Cooperative stop flag shared between a run and whoever supervises it.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// External pipeline execution engine.
pub trait PipelineEngine: Send + Sync {
    /// Start one run of `pipeline`.
    ///
    /// # Errors
    ///
    /// Returns an error if the run cannot be started at all.
    fn start(
        &self,
        pipeline: &PreparedPipeline,
        settings: &RunSettings,
    ) -> anyhow::Result<Box<dyn RunHandle>>;
}

/// A started run. Dropping the handle releases everything the run holds.
pub trait RunHandle: Send {
    /// Flag that makes a blocked [`RunHandle::wait`] return early.
    fn stop_handle(&self) -> StopHandle;

    /// Block until the run finishes or is stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the run could not be awaited or was stopped.
    fn wait(&mut self) -> anyhow::Result<()>;

    /// Errors the engine reported for the run.
    fn error_count(&self) -> u64;

    /// Aggregate log output of the run.
    fn log_text(&self) -> String;

    /// Rows captured at `step`; `Ok(None)` if the step produced no capture.
    ///
    /// # Errors
    ///
    /// Returns an error if a capture exists but cannot be read.
    fn captured_rows(&self, step: &str) -> anyhow::Result<Option<RowSet>>;
}

/// A finished run, holding its handle so captures stay readable.
pub struct CompletedRun {
    pipeline_name: String,
    error_count: u64,
    log_text: String,
    duration: Duration,
    handle: Box<dyn RunHandle>,
}

impl CompletedRun {
    /// Wrap a handle whose run has already finished.
    #[must_use]
    pub fn new(
        pipeline_name: impl Into<String>,
        handle: Box<dyn RunHandle>,
        duration: Duration,
    ) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            error_count: handle.error_count(),
            log_text: handle.log_text(),
            duration,
            handle,
        }
    }

    #[must_use]
    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    #[must_use]
    pub fn log_text(&self) -> &str {
        &self.log_text
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Rows captured at `step`.
    ///
    /// # Errors
    ///
    /// Returns an error if the capture cannot be read.
    pub fn captured_rows(&self, step: &str) -> anyhow::Result<Option<RowSet>> {
        self.handle.captured_rows(step)
    }
}

impl std::fmt::Debug for CompletedRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletedRun")
            .field("pipeline_name", &self.pipeline_name)
            .field("error_count", &self.error_count)
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}

/// Runs prepared pipelines one at a time and waits for them.
#[derive(Clone)]
pub struct ExecutionCoordinator {
    engine: Arc<dyn PipelineEngine>,
    timeout: Option<Duration>,
}

impl ExecutionCoordinator {
    #[must_use]
    pub fn new(engine: Arc<dyn PipelineEngine>, timeout: Option<Duration>) -> Self {
        Self { engine, timeout }
    }

    /// Start `pipeline` and wait for it to finish.
    ///
    /// No retry is attempted. When a timeout is configured and exceeded,
    /// the run is stopped and [`TestError::Timeout`] is returned.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::Execution`] if the run cannot start or be
    /// awaited, or [`TestError::Timeout`].
    pub async fn execute(
        &self,
        pipeline: Arc<PreparedPipeline>,
        settings: &RunSettings,
    ) -> Result<CompletedRun, TestError> {
        let name = pipeline.pipeline_name().to_string();
        let test = pipeline.test_name().to_string();
        let execution_err = |source: anyhow::Error| TestError::Execution {
            pipeline: name.clone(),
            source,
        };

        let engine = Arc::clone(&self.engine);
        let start_settings = settings.clone();
        let started = Instant::now();
        let handle = tokio::task::spawn_blocking(move || engine.start(&pipeline, &start_settings))
            .await
            .map_err(|e| execution_err(anyhow::anyhow!("start task panicked: {e}")))?
            .map_err(execution_err)?;

        tracing::info!(pipeline = name, test = test, "Pipeline run started");

        let stop = handle.stop_handle();
        let mut wait_task = tokio::task::spawn_blocking(move || {
            let mut handle = handle;
            let waited = handle.wait();
            (handle, waited)
        });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut wait_task).await {
                Ok(joined) => joined,
                Err(_) => {
                    stop.stop();
                    tracing::warn!(
                        pipeline = name,
                        test = test,
                        timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                        "Pipeline run timed out, stopping it"
                    );
                    if tokio::time::timeout(STOP_GRACE, &mut wait_task).await.is_err() {
                        tracing::warn!(pipeline = name, "Stopped run did not exit within grace period");
                    }
                    return Err(TestError::Timeout {
                        pipeline: name,
                        timeout: limit,
                    });
                }
            },
            None => wait_task.await,
        };

        let (handle, waited) =
            joined.map_err(|e| execution_err(anyhow::anyhow!("run task panicked: {e}")))?;
        waited.map_err(execution_err)?;

        let run = CompletedRun::new(name, handle, started.elapsed());
        tracing::info!(
            pipeline = run.pipeline_name(),
            test = test,
            error_count = run.error_count(),
            duration_secs = run.duration().as_secs_f64(),
            "Pipeline run finished"
        );
        Ok(run)
    }
}
