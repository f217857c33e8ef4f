//! Pipeline engine backed by an external command.
//!
//! Each run gets a scratch directory holding a `pipeline.json` manifest,
//! one JSON-lines file per input fixture and an empty capture directory.
//! The command is started with the manifest path as its last argument and
//! is expected to:
//!
//! - read fixture rows instead of the normal upstream of each fixture step,
//! - write the rows reaching each capture step to the listed capture file,
//! - optionally write `{"errors": <n>}` to `summary.json` in the capture
//!   directory.
//!
//! Standard output and error are collected in `run.log`.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use pipetest_types::RowSet;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::config::types::EngineConfig;
use crate::execution::{PipelineEngine, RunHandle, RunSettings, StopHandle};
use crate::jsonl;
use crate::loader::PreparedPipeline;
use crate::pipeline::PipelineDefinition;
use crate::vars::{Variables, RUN_UNIT_TEST_VAR, SUPPRESS_TEST_ERRORS_VAR, UNIT_TEST_NAME_VAR};

pub const MANIFEST_ENV: &str = "PIPETEST_MANIFEST";
pub const FIXTURE_DIR_ENV: &str = "PIPETEST_FIXTURE_DIR";
pub const CAPTURE_DIR_ENV: &str = "PIPETEST_CAPTURE_DIR";
pub const LOG_LEVEL_ENV: &str = "PIPETEST_LOG_LEVEL";

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Serialize)]
struct RunManifest<'a> {
    test_name: &'a str,
    source: &'a str,
    pipeline: &'a PipelineDefinition,
    variables: &'a Variables,
    parameters: &'a Variables,
    log_level: &'a str,
    arguments: &'a [String],
    /// Step name → fixture file.
    fixtures: BTreeMap<&'a str, PathBuf>,
    /// Step name → capture file.
    captures: BTreeMap<&'a str, PathBuf>,
    summary: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct RunSummaryFile {
    #[serde(default)]
    errors: u64,
}

/// File name used for a step's fixture or capture file.
///
/// Characters outside `[A-Za-z0-9_.-]` are replaced by `_`.
#[must_use]
pub fn step_file_name(step: &str) -> String {
    let mut name: String = step
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    name.push_str(".jsonl");
    name
}

/// Starts each run as a child process.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    command: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandEngine {
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            working_dir: None,
        }
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        let engine = Self::new(config.command.clone(), config.args.clone());
        match &config.working_dir {
            Some(dir) => engine.with_working_dir(dir),
            None => engine,
        }
    }

    fn write_inputs<'a>(
        pipeline: &'a PreparedPipeline,
        fixture_dir: &Path,
        capture_dir: &Path,
    ) -> Result<(BTreeMap<&'a str, PathBuf>, BTreeMap<&'a str, PathBuf>)> {
        let mut fixtures = BTreeMap::new();
        for fixture in &pipeline.fixtures {
            let path = fixture_dir.join(step_file_name(&fixture.step));
            jsonl::write_rows(&path, &fixture.rows).with_context(|| {
                format!(
                    "Failed to write fixture for step '{}' (data set '{}')",
                    fixture.step, fixture.data_set
                )
            })?;
            fixtures.insert(fixture.step.as_str(), path);
        }
        let captures = pipeline
            .capture_steps()
            .into_iter()
            .map(|step| (step, capture_dir.join(step_file_name(step))))
            .collect();
        Ok((fixtures, captures))
    }
}

impl PipelineEngine for CommandEngine {
    fn start(
        &self,
        pipeline: &PreparedPipeline,
        settings: &RunSettings,
    ) -> Result<Box<dyn RunHandle>> {
        let scratch = tempfile::Builder::new()
            .prefix("pipetest-run-")
            .tempdir()
            .context("Failed to create run directory")?;
        let fixture_dir = scratch.path().join("fixtures");
        let capture_dir = scratch.path().join("captures");
        std::fs::create_dir_all(&fixture_dir)?;
        std::fs::create_dir_all(&capture_dir)?;

        let (fixtures, captures) = Self::write_inputs(pipeline, &fixture_dir, &capture_dir)?;
        let summary_path = capture_dir.join("summary.json");
        let manifest = RunManifest {
            test_name: pipeline.test_name(),
            source: &pipeline.source,
            pipeline: &pipeline.definition,
            variables: &pipeline.variables,
            parameters: &pipeline.parameters,
            log_level: &settings.log_level,
            arguments: &settings.arguments,
            fixtures,
            captures,
            summary: summary_path.clone(),
        };
        let manifest_path = scratch.path().join("pipeline.json");
        let file = File::create(&manifest_path)
            .with_context(|| format!("Failed to create {}", manifest_path.display()))?;
        serde_json::to_writer_pretty(file, &manifest)?;

        let log_path = scratch.path().join("run.log");
        let log = File::create(&log_path)?;
        let log_err = log.try_clone()?;

        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .arg(&manifest_path)
            .env(MANIFEST_ENV, &manifest_path)
            .env(FIXTURE_DIR_ENV, &fixture_dir)
            .env(CAPTURE_DIR_ENV, &capture_dir)
            .env(LOG_LEVEL_ENV, &settings.log_level)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        for name in [RUN_UNIT_TEST_VAR, SUPPRESS_TEST_ERRORS_VAR, UNIT_TEST_NAME_VAR] {
            if let Some(value) = pipeline.variables.get(name) {
                command.env(name, value);
            }
        }
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let child = command
            .spawn()
            .with_context(|| format!("Failed to start engine command '{}'", self.command))?;
        tracing::debug!(
            pipeline = pipeline.pipeline_name(),
            pid = child.id(),
            dir = %scratch.path().display(),
            "Engine process started"
        );

        let captures = manifest
            .captures
            .into_iter()
            .map(|(step, path)| (step.to_string(), path))
            .collect();
        Ok(Box::new(CommandRun {
            child,
            exit: None,
            stopped: false,
            stop: StopHandle::new(),
            log_path,
            summary_path,
            captures,
            _scratch: scratch,
        }))
    }
}

/// One running engine process.
#[derive(Debug)]
pub struct CommandRun {
    child: Child,
    exit: Option<ExitStatus>,
    stopped: bool,
    stop: StopHandle,
    log_path: PathBuf,
    summary_path: PathBuf,
    captures: BTreeMap<String, PathBuf>,
    _scratch: TempDir,
}

impl CommandRun {
    /// The engine's run summary; an absent file reports no errors.
    fn summary(&self) -> Result<RunSummaryFile> {
        if !self.summary_path.exists() {
            return Ok(RunSummaryFile::default());
        }
        let raw = std::fs::read_to_string(&self.summary_path)
            .with_context(|| format!("Failed to read {}", self.summary_path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid run summary {}", self.summary_path.display()))
    }
}

impl RunHandle for CommandRun {
    fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    fn wait(&mut self) -> Result<()> {
        if self.exit.is_some() {
            return Ok(());
        }
        loop {
            if self.stop.is_stopped() {
                self.child.kill().ok();
                self.exit = Some(self.child.wait()?);
                self.stopped = true;
                anyhow::bail!("run stopped before completion");
            }
            if let Some(status) = self.child.try_wait()? {
                self.exit = Some(status);
                return Ok(());
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn error_count(&self) -> u64 {
        let Ok(summary) = self.summary() else {
            return 1;
        };
        let reported = summary.errors;
        let failed = self.stopped || self.exit.is_some_and(|status| !status.success());
        if failed {
            reported.max(1)
        } else {
            reported
        }
    }

    fn log_text(&self) -> String {
        let mut text = std::fs::read(&self.log_path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();
        if let Some(status) = self.exit.filter(|status| !status.success()) {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&format!("engine exited with {status}"));
        }
        if let Err(e) = self.summary() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&format!("{e:#}"));
        }
        text
    }

    fn captured_rows(&self, step: &str) -> Result<Option<RowSet>> {
        match self.captures.get(step) {
            Some(path) if path.exists() => jsonl::read_untyped_rows(path).map(Some),
            _ => Ok(None),
        }
    }
}

impl Drop for CommandRun {
    fn drop(&mut self) {
        if self.exit.is_none() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
