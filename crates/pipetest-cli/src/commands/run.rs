use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use pipetest_engine::{
    JsonLinesSink, ResultSink, RunSummary, RunnerContext, RunnerOptions, TestRunner,
};
use pipetest_types::ResultRecord;

use super::Plan;
use crate::{OutputFormat, Selection};

/// Prints one line per record.
struct TableSink<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> ResultSink for TableSink<W> {
    fn emit(&mut self, record: ResultRecord) -> Result<()> {
        let status = if record.error { "FAIL" } else { "PASS" };
        let comment = record.comment.as_deref().unwrap_or("");
        let (first_line, rest) = comment.split_once('\n').unwrap_or((comment, ""));
        writeln!(
            self.out,
            "{status:4}  {:24} {:16} {:16} {:16} {first_line}",
            record.test_name.as_deref().unwrap_or("-"),
            record.pipeline_name,
            record.step_name.as_deref().unwrap_or("-"),
            record.data_set_name.as_deref().unwrap_or("-"),
        )?;
        for line in rest.lines() {
            writeln!(self.out, "      | {line}")?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Execute the `run` command: select tests, run them, and report records.
pub async fn execute(
    config_path: &Path,
    selection: Selection,
    timeout: Option<u64>,
    parallelism: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let config = super::load_config(config_path)?;
    let context = RunnerContext::from_config(&config)?;

    let mut options = RunnerOptions::from_config(&config.runner);
    if let Some(category) = selection.category {
        options.category = Some(category);
    }
    if let Some(field) = &selection.test_field {
        options.test_name_field = Some(field.clone());
    }
    if let Some(secs) = timeout {
        options.timeout = Some(Duration::from_secs(secs));
    }
    if let Some(n) = parallelism {
        options.parallelism = n.max(1);
    }

    tracing::info!(
        config = %config_path.display(),
        category = ?options.category,
        parallelism = options.parallelism,
        "Starting unit test run"
    );

    let runner = TestRunner::new(context, options);
    let plan = super::plan(&runner, &selection)?;

    let summary = match format {
        OutputFormat::Jsonl => {
            let mut sink = JsonLinesSink::new(BufWriter::new(std::io::stdout()));
            run_plan(&runner, plan, &mut sink).await?
        }
        OutputFormat::Table => {
            let mut sink = TableSink {
                out: BufWriter::new(std::io::stdout()),
            };
            run_plan(&runner, plan, &mut sink).await?
        }
    };

    eprintln!(
        "{} test(s), {} record(s), {} failed record(s) in {:.2}s",
        summary.tests_attempted,
        summary.records_emitted,
        summary.failed_records,
        summary.duration_secs
    );
    if summary.is_success() {
        Ok(())
    } else {
        anyhow::bail!(
            "{} of {} test(s) failed",
            summary.failed_tests,
            summary.tests_attempted
        )
    }
}

async fn run_plan(
    runner: &TestRunner,
    plan: Plan,
    sink: &mut dyn ResultSink,
) -> Result<RunSummary> {
    let summary = match plan {
        Plan::Names(names) => runner.run_tests(names, sink).await?,
        Plan::Select(input) => runner.run(input, sink).await?,
    };
    Ok(summary)
}
