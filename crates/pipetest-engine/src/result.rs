//! Batch summary and check-mode result types.

use pipetest_types::ResultRecord;

/// Totals for one runner invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub tests_attempted: usize,
    pub records_emitted: usize,
    /// Records with `error = true`.
    pub failed_records: usize,
    /// Tests with at least one failed record.
    pub failed_tests: usize,
    pub duration_secs: f64,
}

impl RunSummary {
    /// Fold one test's records into the totals.
    pub fn record_test(&mut self, records: &[ResultRecord]) {
        self.tests_attempted += 1;
        self.records_emitted += records.len();
        let failed = records.iter().filter(|r| r.error).count();
        self.failed_records += failed;
        if failed > 0 {
            self.failed_tests += 1;
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed_records == 0
    }
}

/// Outcome of loading one test without running it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCheck {
    pub test_name: String,
    /// Loaded pipeline name, or the declared reference when loading failed.
    pub pipeline: String,
    /// Every problem found; empty when the test is runnable.
    pub problems: Vec<String>,
}

impl TestCheck {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}
