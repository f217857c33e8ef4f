//! Result records, the unit of output of a test run.

use serde::{Deserialize, Serialize};

/// Pipeline name used when a failure happens before any pipeline is known.
pub const UNRESOLVED_PIPELINE: &str = "<unresolved>";

/// Output field names, in emission order.
pub const OUTPUT_FIELDS: [&str; 6] = [
    "pipelineName",
    "testName",
    "dataSetName",
    "stepName",
    "error",
    "comment",
];

/// One comparison outcome or execution-level failure.
///
/// `pipeline_name` and `error` are always set; everything else depends on
/// how far the test got before the record was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub pipeline_name: String,
    pub test_name: Option<String>,
    pub data_set_name: Option<String>,
    pub step_name: Option<String>,
    pub error: bool,
    pub comment: Option<String>,
}

impl ResultRecord {
    /// A golden binding that matched.
    #[must_use]
    pub fn passed(
        pipeline: impl Into<String>,
        test: impl Into<String>,
        data_set: impl Into<String>,
        step: impl Into<String>,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            pipeline_name: pipeline.into(),
            test_name: Some(test.into()),
            data_set_name: Some(data_set.into()),
            step_name: Some(step.into()),
            error: false,
            comment: Some(comment.into()),
        }
    }

    /// A golden binding that did not match.
    #[must_use]
    pub fn failed(
        pipeline: impl Into<String>,
        test: impl Into<String>,
        data_set: impl Into<String>,
        step: impl Into<String>,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            error: true,
            ..Self::passed(pipeline, test, data_set, step, comment)
        }
    }

    /// A test-level failure with no data-set or step context.
    #[must_use]
    pub fn test_failure(
        pipeline: impl Into<String>,
        test: Option<String>,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            pipeline_name: pipeline.into(),
            test_name: test,
            data_set_name: None,
            step_name: None,
            error: true,
            comment: Some(comment.into()),
        }
    }

    /// Diagnostic for a run that reported engine errors; carries the run log.
    #[must_use]
    pub fn run_failure(pipeline: impl Into<String>, test: impl Into<String>, log: String) -> Self {
        Self::test_failure(pipeline, Some(test.into()), log)
    }

    /// `true` when no data-set or step context is attached.
    #[must_use]
    pub fn is_test_level(&self) -> bool {
        self.data_set_name.is_none() && self.step_name.is_none()
    }
}
