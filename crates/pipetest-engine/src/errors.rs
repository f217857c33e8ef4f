//! Test error model.
//!
//! [`TestError`] is the per-test failure taxonomy. Only
//! [`TestError::Configuration`] and [`TestError::Output`] abort a whole
//! batch; every other variant is caught at the test boundary and turned
//! into one error record.

use std::time::Duration;

use pipetest_catalog::CatalogError;

/// Failures raised while driving one test, or while initializing a batch.
#[derive(Debug, thiserror::Error)]
pub enum TestError {
    /// Pre-run precondition failure. Fatal: no test is attempted.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(
        "unit test '{test}' does not reference a pipeline \
         (set pipeline_file, pipeline_object_id or pipeline_repository_path)"
    )]
    MissingReference { test: String },

    #[error("unable to resolve pipeline file '{file}' relative to base path '{base}'")]
    PathResolution {
        file: String,
        base: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("unit test '{test}' references pipeline {reference} but no repository is connected")]
    NoRepository { test: String, reference: String },

    #[error("failed to load pipeline {reference}")]
    Load {
        reference: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("pipeline '{pipeline}' could not be executed")]
    Execution {
        pipeline: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("pipeline '{pipeline}' did not finish within {timeout:?} and was stopped")]
    Timeout { pipeline: String, timeout: Duration },

    #[error("failed to emit result records")]
    Output(#[source] anyhow::Error),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl TestError {
    /// Returns `true` if this error must abort the whole batch.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Output(_))
    }

    /// The error and its whole source chain, joined with `": "`.
    ///
    /// Used as the comment of error records.
    #[must_use]
    pub fn report(&self) -> String {
        report_chain(self)
    }
}

/// Failures resolving a binding to a data set, or a step in a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("data set '{0}' not found")]
    DataSetNotFound(String),

    #[error("data set '{data_set}' does not declare field(s): {}", missing.join(", "))]
    SchemaMismatch {
        data_set: String,
        missing: Vec<String>,
    },

    #[error("step '{step}' bound to data set '{data_set}' does not exist in pipeline '{pipeline}'")]
    UnknownStep {
        pipeline: String,
        step: String,
        data_set: String,
    },

    #[error("data set '{data_set}' uses unknown back-end '{backend}'")]
    UnknownBackend { data_set: String, backend: String },

    #[error("failed to read data set '{data_set}'")]
    Read {
        data_set: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("catalog lookup for data set '{data_set}' failed")]
    Catalog {
        data_set: String,
        #[source]
        source: CatalogError,
    },
}

/// Render an error followed by each of its sources.
pub(crate) fn report_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configuration_and_output_are_fatal() {
        assert!(TestError::Configuration("missing field".into()).is_fatal());
        assert!(TestError::Output(anyhow::anyhow!("closed")).is_fatal());
        assert!(!TestError::MissingReference { test: "t".into() }.is_fatal());
        let timeout = TestError::Timeout {
            pipeline: "p".into(),
            timeout: Duration::from_secs(5),
        };
        assert!(!timeout.is_fatal());
        assert_eq!(
            timeout.to_string(),
            "pipeline 'p' did not finish within 5s and was stopped"
        );
    }

    #[test]
    fn report_includes_source_chain() {
        let root = anyhow::anyhow!("No such file or directory").context("open orders.yaml");
        let err = TestError::PathResolution {
            file: "orders.yaml".into(),
            base: "/tmp/base".into(),
            source: root,
        };
        let report = err.report();
        assert!(report.starts_with("unable to resolve pipeline file 'orders.yaml'"));
        assert!(report.contains(": open orders.yaml"), "got: {report}");
        assert!(report.ends_with("No such file or directory"), "got: {report}");
    }

    #[test]
    fn resolution_errors_are_transparent() {
        let err = TestError::from(ResolutionError::SchemaMismatch {
            data_set: "golden".into(),
            missing: vec!["a".into(), "b".into()],
        });
        assert_eq!(
            err.to_string(),
            "data set 'golden' does not declare field(s): a, b"
        );
    }
}
