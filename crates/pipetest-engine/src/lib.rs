//! Unit-test execution and validation engine for data pipelines.

pub mod arrow_utils;
pub mod check;
pub mod command;
pub mod compare;
pub mod config;
pub mod errors;
pub mod execution;
pub mod host;
pub mod jsonl;
pub mod loader;
pub mod pipeline;
pub mod resolve;
pub mod result;
pub mod runner;
pub mod sink;
pub mod validate;
pub mod vars;

// Re-export public API for convenience
pub use errors::{ResolutionError, TestError};
pub use execution::{
    CompletedRun, ExecutionCoordinator, PipelineEngine, RunHandle, RunSettings, StopHandle,
};
pub use host::{CatalogTestHost, PipelineIdentity, TestHost};
pub use loader::{PipelineLoader, PreparedPipeline};
pub use resolve::{DataSetFactory, FactoryHierarchy, LocationResolver};
pub use result::{RunSummary, TestCheck};
pub use runner::{RunnerContext, RunnerOptions, TestRunner};
pub use sink::{JsonLinesSink, ResultSink};
pub use validate::Validator;
