//! Dry validation of tests: load and resolve, never execute.

use std::sync::Arc;

use pipetest_catalog::TestCatalog;

use crate::errors::{report_chain, TestError};
use crate::loader::{reference_label, PipelineLoader};
use crate::result::TestCheck;

/// Check one test by name.
///
/// The pipeline is located and prepared (which resolves every input
/// binding and verifies every bound step), then every golden binding is
/// resolved. All golden problems are collected; a load failure stops the
/// check early.
#[must_use]
pub fn check_test(
    catalog: &Arc<dyn TestCatalog>,
    loader: &PipelineLoader,
    name: &str,
) -> TestCheck {
    let test = match catalog.get_test(name) {
        Ok(test) => test,
        Err(e) => {
            return TestCheck {
                test_name: name.to_string(),
                pipeline: pipetest_types::UNRESOLVED_PIPELINE.to_string(),
                problems: vec![TestError::from(e).report()],
            }
        }
    };

    let prepared = match loader.load(&test) {
        Ok(prepared) => prepared,
        Err(e) => {
            return TestCheck {
                test_name: test.name.clone(),
                pipeline: reference_label(&test),
                problems: vec![e.report()],
            }
        }
    };

    let problems = prepared
        .goldens()
        .iter()
        .filter_map(|binding| {
            loader
                .resolver()
                .resolve(binding, &binding.order_by)
                .err()
                .map(|e| {
                    format!(
                        "golden '{}' at step '{}': {}",
                        binding.data_set,
                        binding.step,
                        report_chain(&e)
                    )
                })
        })
        .collect();

    TestCheck {
        test_name: test.name,
        pipeline: prepared.pipeline_name().to_string(),
        problems,
    }
}

/// Check every test in `names`, in order.
#[must_use]
pub fn check_tests(
    catalog: &Arc<dyn TestCatalog>,
    loader: &PipelineLoader,
    names: &[String],
) -> Vec<TestCheck> {
    names
        .iter()
        .map(|name| {
            let check = check_test(catalog, loader, name);
            if check.is_ok() {
                tracing::info!(
                    test = check.test_name,
                    pipeline = check.pipeline,
                    "Test check passed"
                );
            } else {
                tracing::warn!(
                    test = check.test_name,
                    problems = check.problems.len(),
                    "Test check failed"
                );
            }
            check
        })
        .collect()
}
