use std::path::Path;

use anyhow::Result;
use pipetest_catalog::TestCatalog;
use pipetest_engine::{CatalogTestHost, RunnerContext, TestHost};
use pipetest_types::TestCategory;

/// Execute the `list` command: print catalog tests, optionally filtered.
pub fn execute(
    config_path: &Path,
    category: Option<TestCategory>,
    pipeline: Option<&str>,
    json: bool,
) -> Result<()> {
    let config = super::load_config(config_path)?;
    let context = RunnerContext::from_config(&config)?;
    let catalog = context.catalog;
    let category = category.or(config.runner.category);

    let names = match pipeline {
        Some(raw) => {
            let identity = super::parse_identity(raw)?;
            let host = CatalogTestHost::new(catalog.clone());
            host.known_tests(&identity)?
        }
        None => catalog.list_tests(None)?,
    };

    for name in names {
        let test = catalog.get_test(&name)?;
        if category.is_some_and(|c| c != test.category) {
            continue;
        }
        let reference = test
            .pipeline_reference()
            .map_or_else(|| "-".to_string(), |r| r.to_string());
        if json {
            let line = serde_json::json!({
                "name": test.name,
                "category": test.category,
                "pipeline": reference,
                "inputs": test.inputs.len(),
                "goldens": test.goldens.len(),
            });
            println!("{line}");
        } else {
            println!(
                "{:24} {:12} {:32} {} input(s), {} golden(s)",
                test.name,
                test.category.as_str(),
                reference,
                test.inputs.len(),
                test.goldens.len()
            );
        }
    }
    Ok(())
}
