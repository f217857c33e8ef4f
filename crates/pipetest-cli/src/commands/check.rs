use std::path::Path;

use anyhow::Result;
use pipetest_engine::{RunnerContext, RunnerOptions, TestCheck, TestRunner};

use super::Plan;
use crate::Selection;

/// Execute the `check` command: load every selected test without running it.
pub async fn execute(config_path: &Path, selection: Selection) -> Result<()> {
    let config = super::load_config(config_path)?;
    let context = RunnerContext::from_config(&config)?;
    let mut options = RunnerOptions::from_config(&config.runner);
    if let Some(category) = selection.category {
        options.category = Some(category);
    }
    if let Some(field) = &selection.test_field {
        options.test_name_field = Some(field.clone());
    }
    let runner = TestRunner::new(context, options);

    let checks = match super::plan(&runner, &selection)? {
        Plan::Names(names) => {
            let catalog = runner.context().catalog.clone();
            let loader = runner.loader();
            tokio::task::spawn_blocking(move || {
                pipetest_engine::check::check_tests(&catalog, &loader, &names)
            })
            .await?
        }
        Plan::Select(input) => runner.check(input).await?,
    };

    for check in &checks {
        print_check(check);
    }

    let failed = checks.iter().filter(|c| !c.is_ok()).count();
    if failed == 0 {
        println!("\nAll {} test(s) passed checks.", checks.len());
        Ok(())
    } else {
        anyhow::bail!("{failed} of {} test(s) failed checks", checks.len())
    }
}

fn print_check(check: &TestCheck) {
    let status = if check.is_ok() { "OK" } else { "FAILED" };
    println!("{:32} {}", format!("{} ({}):", check.test_name, check.pipeline), status);
    for problem in &check.problems {
        println!("  {problem}");
    }
}
