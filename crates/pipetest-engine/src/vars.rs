//! Run-time variables and the names the engine injects into test runs.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Name → value map of run-time variables (or parameters).
pub type Variables = BTreeMap<String, String>;

/// Default base path for relative pipeline files.
pub const BASE_PATH_VAR: &str = "PIPETEST_BASE_PATH";
/// Set to `Y` so a pipeline under test does not surface nested test failures.
pub const SUPPRESS_TEST_ERRORS_VAR: &str = "PIPETEST_SUPPRESS_TEST_ERRORS";
/// Set to `Y` on every run started by the engine.
pub const RUN_UNIT_TEST_VAR: &str = "PIPETEST_RUN_UNIT_TEST";
/// Name of the test being run.
pub const UNIT_TEST_NAME_VAR: &str = "PIPETEST_UNIT_TEST_NAME";

static VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.]*)\}|%%([A-Za-z_][A-Za-z0-9_.]*)%%")
        .expect("valid variable regex")
});

/// Replace `${NAME}` and `%%NAME%%` references.
///
/// Names are looked up in `vars` first, then in the process environment.
/// Unknown references are left untouched.
#[must_use]
pub fn substitute(input: &str, vars: &Variables) -> String {
    if !input.contains("${") && !input.contains("%%") {
        return input.to_string();
    }
    VAR_RE
        .replace_all(input, |caps: &Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map_or("", |m| m.as_str());
            vars.get(name)
                .cloned()
                .or_else(|| std::env::var(name).ok())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Layer `overrides` on top of `base`, returning the merged map.
#[must_use]
pub fn merged(base: &Variables, overrides: &Variables) -> Variables {
    let mut out = base.clone();
    out.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    out
}
