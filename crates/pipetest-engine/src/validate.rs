//! Golden comparison of captured step output.

use std::cmp::Ordering;

use pipetest_types::{Binding, FieldType, ResultRecord, RowSet};

use crate::compare::{coerce, compare_values, values_equal};
use crate::errors::report_chain;
use crate::execution::CompletedRun;
use crate::loader::PreparedPipeline;
use crate::resolve::LocationResolver;

/// Compares a finished run against the test's golden bindings.
#[derive(Clone)]
pub struct Validator {
    resolver: LocationResolver,
}

impl Validator {
    #[must_use]
    pub fn new(resolver: LocationResolver) -> Self {
        Self { resolver }
    }

    /// One record per golden binding, in declaration order.
    ///
    /// A test without golden bindings yields a single passing record with
    /// no data-set or step context.
    #[must_use]
    pub fn validate(&self, pipeline: &PreparedPipeline, run: &CompletedRun) -> Vec<ResultRecord> {
        let pipeline_name = pipeline.pipeline_name();
        let test_name = pipeline.test_name();

        if pipeline.goldens().is_empty() {
            return vec![ResultRecord {
                pipeline_name: pipeline_name.to_string(),
                test_name: Some(test_name.to_string()),
                data_set_name: None,
                step_name: None,
                error: false,
                comment: Some("No golden data sets to validate".to_string()),
            }];
        }

        pipeline
            .goldens()
            .iter()
            .map(|binding| {
                let outcome = self.check_binding(binding, run);
                tracing::debug!(
                    test = test_name,
                    step = binding.step,
                    data_set = binding.data_set,
                    passed = outcome.is_ok(),
                    "Golden binding compared"
                );
                match outcome {
                    Ok(comment) => ResultRecord::passed(
                        pipeline_name,
                        test_name,
                        &binding.data_set,
                        &binding.step,
                        comment,
                    ),
                    Err(comment) => ResultRecord::failed(
                        pipeline_name,
                        test_name,
                        &binding.data_set,
                        &binding.step,
                        comment,
                    ),
                }
            })
            .collect()
    }

    /// `Ok(comment)` on a match, `Err(comment)` describing the first problem.
    fn check_binding(&self, binding: &Binding, run: &CompletedRun) -> Result<String, String> {
        let golden = self
            .resolver
            .resolve(binding, &binding.order_by)
            .map_err(|e| report_chain(&e))?;

        let captured = match run.captured_rows(&binding.step) {
            Ok(Some(rows)) => rows,
            Ok(None) => {
                return Err(format!(
                    "No output was captured for step '{}'",
                    binding.step
                ))
            }
            Err(e) => {
                return Err(format!(
                    "Unable to read output of step '{}': {e:#}",
                    binding.step
                ))
            }
        };

        let mut expected = golden.rows;
        let mut actual = project(&expected, &captured).map_err(|missing| {
            format!(
                "Output of step '{}' is missing field(s) declared by golden data set '{}': {}",
                binding.step,
                binding.data_set,
                missing.join(", ")
            )
        })?;

        let keys: Vec<(usize, FieldType)> = binding
            .order_by
            .iter()
            .filter_map(|name| {
                expected
                    .index_of(name)
                    .map(|idx| (idx, expected.fields[idx].field_type))
            })
            .collect();
        sort_rows(&mut expected, &keys);
        sort_rows(&mut actual, &keys);

        if expected.len() != actual.len() {
            return Err(format!(
                "Incorrect number of rows received from step '{}': expected {}, got {}",
                binding.step,
                expected.len(),
                actual.len()
            ));
        }

        for (row_idx, (want, got)) in expected.rows.iter().zip(&actual.rows).enumerate() {
            for (field, (w, g)) in expected.fields.iter().zip(want.iter().zip(got)) {
                if !values_equal(field.field_type, w, g) {
                    return Err(format!(
                        "Validation error at row {}, field '{}': expected '{w}', got '{g}'",
                        row_idx + 1,
                        field.name
                    ));
                }
            }
        }

        Ok(format!(
            "Test passed successfully against golden data set '{}'",
            binding.data_set
        ))
    }
}

/// Project `actual` onto the golden schema, coercing each cell to the
/// golden field type. Extra actual fields are dropped.
///
/// An `actual` set without rows projects to an empty set with the golden
/// schema: a capture with no rows carries no field information.
///
/// Returns the golden field names absent from `actual` on failure.
pub fn project(golden: &RowSet, actual: &RowSet) -> Result<RowSet, Vec<String>> {
    if actual.is_empty() {
        return Ok(RowSet::new(golden.fields.clone()));
    }
    let mut positions = Vec::with_capacity(golden.fields.len());
    let mut missing = Vec::new();
    for field in &golden.fields {
        match actual.index_of(&field.name) {
            Some(idx) => positions.push(idx),
            None => missing.push(field.name.clone()),
        }
    }
    if !missing.is_empty() {
        return Err(missing);
    }

    let mut projected = actual.select(&positions);
    projected.fields.clone_from(&golden.fields);
    for row in &mut projected.rows {
        for (cell, field) in row.iter_mut().zip(&golden.fields) {
            *cell = coerce(field.field_type, std::mem::take(cell));
        }
    }
    Ok(projected)
}

/// Stable sort on `(position, type)` keys, nulls first.
pub fn sort_rows(rows: &mut RowSet, keys: &[(usize, FieldType)]) {
    if keys.is_empty() {
        return;
    }
    rows.rows.sort_by(|a, b| {
        keys.iter()
            .map(|&(idx, ty)| compare_values(ty, &a[idx], &b[idx]))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}
