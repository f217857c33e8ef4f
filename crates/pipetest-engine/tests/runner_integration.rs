//! End-to-end runner behaviour with a scripted in-process engine.

mod common;

use std::time::Duration;

use common::{names_input, order_fields, order_rows, Behaviour, ScriptedEngine, Workspace};
use pipetest_engine::{JsonLinesSink, RunnerOptions, TestError, TestRunner};
use pipetest_types::{FieldSchema, FieldType, ResultRecord, RowSet, TestCategory, TestDefinition, Value};

fn options() -> RunnerOptions {
    RunnerOptions::default()
}

fn test_names(records: &[ResultRecord]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for record in records {
        let name = record.test_name.clone().unwrap_or_default();
        if names.last() != Some(&name) {
            names.push(name);
        }
    }
    names
}

#[tokio::test]
async fn batch_mode_emits_records_for_every_test_in_catalog_order() {
    let mut ws = Workspace::new();
    for name in ["zeta", "alpha", "mid"] {
        ws.add(ws.totals_test(name, TestCategory::Unit));
    }
    let engine = ScriptedEngine::new();
    let (_dir, context) = ws.context(engine.clone());
    let runner = TestRunner::new(context, options());

    let mut records: Vec<ResultRecord> = Vec::new();
    let summary = runner.run(None, &mut records).await.unwrap();

    assert_eq!(test_names(&records), vec!["zeta", "alpha", "mid"]);
    assert_eq!(engine.started(), vec!["zeta", "alpha", "mid"]);
    assert!(records.iter().all(|r| !r.error), "{records:#?}");
    assert!(records.iter().all(|r| r.pipeline_name == "totals"));
    assert_eq!(summary.tests_attempted, 3);
    assert!(summary.is_success());
}

#[tokio::test]
async fn category_filter_processes_only_matching_tests() {
    let mut ws = Workspace::new();
    ws.add(ws.totals_test("u1", TestCategory::Unit));
    ws.add(ws.totals_test("u2", TestCategory::Unit));
    ws.add(ws.totals_test("d1", TestCategory::Development));
    let engine = ScriptedEngine::new();
    let (_dir, context) = ws.context(engine.clone());
    let runner = TestRunner::new(
        context,
        RunnerOptions {
            category: Some(TestCategory::Unit),
            ..options()
        },
    );

    let mut records: Vec<ResultRecord> = Vec::new();
    let summary = runner.run(None, &mut records).await.unwrap();
    assert_eq!(summary.tests_attempted, 2);
    assert_eq!(engine.started(), vec!["u1", "u2"]);
}

#[tokio::test]
async fn missing_test_name_field_is_fatal_and_attempts_nothing() {
    let mut ws = Workspace::new();
    ws.add(ws.totals_test("a", TestCategory::Unit));
    let engine = ScriptedEngine::new();
    let (_dir, context) = ws.context(engine.clone());
    let runner = TestRunner::new(
        context,
        RunnerOptions {
            test_name_field: Some("unit_test".into()),
            ..options()
        },
    );

    let mut records: Vec<ResultRecord> = Vec::new();
    let err = runner
        .run(Some(names_input("name", &["a"])), &mut records)
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, TestError::Configuration(_)));
    assert!(records.is_empty());
    assert!(engine.started().is_empty());
}

#[tokio::test]
async fn stream_mode_runs_requested_tests_in_input_order() {
    let mut ws = Workspace::new();
    for name in ["A", "C", "B"] {
        ws.add(ws.totals_test(name, TestCategory::Unit));
    }
    let engine = ScriptedEngine::new();
    let (_dir, context) = ws.context(engine.clone());
    let runner = TestRunner::new(
        context,
        RunnerOptions {
            test_name_field: Some("test".into()),
            ..options()
        },
    );

    let mut records: Vec<ResultRecord> = Vec::new();
    runner
        .run(Some(names_input("test", &["B", "A"])), &mut records)
        .await
        .unwrap();
    assert_eq!(engine.started(), vec!["B", "A"]);
    assert_eq!(test_names(&records), vec!["B", "A"]);
}

#[tokio::test]
async fn unresolvable_pipeline_file_yields_one_error_record_and_batch_continues() {
    let mut ws = Workspace::new();
    let mut broken = ws.totals_test("broken", TestCategory::Unit);
    broken.pipeline_file = Some("pipelines/missing.yaml".into());
    ws.add(broken);
    ws.add(ws.totals_test("after", TestCategory::Unit));
    let engine = ScriptedEngine::new();
    let (_dir, context) = ws.context(engine.clone());
    let runner = TestRunner::new(context, options());

    let mut records: Vec<ResultRecord> = Vec::new();
    let summary = runner.run(None, &mut records).await.unwrap();

    let broken: Vec<&ResultRecord> = records
        .iter()
        .filter(|r| r.test_name.as_deref() == Some("broken"))
        .collect();
    assert_eq!(broken.len(), 1);
    assert!(broken[0].error);
    assert!(broken[0].is_test_level());
    assert_eq!(broken[0].pipeline_name, "pipelines/missing.yaml");
    let comment = broken[0].comment.as_deref().unwrap();
    assert!(comment.contains("unable to resolve pipeline file"), "got: {comment}");

    assert_eq!(engine.started(), vec!["after"]);
    assert_eq!(summary.tests_attempted, 2);
    assert_eq!(summary.failed_tests, 1);
}

#[tokio::test]
async fn missing_reference_and_unknown_test_become_records() {
    let mut ws = Workspace::new();
    ws.add(TestDefinition {
        name: "no_ref".into(),
        ..TestDefinition::default()
    });
    let engine = ScriptedEngine::new();
    let (_dir, context) = ws.context(engine);
    let runner = TestRunner::new(context, options());

    let mut records: Vec<ResultRecord> = Vec::new();
    runner
        .run_tests(vec!["no_ref".into(), "ghost".into()], &mut records)
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].pipeline_name, pipetest_types::UNRESOLVED_PIPELINE);
    assert!(records[0]
        .comment
        .as_deref()
        .unwrap()
        .contains("does not reference a pipeline"));
    assert_eq!(records[1].test_name.as_deref(), Some("ghost"));
    assert!(records[1].comment.as_deref().unwrap().contains("not found"));
}

#[tokio::test]
async fn engine_errors_produce_a_diagnostic_before_validator_records() {
    let mut ws = Workspace::new();
    ws.add(ws.totals_test("noisy", TestCategory::Unit));
    let engine = ScriptedEngine::new();
    engine.behave(
        "noisy",
        Behaviour {
            errors: 2,
            log: "step sum: division by zero".into(),
            ..Behaviour::default()
        },
    );
    let (_dir, context) = ws.context(engine);
    let runner = TestRunner::new(context, options());

    let mut records: Vec<ResultRecord> = Vec::new();
    runner.run(None, &mut records).await.unwrap();

    assert_eq!(records.len(), 2);
    assert!(records[0].error);
    assert!(records[0].is_test_level());
    assert_eq!(records[0].test_name.as_deref(), Some("noisy"));
    assert!(records[0]
        .comment
        .as_deref()
        .unwrap()
        .contains("division by zero"));
    // The golden still matches; both records are kept.
    assert_eq!(records[1].step_name.as_deref(), Some("out"));
    assert!(!records[1].error);
}

#[tokio::test]
async fn start_failure_is_reported_once() {
    let mut ws = Workspace::new();
    ws.add(ws.totals_test("rejected", TestCategory::Unit));
    let engine = ScriptedEngine::new();
    engine.behave(
        "rejected",
        Behaviour {
            fail_start: true,
            ..Behaviour::default()
        },
    );
    let (_dir, context) = ws.context(engine);
    let runner = TestRunner::new(context, options());

    let mut records: Vec<ResultRecord> = Vec::new();
    runner.run(None, &mut records).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].pipeline_name, "totals");
    assert!(records[0]
        .comment
        .as_deref()
        .unwrap()
        .contains("engine rejected pipeline 'totals'"));
}

#[tokio::test]
async fn rerunning_yields_identical_records() {
    let mut ws = Workspace::new();
    ws.add(ws.totals_test("stable", TestCategory::Unit));
    let mut failing = ws.totals_test("drifting", TestCategory::Unit);
    failing.goldens[0].order_by = vec!["customer".into()];
    ws.add(failing);
    let engine = ScriptedEngine::new();
    engine.behave(
        "drifting",
        Behaviour {
            output: Some(
                RowSet::new(order_fields())
                    .with_rows(vec![vec![Value::from("ann"), Value::Number(99.0)]]),
            ),
            ..Behaviour::default()
        },
    );
    let (_dir, context) = ws.context(engine);
    let runner = TestRunner::new(context, options());

    let mut outputs = Vec::new();
    for _ in 0..2 {
        let mut sink = JsonLinesSink::new(Vec::new());
        runner.run(None, &mut sink).await.unwrap();
        outputs.push(sink.into_inner());
    }
    assert_eq!(outputs[0], outputs[1]);
    let text = String::from_utf8(outputs.remove(0)).unwrap();
    assert!(text.contains("Incorrect number of rows received from step 'out': expected 2, got 1"));
}

#[tokio::test]
async fn extra_actual_fields_are_ignored_and_missing_fields_fail() {
    let mut ws = Workspace::new();
    ws.add(ws.totals_test("extra", TestCategory::Unit));
    ws.add(ws.totals_test("missing", TestCategory::Unit));
    let engine = ScriptedEngine::new();

    let mut wide = order_fields();
    wide.insert(0, FieldSchema::new("region", FieldType::String));
    let wide_rows = order_rows()
        .into_iter()
        .map(|mut row| {
            row.insert(0, Value::from("eu"));
            row
        })
        .collect();
    engine.behave(
        "extra",
        Behaviour {
            output: Some(RowSet::new(wide).with_rows(wide_rows)),
            ..Behaviour::default()
        },
    );
    engine.behave(
        "missing",
        Behaviour {
            output: Some(
                RowSet::new(vec![FieldSchema::new("customer", FieldType::String)])
                    .with_rows(vec![vec![Value::from("ann")], vec![Value::from("bo")]]),
            ),
            ..Behaviour::default()
        },
    );
    let (_dir, context) = ws.context(engine);
    let runner = TestRunner::new(context, options());

    let mut records: Vec<ResultRecord> = Vec::new();
    runner.run(None, &mut records).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(!records[0].error, "{:?}", records[0].comment);
    assert!(records[1].error);
    let comment = records[1].comment.as_deref().unwrap();
    assert!(comment.contains("missing field(s)"), "got: {comment}");
    assert!(comment.contains("amount"), "got: {comment}");
}

#[tokio::test]
async fn hung_run_times_out_and_the_batch_continues() {
    let mut ws = Workspace::new();
    ws.add(ws.totals_test("hung", TestCategory::Unit));
    ws.add(ws.totals_test("quick", TestCategory::Unit));
    let engine = ScriptedEngine::new();
    engine.behave(
        "hung",
        Behaviour {
            delay: Duration::from_secs(30),
            ..Behaviour::default()
        },
    );
    let (_dir, context) = ws.context(engine);
    let runner = TestRunner::new(
        context,
        RunnerOptions {
            timeout: Some(Duration::from_millis(100)),
            ..options()
        },
    );

    let mut records: Vec<ResultRecord> = Vec::new();
    runner.run(None, &mut records).await.unwrap();
    assert_eq!(test_names(&records), vec!["hung", "quick"]);
    assert!(records[0].error);
    assert!(records[0]
        .comment
        .as_deref()
        .unwrap()
        .contains("did not finish within"));
    assert!(!records[1].error);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_runs_flush_in_request_order() {
    let mut ws = Workspace::new();
    let names = ["slow", "fast", "medium", "instant"];
    for name in names {
        ws.add(ws.totals_test(name, TestCategory::Unit));
    }
    let engine = ScriptedEngine::new();
    for (name, ms) in [("slow", 300), ("fast", 10), ("medium", 100), ("instant", 0)] {
        engine.behave(
            name,
            Behaviour {
                delay: Duration::from_millis(ms),
                ..Behaviour::default()
            },
        );
    }
    let (_dir, context) = ws.context(engine);
    let runner = TestRunner::new(
        context,
        RunnerOptions {
            parallelism: 4,
            ..options()
        },
    );

    let mut records: Vec<ResultRecord> = Vec::new();
    let summary = runner.run(None, &mut records).await.unwrap();
    assert_eq!(test_names(&records), names.to_vec());
    assert_eq!(summary.tests_attempted, 4);
}
