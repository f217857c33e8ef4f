//! Shared helpers for runner integration tests: a scripted in-process
//! pipeline engine and a throwaway workspace of pipelines and data sets.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pipetest_catalog::InMemoryCatalog;
use pipetest_engine::{
    FactoryHierarchy, PipelineEngine, PreparedPipeline, RunHandle, RunSettings, RunnerContext,
    StopHandle,
};
use pipetest_types::{
    Binding, DataSetDefinition, FieldSchema, FieldType, RowSet, TestCategory, TestDefinition, Value,
};
use tempfile::TempDir;

/// How the scripted engine behaves for one test.
#[derive(Debug, Clone, Default)]
pub struct Behaviour {
    pub errors: u64,
    pub log: String,
    pub delay: Duration,
    pub fail_start: bool,
    /// Rows written to every capture step instead of the first fixture.
    pub output: Option<RowSet>,
}

/// Engine that copies the first fixture to every capture step, unless a
/// behaviour for the running test says otherwise.
#[derive(Default)]
pub struct ScriptedEngine {
    behaviours: Mutex<HashMap<String, Behaviour>>,
    started: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn behave(&self, test: &str, behaviour: Behaviour) {
        self.behaviours
            .lock()
            .unwrap()
            .insert(test.to_string(), behaviour);
    }

    /// Test names in the order their runs were started.
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

impl PipelineEngine for ScriptedEngine {
    fn start(
        &self,
        pipeline: &PreparedPipeline,
        _settings: &RunSettings,
    ) -> anyhow::Result<Box<dyn RunHandle>> {
        let test = pipeline.test_name().to_string();
        self.started.lock().unwrap().push(test.clone());
        let behaviour = self
            .behaviours
            .lock()
            .unwrap()
            .get(&test)
            .cloned()
            .unwrap_or_default();
        if behaviour.fail_start {
            anyhow::bail!("engine rejected pipeline '{}'", pipeline.pipeline_name());
        }

        let rows = behaviour
            .output
            .clone()
            .or_else(|| pipeline.fixtures.first().map(|f| f.rows.clone()));
        let captures = pipeline
            .capture_steps()
            .into_iter()
            .filter_map(|step| rows.clone().map(|r| (step.to_string(), r)))
            .collect();
        Ok(Box::new(ScriptedRun {
            behaviour,
            captures,
            stop: StopHandle::new(),
        }))
    }
}

pub struct ScriptedRun {
    behaviour: Behaviour,
    captures: HashMap<String, RowSet>,
    stop: StopHandle,
}

impl RunHandle for ScriptedRun {
    fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    fn wait(&mut self) -> anyhow::Result<()> {
        let deadline = Instant::now() + self.behaviour.delay;
        while Instant::now() < deadline {
            if self.stop.is_stopped() {
                anyhow::bail!("stopped");
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }

    fn error_count(&self) -> u64 {
        self.behaviour.errors
    }

    fn log_text(&self) -> String {
        self.behaviour.log.clone()
    }

    fn captured_rows(&self, step: &str) -> anyhow::Result<Option<RowSet>> {
        Ok(self.captures.get(step).cloned())
    }
}

pub const TOTALS_PIPELINE: &str = "\
name: totals
steps:
  - name: read orders
    type: input
  - name: sum
    type: group_by
  - name: out
    type: output
hops:
  - from: read orders
    to: sum
  - from: sum
    to: out
";

pub fn order_fields() -> Vec<FieldSchema> {
    vec![
        FieldSchema::new("customer", FieldType::String),
        FieldSchema::new("amount", FieldType::Number),
    ]
}

/// Rows matching `orders.jsonl`.
pub fn order_rows() -> Vec<Vec<Value>> {
    vec![
        vec![Value::from("ann"), Value::Number(12.5)],
        vec![Value::from("bo"), Value::Number(3.0)],
    ]
}

/// Temporary directory holding `pipelines/totals.yaml`, `orders.jsonl`
/// and `golden.jsonl`, plus a catalog builder pointing at it.
pub struct Workspace {
    pub dir: TempDir,
    pub catalog: InMemoryCatalog,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pipelines")).unwrap();
        std::fs::write(dir.path().join("pipelines/totals.yaml"), TOTALS_PIPELINE).unwrap();
        let lines = "{\"customer\": \"ann\", \"amount\": 12.5}\n{\"customer\": \"bo\", \"amount\": 3}\n";
        std::fs::write(dir.path().join("orders.jsonl"), lines).unwrap();
        std::fs::write(dir.path().join("golden.jsonl"), lines).unwrap();

        let mut catalog = InMemoryCatalog::new();
        for (name, location) in [("orders", "orders.jsonl"), ("golden", "golden.jsonl")] {
            catalog
                .add_data_set(DataSetDefinition {
                    name: name.into(),
                    description: None,
                    backend: "jsonl".into(),
                    location: location.into(),
                    table: None,
                    fields: order_fields(),
                })
                .unwrap();
        }
        Self { dir, catalog }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A passing test against the totals pipeline.
    pub fn totals_test(&self, name: &str, category: TestCategory) -> TestDefinition {
        TestDefinition {
            name: name.into(),
            category,
            pipeline_file: Some("pipelines/totals.yaml".into()),
            base_path: Some(self.path().display().to_string()),
            inputs: vec![Binding::new("read orders", "orders")],
            goldens: vec![Binding::new("out", "golden")],
            ..TestDefinition::default()
        }
    }

    pub fn add(&mut self, test: TestDefinition) {
        self.catalog.add_test(test).unwrap();
    }

    pub fn context(self, engine: Arc<ScriptedEngine>) -> (TempDir, RunnerContext) {
        let factories = Arc::new(FactoryHierarchy::with_defaults(self.dir.path()));
        let context =
            RunnerContext::new(Arc::new(self.catalog), factories).with_engine(engine);
        (self.dir, context)
    }
}

pub fn names_input(field: &str, names: &[&str]) -> RowSet {
    RowSet::new(vec![FieldSchema::new(field, FieldType::String)])
        .with_rows(names.iter().map(|n| vec![Value::from(*n)]).collect())
}
