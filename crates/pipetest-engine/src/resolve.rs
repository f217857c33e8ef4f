//! Data-set binding resolution.
//!
//! A [`LocationResolver`] turns a [`Binding`] into rows: it looks the data
//! set up in the catalog, checks the requested fields against the declared
//! schema, and reads the rows through the [`DataSetFactory`] registered for
//! the data set's back-end in a [`FactoryHierarchy`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use pipetest_catalog::{CatalogError, TestCatalog};
use pipetest_types::{Binding, DataSetDefinition, FieldSchema, FieldType, RowSet, Value};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

use crate::arrow_utils;
use crate::compare::coerce;
use crate::errors::ResolutionError;
use crate::jsonl;

/// Reads the rows of data sets stored in one kind of back-end.
pub trait DataSetFactory: Send + Sync {
    /// Back-end key this factory serves, matched against
    /// [`DataSetDefinition::backend`].
    fn backend(&self) -> &str;

    /// Read every row, shaped by the definition's declared fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn read(&self, definition: &DataSetDefinition) -> Result<RowSet>;
}

/// Back-end key → factory registry. A child hierarchy falls back to its
/// parent for back-ends it does not register itself.
#[derive(Default, Clone)]
pub struct FactoryHierarchy {
    factories: HashMap<String, Arc<dyn DataSetFactory>>,
    parent: Option<Arc<FactoryHierarchy>>,
}

impl FactoryHierarchy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in `jsonl`, `arrow` and `sqlite` factories, resolving
    /// relative locations against `base_dir`.
    #[must_use]
    pub fn with_defaults(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let mut hierarchy = Self::new();
        hierarchy.register(Arc::new(JsonLinesFactory::new(base_dir.clone())));
        hierarchy.register(Arc::new(ArrowIpcFactory::new(base_dir.clone())));
        hierarchy.register(Arc::new(SqliteTableFactory::new(base_dir)));
        hierarchy
    }

    /// An empty hierarchy that delegates unknown back-ends to `parent`.
    #[must_use]
    pub fn child_of(parent: Arc<FactoryHierarchy>) -> Self {
        Self {
            factories: HashMap::new(),
            parent: Some(parent),
        }
    }

    /// Register (or replace) the factory for its back-end key.
    pub fn register(&mut self, factory: Arc<dyn DataSetFactory>) {
        self.factories
            .insert(factory.backend().to_string(), factory);
    }

    #[must_use]
    pub fn get(&self, backend: &str) -> Option<Arc<dyn DataSetFactory>> {
        self.factories
            .get(backend)
            .cloned()
            .or_else(|| self.parent.as_ref().and_then(|p| p.get(backend)))
    }

    /// Registered back-end keys, own keys first, sorted within each level.
    #[must_use]
    pub fn backends(&self) -> Vec<String> {
        let mut own: Vec<String> = self.factories.keys().cloned().collect();
        own.sort();
        if let Some(parent) = &self.parent {
            for key in parent.backends() {
                if !own.contains(&key) {
                    own.push(key);
                }
            }
        }
        own
    }
}

/// A binding resolved to its definition and rows.
#[derive(Debug, Clone)]
pub struct ResolvedDataSet {
    pub binding: Binding,
    pub definition: DataSetDefinition,
    pub rows: RowSet,
}

/// Resolves bindings to rows. Read-only; cheap to clone and share.
#[derive(Clone)]
pub struct LocationResolver {
    catalog: Arc<dyn TestCatalog>,
    factories: Arc<FactoryHierarchy>,
}

impl LocationResolver {
    #[must_use]
    pub fn new(catalog: Arc<dyn TestCatalog>, factories: Arc<FactoryHierarchy>) -> Self {
        Self { catalog, factories }
    }

    /// Look up a data-set definition by name.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::DataSetNotFound`] for unknown names.
    pub fn definition(&self, name: &str) -> Result<DataSetDefinition, ResolutionError> {
        self.catalog.get_data_set(name).map_err(|e| match e {
            CatalogError::DataSetNotFound(n) => ResolutionError::DataSetNotFound(n),
            other => ResolutionError::Catalog {
                data_set: name.to_string(),
                source: other,
            },
        })
    }

    /// Resolve `binding` to rows. Every name in `requested_fields` must be
    /// declared by the data set's schema.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::DataSetNotFound`],
    /// [`ResolutionError::SchemaMismatch`], [`ResolutionError::UnknownBackend`]
    /// or [`ResolutionError::Read`].
    pub fn resolve(
        &self,
        binding: &Binding,
        requested_fields: &[String],
    ) -> Result<ResolvedDataSet, ResolutionError> {
        let definition = self.definition(&binding.data_set)?;

        let missing = definition.missing_fields(requested_fields);
        if !missing.is_empty() {
            return Err(ResolutionError::SchemaMismatch {
                data_set: definition.name,
                missing,
            });
        }

        let factory =
            self.factories
                .get(&definition.backend)
                .ok_or_else(|| ResolutionError::UnknownBackend {
                    data_set: definition.name.clone(),
                    backend: definition.backend.clone(),
                })?;

        let rows = factory.read(&definition).map_err(|source| {
            tracing::warn!(
                data_set = definition.name,
                backend = definition.backend,
                error = %source,
                "Data set read failed"
            );
            ResolutionError::Read {
                data_set: definition.name.clone(),
                source,
            }
        })?;

        tracing::debug!(
            step = binding.step,
            data_set = definition.name,
            rows = rows.len(),
            "Resolved data set binding"
        );

        Ok(ResolvedDataSet {
            binding: binding.clone(),
            definition,
            rows,
        })
    }
}

fn resolve_location(base_dir: &Path, location: &str) -> PathBuf {
    let path = Path::new(location);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// File-backed data sets stored as JSON lines.
pub struct JsonLinesFactory {
    base_dir: PathBuf,
}

impl JsonLinesFactory {
    #[must_use]
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }
}

impl DataSetFactory for JsonLinesFactory {
    fn backend(&self) -> &str {
        "jsonl"
    }

    fn read(&self, definition: &DataSetDefinition) -> Result<RowSet> {
        let path = resolve_location(&self.base_dir, &definition.location);
        jsonl::read_rows(&path, &definition.fields)
    }
}

/// File-backed data sets stored as an Arrow IPC stream.
pub struct ArrowIpcFactory {
    base_dir: PathBuf,
}

impl ArrowIpcFactory {
    #[must_use]
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }
}

impl DataSetFactory for ArrowIpcFactory {
    fn backend(&self) -> &str {
        "arrow"
    }

    fn read(&self, definition: &DataSetDefinition) -> Result<RowSet> {
        let path = resolve_location(&self.base_dir, &definition.location);
        let batches = arrow_utils::read_ipc_file(&path)?;
        arrow_utils::batches_to_rows(&batches, &definition.fields)
    }
}

/// Table-backed data sets in a `SQLite` database file.
pub struct SqliteTableFactory {
    base_dir: PathBuf,
}

impl SqliteTableFactory {
    #[must_use]
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn sqlite_cell(raw: ValueRef<'_>, field_type: FieldType) -> Value {
    let value = match raw {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Number(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(b.iter().map(|byte| format!("{byte:02x}")).collect()),
    };
    coerce(field_type, value)
}

impl DataSetFactory for SqliteTableFactory {
    fn backend(&self) -> &str {
        "sqlite"
    }

    fn read(&self, definition: &DataSetDefinition) -> Result<RowSet> {
        let table = definition
            .table
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .with_context(|| format!("Data set '{}' has no table", definition.name))?;
        let path = resolve_location(&self.base_dir, &definition.location);
        let conn = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;

        let columns: Vec<String> = definition
            .fields
            .iter()
            .map(|f| quote_ident(f.column_name()))
            .collect();
        let sql = format!("SELECT {} FROM {}", columns.join(", "), quote_ident(table));
        let mut stmt = conn
            .prepare(&sql)
            .with_context(|| format!("Failed to query table '{table}'"))?;

        let fields: &[FieldSchema] = &definition.fields;
        let rows = stmt
            .query_map([], |row| {
                fields
                    .iter()
                    .enumerate()
                    .map(|(i, f)| Ok(sqlite_cell(row.get_ref(i)?, f.field_type)))
                    .collect::<rusqlite::Result<Vec<Value>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Failed to read table '{table}'"))?;

        Ok(RowSet::new(definition.fields.clone()).with_rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipetest_catalog::InMemoryCatalog;
    use tempfile::tempdir;

    fn data_set(name: &str, backend: &str, location: &str) -> DataSetDefinition {
        DataSetDefinition {
            name: name.into(),
            description: None,
            backend: backend.into(),
            location: location.into(),
            table: None,
            fields: vec![
                FieldSchema::new("id", FieldType::Integer),
                FieldSchema::new("name", FieldType::String),
            ],
        }
    }

    fn resolver(base: &Path, defs: Vec<DataSetDefinition>) -> LocationResolver {
        let mut catalog = InMemoryCatalog::new();
        for def in defs {
            catalog.add_data_set(def).unwrap();
        }
        LocationResolver::new(
            Arc::new(catalog),
            Arc::new(FactoryHierarchy::with_defaults(base)),
        )
    }

    #[test]
    fn resolves_jsonl_relative_to_base_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("people.jsonl"),
            "{\"id\": 1, \"name\": \"ann\"}\n{\"id\": 2, \"name\": \"bo\"}\n",
        )
        .unwrap();
        let r = resolver(dir.path(), vec![data_set("people", "jsonl", "people.jsonl")]);

        let resolved = r
            .resolve(&Binding::new("read", "people"), &["name".into()])
            .unwrap();
        assert_eq!(resolved.rows.len(), 2);
        assert_eq!(resolved.rows.rows[1][1], Value::from("bo"));
        assert_eq!(resolved.binding.step, "read");
    }

    #[test]
    fn unknown_data_set_is_not_found() {
        let dir = tempdir().unwrap();
        let r = resolver(dir.path(), vec![]);
        let err = r.resolve(&Binding::new("s", "ghost"), &[]).unwrap_err();
        assert!(matches!(err, ResolutionError::DataSetNotFound(name) if name == "ghost"));
    }

    #[test]
    fn undeclared_requested_fields_are_a_schema_mismatch() {
        let dir = tempdir().unwrap();
        let r = resolver(dir.path(), vec![data_set("people", "jsonl", "people.jsonl")]);
        let err = r
            .resolve(&Binding::new("s", "people"), &["zip".into(), "id".into()])
            .unwrap_err();
        match err {
            ResolutionError::SchemaMismatch { missing, .. } => assert_eq!(missing, vec!["zip"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_backend_is_reported() {
        let dir = tempdir().unwrap();
        let r = resolver(dir.path(), vec![data_set("people", "excel", "people.xlsx")]);
        let err = r.resolve(&Binding::new("s", "people"), &[]).unwrap_err();
        assert!(matches!(err, ResolutionError::UnknownBackend { backend, .. } if backend == "excel"));
    }

    #[test]
    fn read_failures_keep_their_cause() {
        let dir = tempdir().unwrap();
        let r = resolver(dir.path(), vec![data_set("people", "jsonl", "missing.jsonl")]);
        let err = r.resolve(&Binding::new("s", "people"), &[]).unwrap_err();
        assert!(matches!(err, ResolutionError::Read { .. }));
        let chain = crate::errors::report_chain(&err);
        assert!(chain.contains("missing.jsonl"), "got: {chain}");
    }

    #[test]
    fn reads_sqlite_tables_with_column_overrides() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("fixtures.db");
        let conn = Connection::open(&db).unwrap();
        conn.execute_batch(
            "CREATE TABLE people (person_id INTEGER, full_name TEXT);
             INSERT INTO people VALUES (1, 'ann'), (2, NULL);",
        )
        .unwrap();
        drop(conn);

        let mut def = data_set("people", "sqlite", "fixtures.db");
        def.table = Some("people".into());
        def.fields[0].column = Some("person_id".into());
        def.fields[1].column = Some("full_name".into());
        let r = resolver(dir.path(), vec![def]);

        let rows = r.resolve(&Binding::new("s", "people"), &[]).unwrap().rows;
        assert_eq!(rows.rows[0], vec![Value::Integer(1), Value::from("ann")]);
        assert_eq!(rows.rows[1], vec![Value::Integer(2), Value::Null]);
    }

    #[test]
    fn reads_arrow_ipc_files() {
        let dir = tempdir().unwrap();
        let def = data_set("people", "arrow", "people.arrow");
        let rows = RowSet::new(def.fields.clone())
            .with_rows(vec![vec![Value::Integer(9), Value::from("zed")]]);
        let batch = arrow_utils::rows_to_record_batch(&rows).unwrap();
        std::fs::write(
            dir.path().join("people.arrow"),
            arrow_utils::record_batch_to_ipc(&batch).unwrap(),
        )
        .unwrap();

        let r = resolver(dir.path(), vec![def]);
        let resolved = r.resolve(&Binding::new("s", "people"), &[]).unwrap();
        assert_eq!(resolved.rows, rows);
    }

    #[test]
    fn child_hierarchy_falls_back_to_parent() {
        let parent = Arc::new(FactoryHierarchy::with_defaults("/data"));
        let child = FactoryHierarchy::child_of(parent);
        assert!(child.get("jsonl").is_some());
        assert!(child.get("excel").is_none());
        assert_eq!(child.backends(), vec!["arrow", "jsonl", "sqlite"]);
    }
}
