//! `SQLite`-backed implementation of [`TestCatalog`].
//!
//! Uses a single `Mutex<Connection>` for thread safety. Definitions are
//! stored as JSON next to the columns listings need, and are listed in
//! first-insertion order.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use pipetest_types::{DataSetDefinition, TestCategory, TestDefinition};
use rusqlite::{Connection, OptionalExtension};

use crate::backend::{TestCatalog, TestEntry};
use crate::error::{self, CatalogError};

/// Idempotent DDL for catalog tables.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS unit_tests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    category TEXT NOT NULL,
    definition_json TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS data_sets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    backend TEXT NOT NULL,
    definition_json TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
";

/// `SQLite`-backed catalog storage.
///
/// Create with [`SqliteCatalog::open`] for file-backed persistence
/// or [`SqliteCatalog::in_memory`] for tests.
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    /// Open or create a `SQLite` catalog database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Io`] if the directory can't be created,
    /// or [`CatalogError::Sqlite`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory `SQLite` catalog (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] if the in-memory database can't
    /// be initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CatalogError::LockPoisoned)
    }

    /// Insert or replace a test definition. A replaced test keeps its
    /// listing position.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on encoding or storage failure.
    pub fn upsert_test(&self, test: &TestDefinition) -> error::Result<()> {
        let json = serde_json::to_string(test)?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO unit_tests (name, category, definition_json) VALUES (?1, ?2, ?3) \
             ON CONFLICT(name) DO UPDATE SET category = ?2, definition_json = ?3, \
             updated_at = datetime('now')",
            rusqlite::params![test.name, test.category.as_str(), json],
        )?;
        tracing::debug!(test = %test.name, "Stored unit test definition");
        Ok(())
    }

    /// Insert or replace a data-set definition.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on encoding or storage failure.
    pub fn upsert_data_set(&self, data_set: &DataSetDefinition) -> error::Result<()> {
        let json = serde_json::to_string(data_set)?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO data_sets (name, backend, definition_json) VALUES (?1, ?2, ?3) \
             ON CONFLICT(name) DO UPDATE SET backend = ?2, definition_json = ?3, \
             updated_at = datetime('now')",
            rusqlite::params![data_set.name, data_set.backend, json],
        )?;
        tracing::debug!(data_set = %data_set.name, "Stored data set definition");
        Ok(())
    }

    /// Remove a test. Returns `true` if a row was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on storage failure.
    pub fn delete_test(&self, name: &str) -> error::Result<bool> {
        let conn = self.lock_conn()?;
        let affected = conn.execute("DELETE FROM unit_tests WHERE name = ?1", [name])?;
        Ok(affected > 0)
    }

    /// Remove a data set. Returns `true` if a row was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on storage failure.
    pub fn delete_data_set(&self, name: &str) -> error::Result<bool> {
        let conn = self.lock_conn()?;
        let affected = conn.execute("DELETE FROM data_sets WHERE name = ?1", [name])?;
        Ok(affected > 0)
    }

    fn definition_json(&self, table: &str, name: &str) -> error::Result<Option<String>> {
        let conn = self.lock_conn()?;
        let sql = format!("SELECT definition_json FROM {table} WHERE name = ?1");
        Ok(conn
            .query_row(&sql, [name], |row| row.get::<_, String>(0))
            .optional()?)
    }
}

impl TestCatalog for SqliteCatalog {
    fn get_test(&self, name: &str) -> error::Result<TestDefinition> {
        let json = self
            .definition_json("unit_tests", name)?
            .ok_or_else(|| CatalogError::TestNotFound(name.to_string()))?;
        Ok(serde_json::from_str(&json)?)
    }

    fn list_test_entries(&self) -> error::Result<Vec<TestEntry>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT name, category FROM unit_tests ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (name, category) = row?;
            let category = category.parse::<TestCategory>().map_err(|e| {
                CatalogError::Parse {
                    path: format!("unit_tests/{name}"),
                    message: e.to_string(),
                }
            })?;
            entries.push(TestEntry { name, category });
        }
        Ok(entries)
    }

    fn get_data_set(&self, name: &str) -> error::Result<DataSetDefinition> {
        let json = self
            .definition_json("data_sets", name)?
            .ok_or_else(|| CatalogError::DataSetNotFound(name.to_string()))?;
        Ok(serde_json::from_str(&json)?)
    }

    fn list_data_sets(&self) -> error::Result<Vec<String>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT name FROM data_sets ORDER BY id")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}
