//! In-memory catalog.

use pipetest_types::{DataSetDefinition, TestDefinition};

use crate::backend::{TestCatalog, TestEntry};
use crate::error::{self, CatalogError};

/// A catalog held entirely in memory, listed in insertion order.
///
/// Populated up front and read-only afterwards, so it can be shared across
/// threads without locking.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    tests: Vec<TestDefinition>,
    data_sets: Vec<DataSetDefinition>,
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a test.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Duplicate`] if the name is already taken.
    pub fn add_test(&mut self, test: TestDefinition) -> error::Result<()> {
        if self.tests.iter().any(|t| t.name == test.name) {
            return Err(CatalogError::Duplicate {
                kind: "unit test",
                name: test.name,
            });
        }
        self.tests.push(test);
        Ok(())
    }

    /// Register a data set.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Duplicate`] if the name is already taken.
    pub fn add_data_set(&mut self, data_set: DataSetDefinition) -> error::Result<()> {
        if self.data_sets.iter().any(|d| d.name == data_set.name) {
            return Err(CatalogError::Duplicate {
                kind: "data set",
                name: data_set.name,
            });
        }
        self.data_sets.push(data_set);
        Ok(())
    }

    /// Builder-style [`add_test`](Self::add_test).
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Duplicate`] if the name is already taken.
    pub fn with_test(mut self, test: TestDefinition) -> error::Result<Self> {
        self.add_test(test)?;
        Ok(self)
    }

    /// Builder-style [`add_data_set`](Self::add_data_set).
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Duplicate`] if the name is already taken.
    pub fn with_data_set(mut self, data_set: DataSetDefinition) -> error::Result<Self> {
        self.add_data_set(data_set)?;
        Ok(self)
    }
}

impl TestCatalog for InMemoryCatalog {
    fn get_test(&self, name: &str) -> error::Result<TestDefinition> {
        self.tests
            .iter()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| CatalogError::TestNotFound(name.to_string()))
    }

    fn list_test_entries(&self) -> error::Result<Vec<TestEntry>> {
        Ok(self
            .tests
            .iter()
            .map(|t| TestEntry {
                name: t.name.clone(),
                category: t.category,
            })
            .collect())
    }

    fn get_data_set(&self, name: &str) -> error::Result<DataSetDefinition> {
        self.data_sets
            .iter()
            .find(|d| d.name == name)
            .cloned()
            .ok_or_else(|| CatalogError::DataSetNotFound(name.to_string()))
    }

    fn list_data_sets(&self) -> error::Result<Vec<String>> {
        Ok(self.data_sets.iter().map(|d| d.name.clone()).collect())
    }
}
