//! Catalog trait definition.
//!
//! [`TestCatalog`] is the typed registry the engine consults for unit
//! tests and data sets. Model types live in [`pipetest_types`].

use pipetest_types::{DataSetDefinition, TestCategory, TestDefinition};

use crate::error;

/// Name and category of a registered test, as returned by listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestEntry {
    pub name: String,
    pub category: TestCategory,
}

/// Lookup-by-name and list-all contract over test and data-set definitions.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn TestCatalog>`.
/// Every call reflects the current backing store; callers never cache.
pub trait TestCatalog: Send + Sync {
    /// Load a test definition by name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::TestNotFound`](crate::CatalogError::TestNotFound)
    /// when no test has that name, or a storage error.
    fn get_test(&self, name: &str) -> error::Result<TestDefinition>;

    /// Every registered test, in catalog listing order.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`](crate::CatalogError) on storage failure.
    fn list_test_entries(&self) -> error::Result<Vec<TestEntry>>;

    /// Test names in listing order, optionally restricted to one category.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`](crate::CatalogError) on storage failure.
    fn list_tests(&self, category: Option<TestCategory>) -> error::Result<Vec<String>> {
        Ok(self
            .list_test_entries()?
            .into_iter()
            .filter(|entry| category.map_or(true, |c| entry.category == c))
            .map(|entry| entry.name)
            .collect())
    }

    /// Load a data-set definition by name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::DataSetNotFound`](crate::CatalogError::DataSetNotFound)
    /// when no data set has that name, or a storage error.
    fn get_data_set(&self, name: &str) -> error::Result<DataSetDefinition>;

    /// Every registered data-set name, in listing order.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`](crate::CatalogError) on storage failure.
    fn list_data_sets(&self) -> error::Result<Vec<String>>;
}
