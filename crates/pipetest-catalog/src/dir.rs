//! YAML directory catalog.
//!
//! Layout:
//!
//! ```text
//! <root>/tests/*.yaml       one TestDefinition per file
//! <root>/data-sets/*.yaml   one DataSetDefinition per file
//! ```
//!
//! Files are listed in file-name order and re-read on every call, so
//! edits are picked up by the next run iteration without a restart.

use std::path::{Path, PathBuf};

use pipetest_types::{DataSetDefinition, TestDefinition};
use serde::de::DeserializeOwned;

use crate::backend::{TestCatalog, TestEntry};
use crate::error::{self, CatalogError};

const TESTS_DIR: &str = "tests";
const DATA_SETS_DIR: &str = "data-sets";

/// Catalog backed by a directory of YAML definition files.
#[derive(Debug, Clone)]
pub struct YamlDirCatalog {
    root: PathBuf,
}

impl YamlDirCatalog {
    /// Open a catalog rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Io`] if `root` is not a readable directory.
    pub fn open(root: impl Into<PathBuf>) -> error::Result<Self> {
        let root = root.into();
        let meta = std::fs::metadata(&root)?;
        if !meta.is_dir() {
            return Err(CatalogError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a directory", root.display()),
            )));
        }
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn load_all<T: DeserializeOwned>(
        &self,
        sub: &str,
        kind: &'static str,
        name_of: impl Fn(&T) -> &str,
    ) -> error::Result<Vec<T>> {
        let dir = self.root.join(sub);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e == "yaml" || e == "yml")
            })
            .collect();
        paths.sort();

        let mut items: Vec<T> = Vec::with_capacity(paths.len());
        for path in paths {
            let raw = std::fs::read_to_string(&path)?;
            let item: T = serde_yaml::from_str(&raw).map_err(|e| CatalogError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            if items.iter().any(|existing| name_of(existing) == name_of(&item)) {
                return Err(CatalogError::Duplicate {
                    kind,
                    name: name_of(&item).to_string(),
                });
            }
            items.push(item);
        }
        tracing::debug!(dir = %dir.display(), count = items.len(), "Loaded {kind} definitions");
        Ok(items)
    }

    fn tests(&self) -> error::Result<Vec<TestDefinition>> {
        self.load_all(TESTS_DIR, "unit test", |t: &TestDefinition| t.name.as_str())
    }

    fn data_sets(&self) -> error::Result<Vec<DataSetDefinition>> {
        self.load_all(DATA_SETS_DIR, "data set", |d: &DataSetDefinition| {
            d.name.as_str()
        })
    }
}

impl TestCatalog for YamlDirCatalog {
    fn get_test(&self, name: &str) -> error::Result<TestDefinition> {
        self.tests()?
            .into_iter()
            .find(|t| t.name == name)
            .ok_or_else(|| CatalogError::TestNotFound(name.to_string()))
    }

    fn list_test_entries(&self) -> error::Result<Vec<TestEntry>> {
        Ok(self
            .tests()?
            .into_iter()
            .map(|t| TestEntry {
                name: t.name,
                category: t.category,
            })
            .collect())
    }

    fn get_data_set(&self, name: &str) -> error::Result<DataSetDefinition> {
        self.data_sets()?
            .into_iter()
            .find(|d| d.name == name)
            .ok_or_else(|| CatalogError::DataSetNotFound(name.to_string()))
    }

    fn list_data_sets(&self) -> error::Result<Vec<String>> {
        Ok(self.data_sets()?.into_iter().map(|d| d.name).collect())
    }
}
