//! Host-facing view of which tests belong to a pipeline.
//!
//! An editor or scheduler that owns pipelines implements [`TestHost`] to
//! answer two questions for a pipeline identity: which test is active,
//! and which tests exist. The engine only ever calls into the host.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use pipetest_catalog::{CatalogError, TestCatalog};
use pipetest_types::{PipelineReference, TestDefinition};

/// How a host identifies a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineIdentity {
    File(PathBuf),
    ObjectId(String),
    RepositoryPath(String),
}

impl PipelineIdentity {
    /// `true` when `test` references this pipeline.
    ///
    /// File references match when the identity path ends with the test's
    /// (unsubstituted) file path, so relative references match absolute
    /// identities.
    #[must_use]
    pub fn matches(&self, test: &TestDefinition) -> bool {
        match (self, test.pipeline_reference()) {
            (Self::File(path), Some(PipelineReference::File(file))) => {
                let file = Path::new(file);
                path == file || (file.is_relative() && path.ends_with(file))
            }
            (Self::ObjectId(id), Some(PipelineReference::ObjectId(other))) => id == other,
            (Self::RepositoryPath(p), Some(PipelineReference::RepositoryPath(other))) => {
                p.trim_end_matches('/') == other.trim_end_matches('/')
            }
            _ => false,
        }
    }
}

impl fmt::Display for PipelineIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::ObjectId(id) => write!(f, "object:{id}"),
            Self::RepositoryPath(path) => write!(f, "repository:{path}"),
        }
    }
}

pub trait TestHost: Send + Sync {
    /// The test currently active for `pipeline`, if any.
    fn active_test(&self, pipeline: &PipelineIdentity) -> Option<String>;

    /// Names of every test referencing `pipeline`, in catalog order.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    fn known_tests(&self, pipeline: &PipelineIdentity) -> Result<Vec<String>, CatalogError>;
}

/// [`TestHost`] answering from a catalog, with an in-process active-test map.
pub struct CatalogTestHost {
    catalog: Arc<dyn TestCatalog>,
    active: Mutex<BTreeMap<PipelineIdentity, String>>,
}

impl CatalogTestHost {
    #[must_use]
    pub fn new(catalog: Arc<dyn TestCatalog>) -> Self {
        Self {
            catalog,
            active: Mutex::new(BTreeMap::new()),
        }
    }

    /// Mark `test` as active for `pipeline`; `None` clears it.
    pub fn set_active_test(&self, pipeline: PipelineIdentity, test: Option<String>) {
        let mut active = self
            .active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match test {
            Some(name) => {
                active.insert(pipeline, name);
            }
            None => {
                active.remove(&pipeline);
            }
        }
    }
}

impl TestHost for CatalogTestHost {
    fn active_test(&self, pipeline: &PipelineIdentity) -> Option<String> {
        self.active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(pipeline)
            .cloned()
    }

    fn known_tests(&self, pipeline: &PipelineIdentity) -> Result<Vec<String>, CatalogError> {
        let mut names = Vec::new();
        for entry in self.catalog.list_test_entries()? {
            let test = self.catalog.get_test(&entry.name)?;
            if pipeline.matches(&test) {
                names.push(test.name);
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipetest_catalog::InMemoryCatalog;

    fn test(name: &str, f: impl FnOnce(&mut TestDefinition)) -> TestDefinition {
        let mut t = TestDefinition {
            name: name.into(),
            ..TestDefinition::default()
        };
        f(&mut t);
        t
    }

    fn host() -> CatalogTestHost {
        let catalog = InMemoryCatalog::new()
            .with_test(test("a", |t| t.pipeline_file = Some("pipelines/orders.yaml".into())))
            .unwrap()
            .with_test(test("b", |t| t.pipeline_object_id = Some("orders-v1".into())))
            .unwrap()
            .with_test(test("c", |t| t.pipeline_file = Some("/srv/pipelines/orders.yaml".into())))
            .unwrap()
            .with_test(test("d", |t| t.pipeline_file = Some("other.yaml".into())))
            .unwrap();
        CatalogTestHost::new(Arc::new(catalog))
    }

    #[test]
    fn known_tests_match_relative_and_absolute_files() {
        let host = host();
        let identity = PipelineIdentity::File("/srv/pipelines/orders.yaml".into());
        assert_eq!(host.known_tests(&identity).unwrap(), vec!["a", "c"]);

        let by_id = PipelineIdentity::ObjectId("orders-v1".into());
        assert_eq!(host.known_tests(&by_id).unwrap(), vec!["b"]);
    }

    #[test]
    fn active_test_can_be_set_and_cleared() {
        let host = host();
        let identity = PipelineIdentity::RepositoryPath("/sales/orders".into());
        assert_eq!(host.active_test(&identity), None);

        host.set_active_test(identity.clone(), Some("a".into()));
        assert_eq!(host.active_test(&identity).as_deref(), Some("a"));

        host.set_active_test(identity.clone(), None);
        assert_eq!(host.active_test(&identity), None);
    }
}
