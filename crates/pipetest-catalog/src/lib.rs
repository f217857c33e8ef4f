//! Test and data-set catalogs for pipetest.
//!
//! Provides the [`TestCatalog`] trait plus in-memory, YAML-directory and
//! [`SqliteCatalog`] implementations.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod dir;
pub mod error;
pub mod memory;
pub mod sqlite;

pub use backend::{TestCatalog, TestEntry};
pub use dir::YamlDirCatalog;
pub use error::{CatalogError, Result};
pub use memory::InMemoryCatalog;
pub use sqlite::SqliteCatalog;
