//! Catalog error types.

/// Errors produced by [`TestCatalog`](crate::TestCatalog) operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unit test '{0}' not found in catalog")]
    TestNotFound(String),

    #[error("data set '{0}' not found in catalog")]
    DataSetNotFound(String),

    /// Two definitions of the same kind share a name.
    #[error("duplicate {kind} name '{name}'")]
    Duplicate { kind: &'static str, name: String },

    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// File-system I/O failure (e.g. reading a catalog directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A definition file could not be parsed.
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    /// A stored definition could not be encoded or decoded.
    #[error("definition encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("catalog lock poisoned")]
    LockPoisoned,
}

impl CatalogError {
    /// `true` for the two lookup misses.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TestNotFound(_) | Self::DataSetNotFound(_))
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, CatalogError>;
