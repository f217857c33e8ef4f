//! Semantic field types for data-set schemas.
//!
//! A [`FieldType`] tells the comparison layer how two values of a field
//! should be judged equal. It is coarser than any storage type: a JSON
//! number, an Arrow `Float32` and a `SQLite` `REAL` column
//! all map to [`FieldType::Number`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Semantic type of a data-set field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    /// Floating point; compared with a tolerance.
    Number,
    /// Arbitrary-precision decimal carried as text.
    BigNumber,
    Boolean,
    Date,
    Timestamp,
    Binary,
}

impl FieldType {
    /// Returns the canonical string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::BigNumber => "big_number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
            Self::Binary => "binary",
        }
    }

    /// Whether values of this type are compared with a numeric tolerance.
    #[must_use]
    pub fn is_floating(self) -> bool {
        matches!(self, Self::Number)
    }

    /// Whether values of this type sort numerically.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Number | Self::BigNumber)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown field type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown field type '{0}'")]
pub struct UnknownFieldType(pub String);

impl FromStr for FieldType {
    type Err = UnknownFieldType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" => Ok(Self::String),
            "integer" => Ok(Self::Integer),
            "number" => Ok(Self::Number),
            "big_number" | "bignumber" => Ok(Self::BigNumber),
            "boolean" => Ok(Self::Boolean),
            "date" => Ok(Self::Date),
            "timestamp" => Ok(Self::Timestamp),
            "binary" => Ok(Self::Binary),
            _ => Err(UnknownFieldType(s.to_string())),
        }
    }
}
