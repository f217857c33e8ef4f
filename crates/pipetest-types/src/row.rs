//! Schema-typed row collections.

use serde::{Deserialize, Serialize};

use crate::dataset::FieldSchema;
use crate::value::Value;

/// One row; cells line up with [`RowSet::fields`].
pub type Row = Vec<Value>;

/// An ordered set of rows sharing one schema.
///
/// Used for data-set contents, fixture payloads, captured step output,
/// and the optional upstream source of test names.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RowSet {
    pub fields: Vec<FieldSchema>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl RowSet {
    #[must_use]
    pub fn new(fields: Vec<FieldSchema>) -> Self {
        Self {
            fields,
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    /// Position of the field called `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell at (`row`, `field`), or `None` when out of range.
    #[must_use]
    pub fn value(&self, row: usize, field: usize) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.get(field))
    }

    /// Keep only the given field positions, in the given order.
    ///
    /// Out-of-range positions yield [`Value::Null`] cells.
    #[must_use]
    pub fn select(&self, positions: &[usize]) -> Self {
        let fields = positions
            .iter()
            .filter_map(|&i| self.fields.get(i).cloned())
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                positions
                    .iter()
                    .map(|&i| row.get(i).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        Self { fields, rows }
    }
}
