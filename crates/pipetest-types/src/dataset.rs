//! Data-set definitions and schema types.
//!
//! A [`DataSetDefinition`] names a reusable, schema-typed collection of
//! rows. The `backend` key selects the factory that knows how to read it
//! (a JSON-lines file, an Arrow IPC file, a `SQLite` table, ...), and
//! `location` / `table` tell that factory where the rows live.

use crate::field::FieldType;
use serde::{Deserialize, Serialize};

/// Field definition within a data-set schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Field name as seen by pipelines and comparisons.
    pub name: String,
    /// Semantic type used for equality and ordering.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Backing column name, when it differs from `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl FieldSchema {
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            column: None,
        }
    }

    /// Name of the column holding this field in the backing store.
    #[must_use]
    pub fn column_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

/// A named data set registered in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSetDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Factory key, e.g. `"jsonl"`, `"arrow"` or `"sqlite"`.
    pub backend: String,
    /// File path or database path, interpreted by the factory.
    pub location: String,
    /// Table name for table-backed data sets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Ordered schema.
    pub fields: Vec<FieldSchema>,
}

impl DataSetDefinition {
    /// Look up a declared field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Names in `requested` that the schema does not declare, in request order.
    #[must_use]
    pub fn missing_fields(&self, requested: &[String]) -> Vec<String> {
        requested
            .iter()
            .filter(|name| self.field(name).is_none())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customers() -> DataSetDefinition {
        DataSetDefinition {
            name: "customers".into(),
            description: None,
            backend: "jsonl".into(),
            location: "customers.jsonl".into(),
            table: None,
            fields: vec![
                FieldSchema::new("id", FieldType::Integer),
                FieldSchema {
                    name: "name".into(),
                    field_type: FieldType::String,
                    column: Some("customer_name".into()),
                },
            ],
        }
    }

    #[test]
    fn column_name_falls_back_to_field_name() {
        let ds = customers();
        assert_eq!(ds.fields[0].column_name(), "id");
        assert_eq!(ds.fields[1].column_name(), "customer_name");
    }

    #[test]
    fn missing_fields_preserves_request_order() {
        let ds = customers();
        let missing = ds.missing_fields(&["zip".into(), "id".into(), "city".into()]);
        assert_eq!(missing, vec!["zip".to_string(), "city".to_string()]);
    }

    #[test]
    fn yaml_shape_uses_type_key() {
        let json = serde_json::to_value(&customers()).unwrap();
        assert_eq!(json["fields"][0]["type"], "integer");
        assert!(json.get("table").is_none());
        assert!(json["fields"][0].get("column").is_none());
    }
}
