//! JSON-lines reading and writing of row sets.
//!
//! One JSON object per line, keyed by column name. Blank lines are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use pipetest_types::{FieldSchema, FieldType, RowSet, Value};
use serde_json::{Map, Number};

use crate::compare::coerce;

type JsonObject = Map<String, serde_json::Value>;

/// Convert a JSON value to a cell. Nested arrays and objects become their
/// JSON text.
#[must_use]
pub fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Number))
            .unwrap_or(Value::Null),
        serde_json::Value::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

/// Convert a cell to JSON. Non-finite floats become `null`.
#[must_use]
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => serde_json::Value::Number((*i).into()),
        Value::Number(n) => {
            Number::from_f64(*n).map_or(serde_json::Value::Null, serde_json::Value::Number)
        }
        Value::String(s) => serde_json::Value::String(s.clone()),
    }
}

/// Read every object of a JSON-lines file.
///
/// # Errors
///
/// Returns an error naming the line if a line is not a JSON object.
pub fn read_objects(path: &Path) -> Result<Vec<JsonObject>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open JSON-lines file: {}", path.display()))?;
    let mut objects = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed: serde_json::Value = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid JSON", path.display(), idx + 1))?;
        match parsed {
            serde_json::Value::Object(obj) => objects.push(obj),
            _ => anyhow::bail!("{}:{}: expected a JSON object", path.display(), idx + 1),
        }
    }
    Ok(objects)
}

/// Read a JSON-lines file into rows shaped by `fields`. Absent keys read as null.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_rows(path: &Path, fields: &[FieldSchema]) -> Result<RowSet> {
    let rows = read_objects(path)?
        .iter()
        .map(|obj| {
            fields
                .iter()
                .map(|f| {
                    let raw = obj.get(f.column_name()).map_or(Value::Null, json_to_value);
                    coerce(f.field_type, raw)
                })
                .collect()
        })
        .collect();
    Ok(RowSet::new(fields.to_vec()).with_rows(rows))
}

fn infer_type(value: &Value) -> Option<FieldType> {
    match value {
        Value::Null => None,
        Value::Boolean(_) => Some(FieldType::Boolean),
        Value::Integer(_) => Some(FieldType::Integer),
        Value::Number(_) => Some(FieldType::Number),
        Value::String(_) => Some(FieldType::String),
    }
}

/// Read a JSON-lines file whose schema is not declared.
///
/// Fields appear in the order they are first encountered; each takes the
/// type of its first non-null value (string when always null).
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_untyped_rows(path: &Path) -> Result<RowSet> {
    let objects = read_objects(path)?;
    let mut fields: Vec<FieldSchema> = Vec::new();
    let mut typed: Vec<bool> = Vec::new();

    for obj in &objects {
        for (key, raw) in obj {
            let value = json_to_value(raw);
            match fields.iter().position(|f| &f.name == key) {
                Some(idx) if !typed[idx] => {
                    if let Some(ty) = infer_type(&value) {
                        fields[idx].field_type = ty;
                        typed[idx] = true;
                    }
                }
                Some(_) => {}
                None => {
                    let ty = infer_type(&value);
                    typed.push(ty.is_some());
                    fields.push(FieldSchema::new(key.clone(), ty.unwrap_or(FieldType::String)));
                }
            }
        }
    }

    let rows = objects
        .iter()
        .map(|obj| {
            fields
                .iter()
                .map(|f| obj.get(&f.name).map_or(Value::Null, json_to_value))
                .collect()
        })
        .collect();
    Ok(RowSet::new(fields).with_rows(rows))
}

/// Write rows as JSON lines keyed by each field's column name.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_rows(path: &Path, rows: &RowSet) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create JSON-lines file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for row in &rows.rows {
        let obj: JsonObject = rows
            .fields
            .iter()
            .zip(row.iter())
            .map(|(f, v)| (f.column_name().to_string(), value_to_json(v)))
            .collect();
        serde_json::to_writer(&mut writer, &obj)?;
        writer.write_all(b"\n")?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
