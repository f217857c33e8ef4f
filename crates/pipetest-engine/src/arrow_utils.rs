//! Arrow IPC serialization and `RecordBatch` ↔ [`RowSet`] conversion.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use pipetest_types::{FieldSchema, FieldType, Row, RowSet, Value};

const IPC_STREAM_OVERHEAD_BYTES: usize = 1024;

fn estimate_ipc_capacity(batch: &RecordBatch) -> usize {
    batch
        .get_array_memory_size()
        .saturating_add(IPC_STREAM_OVERHEAD_BYTES)
}

/// Serialize a `RecordBatch` to Arrow IPC stream format bytes.
///
/// # Errors
///
/// Returns an error if the IPC writer fails.
pub fn record_batch_to_ipc(batch: &RecordBatch) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(estimate_ipc_capacity(batch));
    let mut writer = StreamWriter::try_new(&mut buf, batch.schema().as_ref())
        .context("Failed to create Arrow IPC StreamWriter")?;
    writer
        .write(batch)
        .context("Failed to write RecordBatch to IPC")?;
    writer.finish().context("Failed to finish IPC stream")?;
    Ok(buf)
}

/// Decode Arrow IPC and call `f` once per batch without building an intermediate `Vec`.
///
/// # Errors
///
/// Returns an error if the bytes are not a valid IPC stream, or `f` fails.
pub fn for_each_ipc_batch<F>(ipc_bytes: &[u8], mut f: F) -> Result<()>
where
    F: FnMut(RecordBatch) -> Result<()>,
{
    let cursor = Cursor::new(ipc_bytes);
    let reader =
        StreamReader::try_new(cursor, None).context("Failed to create Arrow IPC StreamReader")?;

    for maybe_batch in reader {
        let batch = maybe_batch.context("Failed to read RecordBatch from IPC stream")?;
        f(batch)?;
    }
    Ok(())
}

/// Deserialize Arrow IPC stream format bytes into a Vec of `RecordBatch`es.
///
/// # Errors
///
/// Returns an error if the bytes are not a valid IPC stream.
pub fn ipc_to_record_batches(ipc_bytes: &[u8]) -> Result<Vec<RecordBatch>> {
    let mut batches: Vec<RecordBatch> = Vec::new();
    for_each_ipc_batch(ipc_bytes, |batch| {
        batches.push(batch);
        Ok(())
    })?;
    Ok(batches)
}

/// Read an Arrow IPC stream file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or decoded.
pub fn read_ipc_file(path: &Path) -> Result<Vec<RecordBatch>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read Arrow file: {}", path.display()))?;
    ipc_to_record_batches(&bytes).with_context(|| format!("Invalid Arrow file: {}", path.display()))
}

/// Arrow type a column is cast to before values are extracted.
fn arrow_type(field_type: FieldType) -> DataType {
    match field_type {
        FieldType::Integer => DataType::Int64,
        FieldType::Number => DataType::Float64,
        FieldType::Boolean => DataType::Boolean,
        FieldType::String
        | FieldType::BigNumber
        | FieldType::Date
        | FieldType::Timestamp
        | FieldType::Binary => DataType::Utf8,
    }
}

fn column_values(array: &ArrayRef, field: &FieldSchema) -> Result<Vec<Value>> {
    let target = arrow_type(field.field_type);
    let casted = cast(array.as_ref(), &target)
        .with_context(|| format!("Cannot convert column '{}' to {target}", field.column_name()))?;
    let any = casted.as_any();

    let values = match target {
        DataType::Int64 => {
            let a = any
                .downcast_ref::<Int64Array>()
                .context("expected Int64 array after cast")?;
            (0..a.len())
                .map(|i| if a.is_null(i) { Value::Null } else { Value::Integer(a.value(i)) })
                .collect()
        }
        DataType::Float64 => {
            let a = any
                .downcast_ref::<Float64Array>()
                .context("expected Float64 array after cast")?;
            (0..a.len())
                .map(|i| if a.is_null(i) { Value::Null } else { Value::Number(a.value(i)) })
                .collect()
        }
        DataType::Boolean => {
            let a = any
                .downcast_ref::<BooleanArray>()
                .context("expected Boolean array after cast")?;
            (0..a.len())
                .map(|i| if a.is_null(i) { Value::Null } else { Value::Boolean(a.value(i)) })
                .collect()
        }
        _ => {
            let a = any
                .downcast_ref::<StringArray>()
                .context("expected Utf8 array after cast")?;
            (0..a.len())
                .map(|i| {
                    if a.is_null(i) {
                        Value::Null
                    } else {
                        Value::String(a.value(i).to_string())
                    }
                })
                .collect()
        }
    };
    Ok(values)
}

/// Convert batches to rows shaped by `fields`, looking columns up by
/// [`FieldSchema::column_name`].
///
/// # Errors
///
/// Returns an error if a declared column is missing or cannot be cast.
pub fn batches_to_rows(batches: &[RecordBatch], fields: &[FieldSchema]) -> Result<RowSet> {
    let mut rows: Vec<Row> = Vec::new();
    for batch in batches {
        let schema = batch.schema();
        let mut columns = Vec::with_capacity(fields.len());
        for field in fields {
            let idx = schema
                .index_of(field.column_name())
                .with_context(|| format!("Column '{}' not found", field.column_name()))?;
            columns.push(column_values(batch.column(idx), field)?);
        }
        for i in 0..batch.num_rows() {
            rows.push(columns.iter().map(|col| col[i].clone()).collect());
        }
    }
    Ok(RowSet::new(fields.to_vec()).with_rows(rows))
}

/// Build a single `RecordBatch` from a [`RowSet`], one nullable column per field.
///
/// # Errors
///
/// Returns an error if the arrays do not line up with the schema.
pub fn rows_to_record_batch(rows: &RowSet) -> Result<RecordBatch> {
    let mut schema_fields = Vec::with_capacity(rows.fields.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(rows.fields.len());

    for (idx, field) in rows.fields.iter().enumerate() {
        let cells = rows.rows.iter().map(|r| r.get(idx).unwrap_or(&Value::Null));
        let data_type = arrow_type(field.field_type);
        let array: ArrayRef = match data_type {
            DataType::Int64 => Arc::new(Int64Array::from(
                cells.map(Value::as_i64).collect::<Vec<_>>(),
            )),
            DataType::Float64 => Arc::new(Float64Array::from(
                cells.map(Value::as_f64).collect::<Vec<_>>(),
            )),
            DataType::Boolean => Arc::new(BooleanArray::from(
                cells.map(Value::as_bool).collect::<Vec<_>>(),
            )),
            _ => Arc::new(StringArray::from(
                cells
                    .map(|v| (!v.is_null()).then(|| v.to_string()))
                    .collect::<Vec<_>>(),
            )),
        };
        schema_fields.push(Field::new(field.column_name(), data_type, true));
        arrays.push(array);
    }

    RecordBatch::try_new(Arc::new(Schema::new(schema_fields)), arrays)
        .context("Failed to build RecordBatch from rows")
}
