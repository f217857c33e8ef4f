//! Shared pipetest data model: test and data-set definitions, rows, and
//! result records.
//!
//! This crate has no I/O; catalogs and the engine build on top of it.

pub mod dataset;
pub mod field;
pub mod record;
pub mod row;
pub mod value;

pub use dataset::{DataSetDefinition, FieldSchema};
pub use field::FieldType;
pub use record::{ResultRecord, OUTPUT_FIELDS, UNRESOLVED_PIPELINE};
pub use row::{Row, RowSet};
pub use test::{Binding, PipelineReference, TestCategory, TestDefinition};
pub use value::Value;
