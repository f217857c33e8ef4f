//! Downstream consumers of result records.

use std::io::Write;

use anyhow::{Context, Result};
use pipetest_types::ResultRecord;

/// Receives result records in emission order.
pub trait ResultSink: Send {
    /// Hand one record downstream.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    fn emit(&mut self, record: ResultRecord) -> Result<()>;

    /// Signal end-of-output. Called once, after the last record.
    ///
    /// # Errors
    ///
    /// Returns an error if buffered output cannot be flushed.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl ResultSink for Vec<ResultRecord> {
    fn emit(&mut self, record: ResultRecord) -> Result<()> {
        self.push(record);
        Ok(())
    }
}

/// Writes each record as one JSON object per line.
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> ResultSink for JsonLinesSink<W> {
    fn emit(&mut self, record: ResultRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &record).context("Failed to encode result record")?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush result records")
    }
}
