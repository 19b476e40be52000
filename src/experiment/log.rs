//! Run Log - append-only provenance table, persisted as CSV through Arrow
//!
//! **Append-Only Write Pattern**:
//! - Rows are only ever appended, in allocation order
//! - The header is the union of every column seen so far, in first-seen order
//! - A row missing a later column leaves that cell absent (empty field on disk)

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, StringArray};
use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use indexmap::IndexSet;
use rustc_hash::FxHashMap;

use super::run_record::{RunRecord, METADATA_COLUMNS};
use crate::{Error, Result};

/// In-memory run log with a union schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLog {
    columns: IndexSet<String>,
    rows: Vec<FxHashMap<String, String>>,
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLog {
    /// Create an empty log with the metadata columns.
    #[must_use]
    pub fn new() -> Self {
        Self {
            columns: METADATA_COLUMNS.iter().map(ToString::to_string).collect(),
            rows: Vec::new(),
        }
    }

    /// Load a persisted log, or start empty if `path` does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read as CSV.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() || fs::metadata(path)?.len() == 0 {
            return Ok(Self::new());
        }

        let (inferred, _) = Format::default()
            .with_header(true)
            .infer_schema(File::open(path)?, Some(0))?;
        if inferred.fields().is_empty() {
            return Ok(Self::new());
        }
        let schema = Schema::new(
            inferred
                .fields()
                .iter()
                .map(|f| Field::new(f.name(), DataType::Utf8, true))
                .collect::<Vec<_>>(),
        );

        let reader = ReaderBuilder::new(Arc::new(schema))
            .with_header(true)
            .build(File::open(path)?)?;

        let mut log = Self::new();
        for batch in reader {
            log.extend_from_batch(&batch?)?;
        }
        tracing::debug!(path = %path.display(), rows = log.len(), "loaded run log");
        Ok(log)
    }

    fn extend_from_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        let schema = batch.schema();
        let mut columns = Vec::with_capacity(batch.num_columns());
        for (field, array) in schema.fields().iter().zip(batch.columns()) {
            let strings = array
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| Error::Log(format!("column {} is not text", field.name())))?;
            self.columns.insert(field.name().clone());
            columns.push((field.name(), strings));
        }

        for row in 0..batch.num_rows() {
            let cells = columns
                .iter()
                .filter(|(_, strings)| strings.is_valid(row) && !strings.value(row).is_empty())
                .map(|(name, strings)| ((*name).clone(), strings.value(row).to_string()))
                .collect();
            self.rows.push(cells);
        }
        Ok(())
    }

    /// Append one record, extending the schema with any new columns.
    pub fn push(&mut self, record: &RunRecord) {
        let mut row = FxHashMap::default();
        for (column, cell) in record.cells() {
            self.columns.insert(column.to_string());
            if let Some(cell) = cell {
                row.insert(column.to_string(), cell);
            }
        }
        self.rows.push(row);
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the log has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names in first-seen order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    /// Cell at `row` / `column`; `None` when absent.
    #[must_use]
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }

    /// Every cell of one column, one entry per row.
    #[must_use]
    pub fn column(&self, column: &str) -> Vec<Option<&str>> {
        self.rows
            .iter()
            .map(|row| row.get(column).map(String::as_str))
            .collect()
    }

    /// Build an Arrow batch with one nullable Utf8 column per log column.
    ///
    /// # Errors
    ///
    /// Returns an error if Arrow rejects the batch.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let schema = Schema::new(
            self.columns
                .iter()
                .map(|name| Field::new(name, DataType::Utf8, true))
                .collect::<Vec<_>>(),
        );
        let arrays: Vec<ArrayRef> = self
            .columns
            .iter()
            .map(|name| Arc::new(StringArray::from(self.column(name))) as ArrayRef)
            .collect();
        let options = RecordBatchOptions::new().with_row_count(Some(self.rows.len()));
        Ok(RecordBatch::try_new_with_options(
            Arc::new(schema),
            arrays,
            &options,
        )?)
    }

    /// Persist the full log to `path`, replacing it atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let batch = self.to_record_batch()?;
        let tmp = path.with_extension("csv.tmp");
        {
            let mut writer = WriterBuilder::new().with_header(true).build(File::create(&tmp)?);
            writer.write(&batch)?;
        }
        fs::rename(&tmp, path)?;
        tracing::debug!(path = %path.display(), rows = self.len(), "wrote run log");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParameterMap;
    use serde_json::json;

    fn record(id: u64, params: serde_json::Value) -> RunRecord {
        let params: ParameterMap = serde_json::from_value(params).unwrap();
        RunRecord::new(id, "result", &params)
    }

    #[test]
    fn test_new_log_has_metadata_columns() {
        let log = RunLog::new();
        assert!(log.is_empty());
        assert_eq!(log.columns().collect::<Vec<_>>(), METADATA_COLUMNS.to_vec());
    }

    #[test]
    fn test_union_schema_leaves_missing_cells_absent() {
        let mut log = RunLog::new();
        log.push(&record(1, json!({"a": 1})));
        log.push(&record(2, json!({"a": 2, "b": "x"})));

        assert_eq!(
            log.columns().collect::<Vec<_>>(),
            vec!["id", "name", "time_created", "a", "b"]
        );
        assert_eq!(log.column("b"), vec![None, Some("x")]);
        assert_eq!(log.cell(1, "id"), Some("2"));
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::open(dir.path().join("nope.csv")).unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exp.csv");

        let mut log = RunLog::new();
        log.push(&record(1, json!({"lr": 0.5})));
        log.push(&record(2, json!({"lr": 0.25, "tags": ["a", "b,c"]})));
        log.save(&path).unwrap();

        let reopened = RunLog::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(
            reopened.columns().collect::<Vec<_>>(),
            vec!["id", "name", "time_created", "lr", "tags_0", "tags_1"]
        );
        assert_eq!(reopened.column("lr"), vec![Some("0.5"), Some("0.25")]);
        assert_eq!(reopened.column("tags_1"), vec![None, Some("b,c")]);
        assert_eq!(reopened, log);
    }
}
