//! Parquet-backed event tables.
//!
//! An event table is one columnar record table per artifact: one row per
//! event, one column per field. Reading keeps the file's schema so that
//! filtered or merged outputs preserve the original field layout.

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use thiserror::Error;

/// Errors that can occur while reading or writing event tables.
#[derive(Debug, Error)]
pub enum EventTableError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Schema of {} does not match the first input", .path.display())]
    SchemaMismatch { path: PathBuf },

    #[error("No event tables given")]
    NoInputs,
}

/// In-memory event table: a schema plus its record batches.
#[derive(Debug, Clone)]
pub struct EventTable {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl EventTable {
    /// Creates a table from already-built batches.
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self { schema, batches }
    }

    /// Reads every record batch of a Parquet file.
    pub fn read(path: &Path) -> Result<Self, EventTableError> {
        let file = File::open(path).map_err(|source| EventTableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let schema = builder.schema().clone();
        let reader = builder.build()?;

        let mut batches = Vec::new();
        for batch in reader {
            batches.push(batch?);
        }

        tracing::debug!(
            path = %path.display(),
            events = batches.iter().map(RecordBatch::num_rows).sum::<usize>(),
            "Event table loaded"
        );

        Ok(Self { schema, batches })
    }

    /// Schema shared by every batch.
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Record batches in file order.
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Total number of events.
    pub fn num_events(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Column names in layout order.
    pub fn field_names(&self) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().to_string())
            .collect()
    }

    /// Flattens all batches into one.
    pub fn to_single_batch(&self) -> Result<RecordBatch, EventTableError> {
        Ok(concat_batches(&self.schema, &self.batches)?)
    }

    /// Writes the table to a Parquet file, creating parent directories.
    ///
    /// A table with zero events still produces a valid file carrying the schema.
    pub fn write(&self, path: &Path) -> Result<(), EventTableError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| EventTableError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let file = File::create(path).map_err(|source| EventTableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(Default::default()))
            .build();

        let mut writer = ArrowWriter::try_new(file, self.schema.clone(), Some(props))?;
        for batch in &self.batches {
            writer.write(batch)?;
        }
        writer.close()?;

        tracing::info!(
            path = %path.display(),
            events = self.num_events(),
            "Event table written"
        );

        Ok(())
    }
}

/// Reads the event count from the file footer without decoding any column.
pub fn count_events(path: &Path) -> Result<u64, EventTableError> {
    let file = File::open(path).map_err(|source| EventTableError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let rows = builder.metadata().file_metadata().num_rows();
    Ok(rows.max(0) as u64)
}

/// Concatenates several tables that share one schema.
///
/// # Errors
///
/// Returns `EventTableError::SchemaMismatch` naming the first input whose
/// schema differs from the first table's.
pub fn concat_tables(inputs: &[PathBuf]) -> Result<EventTable, EventTableError> {
    let (first, rest) = inputs.split_first().ok_or(EventTableError::NoInputs)?;

    let mut merged = EventTable::read(first)?;
    for path in rest {
        let table = EventTable::read(path)?;
        if table.schema.fields() != merged.schema.fields() {
            return Err(EventTableError::SchemaMismatch { path: path.clone() });
        }
        merged.batches.extend(table.batches);
    }

    Ok(merged)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_write_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("stage1_Hbb.parquet");

        let table = labelled_table(&[1, 2, 3], &[("process_isHBB", vec![true, false, true])]);
        table.write(&path).unwrap();

        assert_eq!(count_events(&path).unwrap(), 3);
        let loaded = EventTable::read(&path).unwrap();
        assert_eq!(loaded.num_events(), 3);
        assert_eq!(
            loaded.field_names(),
            vec!["event_id", "energy", "process_isHBB"]
        );
    }

    #[test]
    fn test_empty_table_keeps_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.parquet");

        let table = labelled_table(&[], &[("process_isQQ", vec![])]);
        table.write(&path).unwrap();

        assert_eq!(count_events(&path).unwrap(), 0);
        assert_eq!(EventTable::read(&path).unwrap().field_names().len(), 3);
    }

    #[test]
    fn test_count_missing_file() {
        let err = count_events(Path::new("/nonexistent/stage1.parquet")).unwrap_err();
        assert!(matches!(err, EventTableError::Io { .. }));
    }

    #[test]
    fn test_concat_tables_schema_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.parquet");
        let b = dir.path().join("b.parquet");
        labelled_table(&[1], &[("process_isHBB", vec![true])])
            .write(&a)
            .unwrap();
        labelled_table(&[2], &[("process_isHGG", vec![true])])
            .write(&b)
            .unwrap();

        let err = concat_tables(&[a.clone(), b.clone()]).unwrap_err();
        assert!(matches!(err, EventTableError::SchemaMismatch { path } if path == b));
        assert!(matches!(concat_tables(&[]), Err(EventTableError::NoInputs)));
    }
}
