//! Utilities for testing readers without real shards.
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::StringArray;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;

use crate::errors::{Result, SplitReadError};
use crate::shard::ShardReader;
use crate::table::Table;

pub const SYNTHETIC_ROWS_PER_FILE: usize = 100;

/// A shard reader that never touches the filesystem.
///
/// Every "file" has `rows_per_file` rows with a single `filename` column
/// holding the file's name with any extension removed.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticShardReader {
    pub rows_per_file: usize,
}

impl Default for SyntheticShardReader {
    fn default() -> Self {
        SyntheticShardReader {
            rows_per_file: SYNTHETIC_ROWS_PER_FILE,
        }
    }
}

impl SyntheticShardReader {
    pub fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![Field::new(
            "filename",
            DataType::Utf8,
            false,
        )]))
    }
}

impl ShardReader for SyntheticShardReader {
    fn read_table(&self, path: &Path, _in_memory: bool) -> Result<Table> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let values = StringArray::from(vec![stem; self.rows_per_file]);
        let batch = RecordBatch::try_new(Self::schema(), vec![Arc::new(values)])?;
        Ok(Table::from_record_batch(batch))
    }

    fn read_schema(&self, _path: &Path) -> Result<SchemaRef> {
        Ok(Self::schema())
    }
}

/// Write batches to an Arrow IPC file.
pub fn write_shard(path: &Path, batches: &[RecordBatch]) -> Result<()> {
    let schema = batches
        .first()
        .map(|b| b.schema())
        .ok_or_else(|| SplitReadError::format(path, "cannot write a shard without batches"))?;

    let file = File::create(path).map_err(|e| SplitReadError::io(path, e))?;
    let mut writer = FileWriter::try_new(file, &schema)?;
    for batch in batches {
        writer.write(batch)?;
    }
    writer.finish()?;

    Ok(())
}

/// Batch with a single utf8 column where every value is `value`.
pub fn tagged_batch(column: &str, value: &str, num_rows: usize) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![Field::new(column, DataType::Utf8, false)]));
    let values = StringArray::from(vec![value; num_rows]);
    RecordBatch::try_new(schema, vec![Arc::new(values)]).expect("column matches schema")
}

/// Get the values of a utf8 column.
pub fn string_column(table: &Table, column: &str) -> Vec<String> {
    let idx = table
        .column_names()
        .iter()
        .position(|n| *n == column)
        .unwrap_or_else(|| panic!("missing column {column}"));

    table
        .record_batches()
        .flat_map(|batch| {
            let arr = batch
                .column(idx)
                .as_any()
                .downcast_ref::<StringArray>()
                .expect("utf8 column");
            arr.iter()
                .map(|v| v.unwrap_or_default().to_string())
                .collect::<Vec<_>>()
        })
        .collect()
}
