//! Reading individual shard files.
pub mod file;

mod ipc;

use std::fmt::Debug;
use std::path::Path;

use arrow::datatypes::SchemaRef;

pub use self::file::FileShardReader;
use crate::errors::{Result, range_error};
use crate::planner::FileInstruction;
use crate::table::Table;

/// Produces tables for shard files.
///
/// `in_memory` selects between a mapped view (false) and copying the shard
/// onto the heap (true).
pub trait ShardReader: Debug {
    /// Read an entire shard.
    fn read_table(&self, path: &Path, in_memory: bool) -> Result<Table>;

    /// Read only the schema of a shard.
    fn read_schema(&self, path: &Path) -> Result<SchemaRef>;

    /// Read a shard and apply the instruction's skip and take.
    fn open(&self, instruction: &FileInstruction, in_memory: bool) -> Result<Table> {
        let table = self.read_table(&instruction.filename, in_memory)?;
        slice_for_instruction(table, instruction)
    }
}

/// Apply skip/take to a full shard table.
///
/// The bounds are checked against the rows actually read, not the row counts
/// the plan was built from.
pub fn slice_for_instruction(table: Table, instruction: &FileInstruction) -> Result<Table> {
    let rows = table.num_rows();
    let skip = instruction.skip.unwrap_or(0);
    let take = match instruction.take {
        Some(take) => take,
        None => rows.saturating_sub(skip),
    };

    match skip.checked_add(take) {
        Some(end) if end <= rows => (),
        _ => {
            return Err(range_error!(
                instruction.filename.display(),
                "skip {skip} + take {take} exceeds {rows} rows in shard"
            ));
        }
    }

    if skip == 0 && take == rows {
        return Ok(table);
    }
    table.slice(skip, take)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;

    use super::*;
    use crate::errors::SplitReadError;

    fn table(n: i64) -> Table {
        let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Int64, false)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from_iter_values(0..n))])
                .unwrap();
        Table::from_record_batch(batch)
    }

    #[test]
    fn whole_file() {
        let got = slice_for_instruction(table(10), &FileInstruction::whole("f")).unwrap();
        assert_eq!(10, got.num_rows());
    }

    #[test]
    fn skip_take() {
        let got = slice_for_instruction(table(100), &FileInstruction::sliced("f", 10, 10)).unwrap();
        assert_eq!(10, got.num_rows());
    }

    #[test]
    fn skip_only() {
        let instruction = FileInstruction {
            filename: "f".into(),
            skip: Some(4),
            take: None,
        };
        let got = slice_for_instruction(table(10), &instruction).unwrap();
        assert_eq!(6, got.num_rows());
    }

    #[test]
    fn take_past_end_of_shard() {
        let err =
            slice_for_instruction(table(10), &FileInstruction::sliced("shard-0", 5, 6)).unwrap_err();
        match err {
            SplitReadError::Range { name, .. } => assert_eq!("shard-0", name),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn skip_past_end_of_shard() {
        let instruction = FileInstruction {
            filename: "f".into(),
            skip: Some(11),
            take: None,
        };
        // Skipping everything is fine, skipping past the end isn't.
        assert!(slice_for_instruction(table(11), &instruction).is_ok());
        assert!(slice_for_instruction(table(10), &instruction).is_err());
    }
}
