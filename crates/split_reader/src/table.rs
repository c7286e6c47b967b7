use std::collections::HashSet;
use std::sync::Arc;

use arrow::array::ArrayData;
use arrow::buffer::Buffer;
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use memmap2::Mmap;
use tracing::trace;

use crate::errors::{Result, range_error};

/// What keeps the bytes behind a table chunk alive.
#[derive(Debug, Clone)]
pub enum TableBacking {
    /// Zero-copy view over a memory mapped shard. Pages are faulted in lazily.
    Mapped(Arc<Mmap>),
    /// Shard bytes copied onto the heap.
    Owned(Buffer),
    /// Arrays built directly in memory.
    Synthetic,
}

#[derive(Debug, Clone)]
struct TableChunk {
    batch: RecordBatch,
    backing: TableBacking,
}

/// A logical table made up of one or more record batches sharing a schema.
///
/// Slicing and concatenating never copy column data. Each chunk holds on to
/// its backing, so a view over a mapped shard keeps the mapping alive until
/// the last view is dropped.
#[derive(Debug, Clone)]
pub struct Table {
    schema: SchemaRef,
    chunks: Vec<TableChunk>,
    num_rows: usize,
}

impl Table {
    pub fn new_empty(schema: SchemaRef) -> Self {
        Table {
            schema,
            chunks: Vec::new(),
            num_rows: 0,
        }
    }

    /// Create a table from a batch built in memory.
    pub fn from_record_batch(batch: RecordBatch) -> Self {
        Self::from_batches(batch.schema(), vec![batch], TableBacking::Synthetic)
    }

    pub(crate) fn from_batches(
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
        backing: TableBacking,
    ) -> Self {
        let chunks: Vec<_> = batches
            .into_iter()
            .filter(|b| b.num_rows() > 0)
            .map(|batch| TableChunk {
                batch,
                backing: backing.clone(),
            })
            .collect();
        let num_rows = chunks.iter().map(|c| c.batch.num_rows()).sum();

        Table {
            schema,
            chunks,
            num_rows,
        }
    }

    /// Append the chunks of `other`. Schemas must already be checked.
    pub(crate) fn append_unchecked(&mut self, other: Table) {
        self.num_rows += other.num_rows;
        self.chunks.extend(other.chunks);
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.num_rows, self.num_columns())
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect()
    }

    pub fn record_batches(&self) -> impl Iterator<Item = &RecordBatch> {
        self.chunks.iter().map(|c| &c.batch)
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Zero-copy slice of `length` rows starting at `offset`.
    pub fn slice(&self, offset: usize, length: usize) -> Result<Table> {
        let end = offset
            .checked_add(length)
            .filter(|end| *end <= self.num_rows)
            .ok_or_else(|| {
                range_error!(
                    "table",
                    "slice at offset {offset} with length {length} exceeds {} rows",
                    self.num_rows
                )
            })?;

        let mut chunks = Vec::new();
        let mut chunk_start = 0;
        for chunk in &self.chunks {
            let chunk_end = chunk_start + chunk.batch.num_rows();
            if chunk_end > offset && chunk_start < end {
                let local_offset = offset.saturating_sub(chunk_start);
                let local_len = end.min(chunk_end) - (chunk_start + local_offset);
                chunks.push(TableChunk {
                    batch: chunk.batch.slice(local_offset, local_len),
                    backing: chunk.backing.clone(),
                });
            }
            chunk_start = chunk_end;
        }

        Ok(Table {
            schema: self.schema.clone(),
            chunks,
            num_rows: length,
        })
    }

    /// If every chunk of this table is a view over a mapped file.
    pub fn is_mapped(&self) -> bool {
        !self.chunks.is_empty()
            && self
                .chunks
                .iter()
                .all(|c| matches!(c.backing, TableBacking::Mapped(_)))
    }

    /// Heap bytes held by this table's backings.
    ///
    /// Mapped chunks count as zero. A buffer shared by multiple chunks is
    /// counted once.
    pub fn owned_bytes(&self) -> usize {
        let mut seen = HashSet::new();
        let mut total = 0;
        for chunk in &self.chunks {
            match &chunk.backing {
                TableBacking::Mapped(_) => (),
                TableBacking::Owned(buf) => {
                    if seen.insert(buf.data_ptr().as_ptr() as usize) {
                        total += buf.len();
                    }
                }
                TableBacking::Synthetic => {
                    for column in chunk.batch.columns() {
                        total += count_array_data(&mut seen, &column.to_data());
                    }
                }
            }
        }
        total
    }

    /// Copy all chunks into a single contiguous batch.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let batch = concat_batches(&self.schema, self.record_batches())?;
        Ok(batch)
    }

    /// Release the table and any mappings or buffers only it references.
    pub fn close(self) {
        trace!(num_chunks = self.chunks.len(), "closing table");
        drop(self);
    }
}

/// Capacity of the buffer's allocation, or zero if it was already counted.
fn count_buffer(seen: &mut HashSet<usize>, buf: &Buffer) -> usize {
    if seen.insert(buf.data_ptr().as_ptr() as usize) {
        buf.capacity()
    } else {
        0
    }
}

fn count_array_data(seen: &mut HashSet<usize>, data: &ArrayData) -> usize {
    let mut total = 0;
    for buf in data.buffers() {
        total += count_buffer(seen, buf);
    }
    if let Some(nulls) = data.nulls() {
        total += count_buffer(seen, nulls.buffer());
    }
    for child in data.child_data() {
        total += count_array_data(seen, child);
    }
    total
}

#[cfg(test)]
mod tests {
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};

    use super::*;

    fn int_batch(vals: impl IntoIterator<Item = i64>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Int64, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from_iter_values(vals))]).unwrap()
    }

    fn values(table: &Table) -> Vec<i64> {
        let batch = table.to_record_batch().unwrap();
        batch
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .values()
            .to_vec()
    }

    #[test]
    fn shape_and_names() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int64, false),
            Field::new("b", DataType::Utf8, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from_iter_values([1, 2])),
                Arc::new(StringArray::from(vec!["x", "y"])),
            ],
        )
        .unwrap();
        let table = Table::from_record_batch(batch);

        assert_eq!((2, 2), table.shape());
        assert_eq!(vec!["a", "b"], table.column_names());
    }

    #[test]
    fn slice_across_chunks() {
        let mut table = Table::from_record_batch(int_batch(0..4));
        table.append_unchecked(Table::from_record_batch(int_batch(4..8)));

        let sliced = table.slice(2, 4).unwrap();
        assert_eq!(4, sliced.num_rows());
        assert_eq!(2, sliced.num_chunks());
        assert_eq!(vec![2, 3, 4, 5], values(&sliced));
    }

    #[test]
    fn slice_of_slice() {
        let table = Table::from_record_batch(int_batch(0..10));
        let sliced = table.slice(2, 6).unwrap().slice(1, 2).unwrap();
        assert_eq!(vec![3, 4], values(&sliced));
    }

    #[test]
    fn slice_empty() {
        let table = Table::from_record_batch(int_batch(0..10));
        let sliced = table.slice(10, 0).unwrap();
        assert_eq!((0, 1), sliced.shape());
        assert_eq!(0, sliced.num_chunks());
    }

    #[test]
    fn slice_out_of_bounds() {
        let table = Table::from_record_batch(int_batch(0..10));
        assert!(table.slice(5, 6).is_err());
        assert!(table.slice(usize::MAX, 2).is_err());
    }

    #[test]
    fn empty_table_to_batch() {
        let schema = int_batch([]).schema();
        let table = Table::new_empty(schema.clone());
        let batch = table.to_record_batch().unwrap();
        assert_eq!(0, batch.num_rows());
        assert_eq!(schema, batch.schema());
        assert!(!table.is_mapped());
    }

    #[test]
    fn owned_bytes_counts_shared_buffer_once() {
        let buf = Buffer::from_vec(vec![0_u8; 64]);
        let table = Table::from_batches(
            int_batch([]).schema(),
            vec![int_batch([1, 2]), int_batch([3])],
            TableBacking::Owned(buf),
        );
        assert_eq!(64, table.owned_bytes());
    }

    #[test]
    fn owned_bytes_counts_sliced_synthetic_chunks_once() {
        let table = Table::from_record_batch(int_batch(0..100));
        let whole = table.owned_bytes();
        assert!(whole >= 100 * 8);

        let mut halves = table.slice(0, 50).unwrap();
        halves.append_unchecked(table.slice(50, 50).unwrap());
        assert_eq!(2, halves.num_chunks());
        assert_eq!(whole, halves.owned_bytes());
    }
}
