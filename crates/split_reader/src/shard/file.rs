use std::fs::{self, File};
use std::path::Path;
use std::ptr::NonNull;
use std::sync::Arc;

use arrow::buffer::Buffer;
use arrow::datatypes::SchemaRef;
use memmap2::Mmap;
use tracing::debug;

use super::ShardReader;
use super::ipc::{MIN_FILE_LEN, decode_file, decode_schema};
use crate::errors::{Result, SplitReadError};
use crate::table::{Table, TableBacking};

/// Read a single shard file in its entirety.
pub fn read_table(path: impl AsRef<Path>, in_memory: bool) -> Result<Table> {
    FileShardReader.read_table(path.as_ref(), in_memory)
}

/// Reads Arrow IPC shard files from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileShardReader;

impl ShardReader for FileShardReader {
    fn read_table(&self, path: &Path, in_memory: bool) -> Result<Table> {
        let (buffer, backing) = if in_memory {
            read_owned(path)?
        } else {
            map_file(path)?
        };

        let (schema, batches) = decode_file(path, &buffer)?;
        let table = Table::from_batches(schema, batches, backing);
        debug!(
            ?path,
            in_memory,
            num_rows = table.num_rows(),
            num_bytes = buffer.len(),
            "read shard"
        );

        Ok(table)
    }

    fn read_schema(&self, path: &Path) -> Result<SchemaRef> {
        let (buffer, _) = map_file(path)?;
        decode_schema(path, &buffer)
    }
}

/// Copy the entire file onto the heap.
fn read_owned(path: &Path) -> Result<(Buffer, TableBacking)> {
    let bytes = fs::read(path).map_err(|e| SplitReadError::io(path, e))?;
    check_len(path, bytes.len() as u64)?;

    let buffer = Buffer::from_vec(bytes);
    Ok((buffer.clone(), TableBacking::Owned(buffer)))
}

/// Map the file into memory.
///
/// The file handle is closed on return, the mapping lives for as long as
/// any buffer sliced from it.
fn map_file(path: &Path) -> Result<(Buffer, TableBacking)> {
    let file = File::open(path).map_err(|e| SplitReadError::io(path, e))?;
    let len = file
        .metadata()
        .map_err(|e| SplitReadError::io(path, e))?
        .len();
    check_len(path, len)?;

    // SAFETY: Shards are immutable once written. Modifying a shard while it's
    // mapped is undefined behavior.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| SplitReadError::io(path, e))?;
    let mmap = Arc::new(mmap);

    let ptr = NonNull::new(mmap.as_ptr() as *mut u8)
        .ok_or_else(|| SplitReadError::format(path, "mapped null pointer"))?;
    // SAFETY: The pointer and length come from the mapping, and the mapping is
    // kept alive by the buffer's owner.
    let buffer = unsafe { Buffer::from_custom_allocation(ptr, mmap.len(), mmap.clone()) };

    Ok((buffer, TableBacking::Mapped(mmap)))
}

fn check_len(path: &Path, len: u64) -> Result<()> {
    if len < MIN_FILE_LEN as u64 {
        return Err(SplitReadError::format(
            path,
            format!("file is {len} bytes, too small to be a shard"),
        ));
    }
    Ok(())
}
