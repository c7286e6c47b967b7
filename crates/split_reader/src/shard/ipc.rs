//! Decoding of Arrow IPC files held in a single buffer.
//!
//! Record batches decoded here reference the input buffer directly, so a
//! mapped buffer stays zero-copy.
use std::path::Path;
use std::sync::Arc;

use arrow::buffer::Buffer;
use arrow::datatypes::SchemaRef;
use arrow::ipc::convert::fb_to_schema;
use arrow::ipc::reader::{FileDecoder, read_footer_length};
use arrow::ipc::{Block, MetadataVersion, root_as_footer};
use arrow::record_batch::RecordBatch;

use crate::errors::{Result, SplitReadError};

const ARROW_MAGIC: &[u8; 6] = b"ARROW1";

/// Footer length (4 bytes) followed by the magic.
const TRAILER_LEN: usize = 10;

/// Smallest possible file, padded leading magic plus the trailer.
pub(crate) const MIN_FILE_LEN: usize = 8 + TRAILER_LEN;

#[derive(Debug)]
struct IpcFooter {
    schema: SchemaRef,
    version: MetadataVersion,
    dictionaries: Vec<Block>,
    record_batches: Vec<Block>,
}

/// Decode only the schema of an IPC file.
pub(crate) fn decode_schema(path: &Path, buffer: &Buffer) -> Result<SchemaRef> {
    Ok(read_footer(path, buffer)?.schema)
}

/// Decode all record batches of an IPC file.
pub(crate) fn decode_file(path: &Path, buffer: &Buffer) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let footer = read_footer(path, buffer)?;
    let mut decoder = FileDecoder::new(footer.schema.clone(), footer.version);

    for block in &footer.dictionaries {
        let data = block_data(path, buffer, block)?;
        decoder
            .read_dictionary(block, &data)
            .map_err(|e| SplitReadError::format(path, format!("bad dictionary: {e}")))?;
    }

    let mut batches = Vec::with_capacity(footer.record_batches.len());
    for block in &footer.record_batches {
        let data = block_data(path, buffer, block)?;
        let batch = decoder
            .read_record_batch(block, &data)
            .map_err(|e| SplitReadError::format(path, format!("bad record batch: {e}")))?;
        if let Some(batch) = batch {
            batches.push(batch);
        }
    }

    Ok((footer.schema, batches))
}

fn read_footer(path: &Path, buffer: &Buffer) -> Result<IpcFooter> {
    let len = buffer.len();
    if len < MIN_FILE_LEN || &buffer[..ARROW_MAGIC.len()] != ARROW_MAGIC {
        return Err(SplitReadError::format(path, "not an arrow ipc file"));
    }

    let trailer_start = len - TRAILER_LEN;
    let mut trailer = [0; TRAILER_LEN];
    trailer.copy_from_slice(&buffer[trailer_start..]);
    let footer_len =
        read_footer_length(trailer).map_err(|e| SplitReadError::format(path, e.to_string()))?;
    if footer_len > trailer_start {
        return Err(SplitReadError::format(
            path,
            format!("footer length {footer_len} exceeds file size {len}"),
        ));
    }

    let footer = root_as_footer(&buffer[trailer_start - footer_len..trailer_start])
        .map_err(|e| SplitReadError::format(path, format!("invalid footer: {e}")))?;
    let schema = footer
        .schema()
        .ok_or_else(|| SplitReadError::format(path, "footer is missing a schema"))?;

    Ok(IpcFooter {
        schema: Arc::new(fb_to_schema(schema)),
        version: footer.version(),
        dictionaries: footer
            .dictionaries()
            .map(|b| b.iter().copied().collect())
            .unwrap_or_default(),
        record_batches: footer
            .recordBatches()
            .map(|b| b.iter().copied().collect())
            .unwrap_or_default(),
    })
}

/// Get the message and body bytes for a block, checking bounds first.
fn block_data(path: &Path, buffer: &Buffer, block: &Block) -> Result<Buffer> {
    let out_of_bounds = || {
        SplitReadError::format(
            path,
            format!(
                "block at offset {} exceeds file size {}",
                block.offset(),
                buffer.len()
            ),
        )
    };

    let offset = usize::try_from(block.offset()).map_err(|_| out_of_bounds())?;
    let meta_len = usize::try_from(block.metaDataLength()).map_err(|_| out_of_bounds())?;
    let body_len = usize::try_from(block.bodyLength()).map_err(|_| out_of_bounds())?;
    let len = meta_len + body_len;

    match offset.checked_add(len) {
        Some(end) if end <= buffer.len() => Ok(buffer.slice_with_length(offset, len)),
        _ => Err(out_of_bounds()),
    }
}
