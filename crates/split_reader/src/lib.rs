//! Resolve split selection expressions like `train+test[:10%]` against split
//! metadata, and read the selected rows from Arrow IPC shards.
pub mod assemble;
pub mod config;
pub mod errors;
pub mod instruction;
pub mod naming;
pub mod planner;
pub mod reader;
pub mod shard;
pub mod split;
pub mod table;

pub mod testutil;

pub use config::ReaderConfig;
pub use errors::{Result, SplitReadError};
pub use instruction::{Bound, ReadInstruction, SliceRequest};
pub use planner::{FileInstruction, PercentRounding};
pub use reader::{ReadResult, SplitReader};
pub use shard::file::read_table;
pub use shard::{FileShardReader, ShardReader};
pub use split::{DatasetInfo, SplitDict, SplitInfo};
pub use table::Table;
