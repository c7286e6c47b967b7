//! Entry point composing parsing, planning, shard reads and assembly.
use arrow::datatypes::SchemaRef;
use indexmap::IndexMap;
use tracing::debug;

use crate::assemble::assemble;
use crate::config::ReaderConfig;
use crate::errors::Result;
use crate::instruction::ReadInstruction;
use crate::planner::{FileInstruction, PlannedSlice, SlicePlanner, file_instructions};
use crate::shard::{FileShardReader, ShardReader};
use crate::split::{DatasetInfo, SplitDict, SplitInfo};
use crate::table::Table;

/// Output of a read.
#[derive(Debug)]
pub struct ReadResult {
    pub table: Table,
    /// Dataset info with splits replaced by the row counts actually read.
    pub info: DatasetInfo,
    /// Label of the split that was read, the selection expression.
    pub split: String,
}

/// Reads splits of a dataset stored as shard files.
#[derive(Debug)]
pub struct SplitReader<R: ShardReader = FileShardReader> {
    config: ReaderConfig,
    info: DatasetInfo,
    shard_reader: R,
}

impl SplitReader<FileShardReader> {
    pub fn new(config: ReaderConfig, info: DatasetInfo) -> Self {
        Self::with_shard_reader(config, info, FileShardReader)
    }
}

impl<R: ShardReader> SplitReader<R> {
    pub fn with_shard_reader(config: ReaderConfig, info: DatasetInfo, shard_reader: R) -> Self {
        SplitReader {
            config,
            info,
            shard_reader,
        }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn info(&self) -> &DatasetInfo {
        &self.info
    }

    pub fn shard_reader(&self) -> &R {
        &self.shard_reader
    }

    fn planner<'a>(&'a self, name: &'a str) -> SlicePlanner<'a> {
        SlicePlanner::new(&self.config.base_dir, name)
            .with_suffix(self.config.file_suffix.as_deref())
            .with_rounding(self.config.rounding)
    }

    /// Resolve an instruction into planned slices without reading anything.
    pub fn plan(
        &self,
        name: &str,
        instruction: &ReadInstruction,
        known_splits: &SplitDict,
    ) -> Result<Vec<PlannedSlice>> {
        self.planner(name).plan(instruction, known_splits)
    }

    /// Read the splits selected by `instructions` for dataset `name`.
    ///
    /// `in_memory` overrides the configured memory mode when set.
    pub fn read(
        &self,
        name: &str,
        instructions: &str,
        known_splits: &SplitDict,
        in_memory: Option<bool>,
    ) -> Result<ReadResult> {
        let instruction: ReadInstruction = instructions.parse()?;
        self.read_planned(name, &instruction, instructions, known_splits, in_memory)
    }

    /// Same as `read`, but with an already built instruction.
    pub fn read_instruction(
        &self,
        name: &str,
        instruction: &ReadInstruction,
        known_splits: &SplitDict,
        in_memory: Option<bool>,
    ) -> Result<ReadResult> {
        let label = instruction.to_string();
        self.read_planned(name, instruction, &label, known_splits, in_memory)
    }

    /// Read pre-resolved file instructions, skipping parsing and planning.
    pub fn read_files(
        &self,
        files: &[FileInstruction],
        original_instructions: &str,
        in_memory: Option<bool>,
    ) -> Result<ReadResult> {
        let table = self.read_tables(
            original_instructions,
            files,
            in_memory,
            self.info.features.clone(),
        )?;

        let mut splits = SplitDict::new();
        if !original_instructions.is_empty() {
            splits.add(SplitInfo::new(original_instructions, table.num_rows()))?;
        }

        Ok(ReadResult {
            table,
            info: DatasetInfo {
                splits,
                ..self.info.clone()
            },
            split: original_instructions.to_string(),
        })
    }

    fn read_planned(
        &self,
        name: &str,
        instruction: &ReadInstruction,
        label: &str,
        known_splits: &SplitDict,
        in_memory: Option<bool>,
    ) -> Result<ReadResult> {
        let slices = self.plan(name, instruction, known_splits)?;
        let files = file_instructions(&slices);

        let fallback_schema = if files.is_empty() {
            self.empty_result_schema(name, &slices, known_splits)?
        } else {
            None
        };

        let table = self.read_tables(label, &files, in_memory, fallback_schema)?;

        let mut realized: IndexMap<&str, usize> = IndexMap::new();
        for slice in &slices {
            *realized.entry(slice.split_name.as_str()).or_default() += slice.num_rows();
        }
        let splits = SplitDict::from_split_infos(
            realized
                .into_iter()
                .map(|(split, rows)| SplitInfo::new(split, rows)),
        )?;

        Ok(ReadResult {
            table,
            info: DatasetInfo {
                splits,
                ..self.info.clone()
            },
            split: label.to_string(),
        })
    }

    fn read_tables(
        &self,
        label: &str,
        files: &[FileInstruction],
        in_memory: Option<bool>,
        fallback_schema: Option<SchemaRef>,
    ) -> Result<Table> {
        let in_memory = in_memory.unwrap_or(self.config.in_memory);

        let tables = files
            .iter()
            .map(|file| self.shard_reader.open(file, in_memory))
            .collect::<Result<Vec<_>>>()?;

        let table = assemble(label, tables, fallback_schema)?;
        debug!(
            %label,
            in_memory,
            num_files = files.len(),
            num_rows = table.num_rows(),
            "read split"
        );

        Ok(table)
    }

    /// Find a schema for a read that selected zero rows.
    ///
    /// Uses the dataset's features if known, otherwise the schema stored in
    /// the first shard of the first selected split. Errors reading that shard
    /// are returned as is.
    fn empty_result_schema(
        &self,
        name: &str,
        slices: &[PlannedSlice],
        known_splits: &SplitDict,
    ) -> Result<Option<SchemaRef>> {
        if let Some(features) = &self.info.features {
            return Ok(Some(features.clone()));
        }

        let path = slices
            .first()
            .and_then(|slice| known_splits.get(&slice.split_name))
            .and_then(|split| self.planner(name).shard_files(split).into_iter().next());
        let Some(path) = path else {
            return Ok(None);
        };

        debug!(?path, "inferring schema for empty read");
        let schema = self.shard_reader.read_schema(&path)?;
        Ok(Some(schema))
    }
}
