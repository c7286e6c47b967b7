//! Resolve slice requests against split metadata and map the resulting rows
//! onto shard files.
use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::errors::{Result, range_error};
use crate::instruction::{Bound, ReadInstruction, SliceRequest};
use crate::naming::filenames_for_dataset_split;
use crate::split::{SplitDict, SplitInfo};

/// A resolved read of a single shard file.
///
/// Both `skip` and `take` being `None` means the whole file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInstruction {
    pub filename: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take: Option<usize>,
}

impl FileInstruction {
    pub fn whole(filename: impl Into<PathBuf>) -> Self {
        FileInstruction {
            filename: filename.into(),
            skip: None,
            take: None,
        }
    }

    pub fn sliced(filename: impl Into<PathBuf>, skip: usize, take: usize) -> Self {
        FileInstruction {
            filename: filename.into(),
            skip: Some(skip),
            take: Some(take),
        }
    }
}

/// How percentage bounds are turned into row indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PercentRounding {
    /// `floor(num_examples * pct / 100)`
    #[default]
    Floor,
    /// Round half up to the closest row.
    Closest,
}

impl PercentRounding {
    pub fn apply(&self, num_examples: usize, pct: u8) -> usize {
        let scaled = num_examples as u128 * pct as u128;
        let rows = match self {
            PercentRounding::Floor => scaled / 100,
            PercentRounding::Closest => (scaled + 50) / 100,
        };
        rows as usize
    }
}

/// Rows and files resolved for one term of a selection expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSlice {
    pub split_name: String,
    /// Absolute row range within the split. May be empty.
    pub rows: Range<usize>,
    pub files: Vec<FileInstruction>,
}

impl PlannedSlice {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }
}

/// Flatten planned slices into file instructions, keeping expression order.
pub fn file_instructions(slices: &[PlannedSlice]) -> Vec<FileInstruction> {
    slices.iter().flat_map(|s| s.files.iter().cloned()).collect()
}

#[derive(Debug, Clone)]
pub struct SlicePlanner<'a> {
    base_dir: &'a Path,
    dataset_name: &'a str,
    suffix: Option<&'a str>,
    rounding: PercentRounding,
}

impl<'a> SlicePlanner<'a> {
    pub fn new(base_dir: &'a Path, dataset_name: &'a str) -> Self {
        SlicePlanner {
            base_dir,
            dataset_name,
            suffix: None,
            rounding: PercentRounding::default(),
        }
    }

    pub fn with_suffix(mut self, suffix: Option<&'a str>) -> Self {
        self.suffix = suffix;
        self
    }

    pub fn with_rounding(mut self, rounding: PercentRounding) -> Self {
        self.rounding = rounding;
        self
    }

    /// Plan every term of the instruction, in expression order.
    pub fn plan(
        &self,
        instruction: &ReadInstruction,
        known_splits: &SplitDict,
    ) -> Result<Vec<PlannedSlice>> {
        instruction
            .requests()
            .iter()
            .map(|request| {
                let split = known_splits.try_get(&request.split_name)?;
                self.plan_request(request, split)
            })
            .collect()
    }

    pub fn plan_request(&self, request: &SliceRequest, split: &SplitInfo) -> Result<PlannedSlice> {
        let rows = self.resolve_rows(request, split)?;

        let files = if rows.is_empty() {
            Vec::new()
        } else {
            let shards: Vec<_> = self
                .shard_files(split)
                .into_iter()
                .zip(split.shard_row_counts())
                .collect();
            distribute_rows(&rows, &shards)
        };

        debug!(
            split = %split.name,
            start = rows.start,
            end = rows.end,
            num_files = files.len(),
            "planned slice"
        );

        Ok(PlannedSlice {
            split_name: split.name.clone(),
            rows,
            files,
        })
    }

    /// Resolve a request to an absolute `[start, end)` row range.
    ///
    /// A start at or after the end produces an empty range.
    pub fn resolve_rows(&self, request: &SliceRequest, split: &SplitInfo) -> Result<Range<usize>> {
        let start = match request.start {
            Some(bound) => self.resolve_bound(split, bound)?,
            None => 0,
        };
        let end = match request.end {
            Some(bound) => self.resolve_bound(split, bound)?,
            None => split.num_examples,
        };

        if start >= end {
            return Ok(start..start);
        }
        Ok(start..end)
    }

    fn resolve_bound(&self, split: &SplitInfo, bound: Bound) -> Result<usize> {
        let limit = split.num_examples;
        match bound {
            Bound::Absolute(v) => {
                if v < 0 || v as u128 > limit as u128 {
                    return Err(range_error!(
                        split.name,
                        "bound {bound} outside of [0, {limit}]"
                    ));
                }
                Ok(v as usize)
            }
            Bound::Percent(pct) => {
                if !(0..=100).contains(&pct) {
                    return Err(range_error!(
                        split.name,
                        "bound {bound} outside of [0%, 100%] (split has {limit} examples)"
                    ));
                }
                Ok(self.rounding.apply(limit, pct as u8))
            }
        }
    }

    /// Shard file paths for a split, in shard order.
    pub fn shard_files(&self, split: &SplitInfo) -> Vec<PathBuf> {
        filenames_for_dataset_split(
            self.base_dir,
            self.dataset_name,
            &split.name,
            self.suffix,
            split.num_shards(),
        )
    }
}

/// Map a row range onto consecutive shards.
fn distribute_rows(rows: &Range<usize>, shards: &[(PathBuf, usize)]) -> Vec<FileInstruction> {
    let mut instructions = Vec::new();
    let mut offset = 0;

    for (path, len) in shards {
        let shard_start = offset;
        let shard_end = offset + len;
        offset = shard_end;

        if *len == 0 || shard_end <= rows.start || shard_start >= rows.end {
            continue;
        }

        let skip = rows.start.saturating_sub(shard_start);
        let take = rows.end.min(shard_end) - (shard_start + skip);
        trace!(?path, shard_start, skip, take, "shard intersects rows");

        if skip == 0 && take == *len {
            instructions.push(FileInstruction::whole(path));
        } else {
            instructions.push(FileInstruction::sliced(path, skip, take));
        }
    }

    instructions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SplitReadError;

    fn splits() -> SplitDict {
        SplitDict::from_split_infos([
            SplitInfo::new("train", 100),
            SplitInfo::new("test", 100),
            SplitInfo::new("sharded", 30).with_shard_lengths(vec![10, 10, 10]),
        ])
        .unwrap()
    }

    fn plan(expr: &str) -> Result<Vec<PlannedSlice>> {
        let planner = SlicePlanner::new(Path::new("/data"), "ds");
        planner.plan(&expr.parse().unwrap(), &splits())
    }

    fn plan_files(expr: &str) -> Vec<FileInstruction> {
        file_instructions(&plan(expr).unwrap())
    }

    #[test]
    fn whole_split() {
        assert_eq!(vec![FileInstruction::whole("/data/ds-train")], plan_files("train"));
    }

    #[test]
    fn percent_slice() {
        assert_eq!(
            vec![FileInstruction::sliced("/data/ds-test", 0, 33)],
            plan_files("test[:33%]")
        );
    }

    #[test]
    fn percent_floor_for_every_pct() {
        let split = SplitInfo::new("odd", 7);
        let planner = SlicePlanner::new(Path::new(""), "ds");
        for pct in 0..=100 {
            let request = SliceRequest {
                split_name: "odd".to_string(),
                start: None,
                end: Some(Bound::Percent(pct)),
            };
            let rows = planner.resolve_rows(&request, &split).unwrap();
            assert_eq!((7 * pct as usize) / 100, rows.len(), "pct: {pct}");
        }
    }

    #[test]
    fn percent_closest() {
        let split = SplitInfo::new("odd", 7);
        let planner =
            SlicePlanner::new(Path::new(""), "ds").with_rounding(PercentRounding::Closest);
        let request = SliceRequest {
            split_name: "odd".to_string(),
            start: None,
            end: Some(Bound::Percent(50)),
        };
        // 3.5 rounds up.
        assert_eq!(0..4, planner.resolve_rows(&request, &split).unwrap());
    }

    #[test]
    fn union_keeps_expression_order() {
        assert_eq!(
            vec![
                FileInstruction::sliced("/data/ds-test", 90, 10),
                FileInstruction::whole("/data/ds-train"),
            ],
            plan_files("test[90%:]+train")
        );
    }

    #[test]
    fn start_after_end_is_empty() {
        let slices = plan("train[10:5]").unwrap();
        assert_eq!(1, slices.len());
        assert_eq!(0, slices[0].num_rows());
        assert!(slices[0].files.is_empty());
    }

    #[test]
    fn multi_shard_distribution() {
        assert_eq!(
            vec![
                FileInstruction::sliced("/data/ds-sharded-00000-of-00003", 5, 5),
                FileInstruction::whole("/data/ds-sharded-00001-of-00003"),
                FileInstruction::sliced("/data/ds-sharded-00002-of-00003", 0, 2),
            ],
            plan_files("sharded[5:22]")
        );
    }

    #[test]
    fn multi_shard_within_one_shard() {
        assert_eq!(
            vec![FileInstruction::sliced(
                "/data/ds-sharded-00001-of-00003",
                2,
                3
            )],
            plan_files("sharded[12:15]")
        );
    }

    #[test]
    fn shard_boundary_end() {
        assert_eq!(
            vec![FileInstruction::whole("/data/ds-sharded-00000-of-00003")],
            plan_files("sharded[:10]")
        );
    }

    #[test]
    fn percent_over_100() {
        let err = plan("train[:150%]").unwrap_err();
        match err {
            SplitReadError::Range { name, msg } => {
                assert_eq!("train", name);
                assert!(msg.contains("150%"), "msg: {msg}");
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn negative_bounds() {
        assert!(matches!(
            plan("train[-1:]").unwrap_err(),
            SplitReadError::Range { .. }
        ));
        assert!(matches!(
            plan("train[-5%:]").unwrap_err(),
            SplitReadError::Range { .. }
        ));
    }

    #[test]
    fn absolute_past_end() {
        assert!(matches!(
            plan("train[:101]").unwrap_err(),
            SplitReadError::Range { .. }
        ));
        assert_eq!(0..100, plan("train[:100]").unwrap()[0].rows);
    }

    #[test]
    fn unknown_split() {
        assert!(matches!(
            plan("unknown_split[:10%]").unwrap_err(),
            SplitReadError::UnknownSplit { .. }
        ));
    }

    #[test]
    fn file_instruction_json() {
        let json = r#"[{"filename": "train"}, {"filename": "test", "skip": 10, "take": 10}]"#;
        let files: Vec<FileInstruction> = serde_json::from_str(json).unwrap();
        assert_eq!(
            vec![
                FileInstruction::whole("train"),
                FileInstruction::sliced("test", 10, 10)
            ],
            files
        );
    }
}
