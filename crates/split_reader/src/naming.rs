//! Shard file naming shared with the dataset builder.
use std::path::{Path, PathBuf};

/// Prefix for every shard file of a split, `<dataset>-<split>`.
pub fn filename_prefix_for_split(dataset_name: &str, split: &str) -> String {
    format!("{dataset_name}-{split}")
}

/// Paths of all shard files for a split, in shard order.
///
/// A single shard is named `<dataset>-<split>[.<suffix>]`. Multiple shards
/// are named `<dataset>-<split>-00000-of-00003[.<suffix>]`.
pub fn filenames_for_dataset_split(
    base_dir: &Path,
    dataset_name: &str,
    split: &str,
    suffix: Option<&str>,
    num_shards: usize,
) -> Vec<PathBuf> {
    let prefix = filename_prefix_for_split(dataset_name, split);
    let ext = match suffix {
        Some(suffix) if !suffix.is_empty() => format!(".{suffix}"),
        _ => String::new(),
    };

    if num_shards <= 1 {
        return vec![base_dir.join(format!("{prefix}{ext}"))];
    }

    (0..num_shards)
        .map(|idx| base_dir.join(format!("{prefix}-{idx:05}-of-{num_shards:05}{ext}")))
        .collect()
}
