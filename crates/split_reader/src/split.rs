//! Split metadata for a dataset.
use std::fs;
use std::path::Path;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SplitReadError, range_error};

/// Name of the metadata file written next to the shards.
pub const DATASET_INFO_FILENAME: &str = "dataset_info.json";

/// A named, fixed-size partition of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitInfo {
    pub name: String,
    pub num_examples: usize,
    /// Row counts of each shard file, in shard order. `None` means the split
    /// is stored in a single file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_lengths: Option<Vec<usize>>,
    #[serde(default)]
    pub num_bytes: u64,
}

impl SplitInfo {
    pub fn new(name: impl Into<String>, num_examples: usize) -> Self {
        SplitInfo {
            name: name.into(),
            num_examples,
            shard_lengths: None,
            num_bytes: 0,
        }
    }

    pub fn with_shard_lengths(mut self, shard_lengths: Vec<usize>) -> Self {
        self.shard_lengths = Some(shard_lengths);
        self
    }

    pub fn num_shards(&self) -> usize {
        match &self.shard_lengths {
            Some(lengths) => lengths.len().max(1),
            None => 1,
        }
    }

    /// Row counts for each shard of this split.
    pub fn shard_row_counts(&self) -> Vec<usize> {
        match &self.shard_lengths {
            Some(lengths) if !lengths.is_empty() => lengths.clone(),
            _ => vec![self.num_examples],
        }
    }

    fn validate(&self) -> Result<()> {
        if let Some(lengths) = &self.shard_lengths {
            let total = lengths
                .iter()
                .try_fold(0_usize, |acc, &len| acc.checked_add(len))
                .ok_or_else(|| range_error!(self.name, "shard lengths overflow"))?;
            if total != self.num_examples {
                return Err(range_error!(
                    self.name,
                    "shard lengths sum to {total}, but split declares {} examples",
                    self.num_examples
                ));
            }
        }
        Ok(())
    }
}

/// Splits keyed by name.
///
/// Enumeration follows insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SplitDict {
    splits: IndexMap<String, SplitInfo>,
}

impl SplitDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_split_infos(infos: impl IntoIterator<Item = SplitInfo>) -> Result<Self> {
        let mut dict = SplitDict::new();
        for info in infos {
            dict.add(info)?;
        }
        Ok(dict)
    }

    pub fn add(&mut self, info: SplitInfo) -> Result<()> {
        if self.splits.contains_key(&info.name) {
            return Err(SplitReadError::DuplicateSplit(info.name));
        }
        info.validate()?;
        self.splits.insert(info.name.clone(), info);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&SplitInfo> {
        self.splits.get(name)
    }

    /// Get a split, erroring if it isn't registered.
    pub fn try_get(&self, name: &str) -> Result<&SplitInfo> {
        self.splits
            .get(name)
            .ok_or_else(|| SplitReadError::UnknownSplit {
                name: name.to_string(),
                known: self.names().map(|s| s.to_string()).collect(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.splits.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SplitInfo> {
        self.splits.values()
    }

    pub fn len(&self) -> usize {
        self.splits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }

    pub fn total_num_examples(&self) -> usize {
        self.splits.values().map(|s| s.num_examples).sum()
    }
}

/// Metadata describing a dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetInfo {
    pub dataset_name: Option<String>,
    pub description: String,
    /// Schema of every shard. Used when a read resolves to no shards.
    pub features: Option<SchemaRef>,
    pub splits: SplitDict,
}

impl DatasetInfo {
    pub fn new(splits: SplitDict) -> Self {
        DatasetInfo {
            splits,
            ..Default::default()
        }
    }

    pub fn with_features(mut self, features: SchemaRef) -> Self {
        self.features = Some(features);
        self
    }

    pub fn with_dataset_name(mut self, name: impl Into<String>) -> Self {
        self.dataset_name = Some(name.into());
        self
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        let json: DatasetInfoJson = serde_json::from_str(s)?;
        DatasetInfo::try_from(json).map_err(<serde_json::Error as serde::de::Error>::custom)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&DatasetInfoJson::from(self))
    }

    /// Load `dataset_info.json` from a directory.
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self> {
        let path = dir.as_ref().join(DATASET_INFO_FILENAME);
        let s = fs::read_to_string(&path).map_err(|e| SplitReadError::io(&path, e))?;
        Self::from_json(&s).map_err(|source| SplitReadError::Metadata { path, source })
    }

    /// Write `dataset_info.json` into a directory.
    pub fn write_to_directory(&self, dir: impl AsRef<Path>) -> Result<()> {
        let path = dir.as_ref().join(DATASET_INFO_FILENAME);
        let s = self.to_json().map_err(|source| SplitReadError::Metadata {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, s).map_err(|e| SplitReadError::io(&path, e))
    }
}

/// On-disk shape of the dataset info.
#[derive(Debug, Serialize, Deserialize)]
struct DatasetInfoJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dataset_name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    features: Option<Vec<FeatureJson>>,
    #[serde(default)]
    splits: SplitDict,
}

#[derive(Debug, Serialize, Deserialize)]
struct FeatureJson {
    name: String,
    dtype: String,
    #[serde(default = "default_nullable")]
    nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl From<&DatasetInfo> for DatasetInfoJson {
    fn from(info: &DatasetInfo) -> Self {
        let features = info.features.as_ref().map(|schema| {
            schema
                .fields()
                .iter()
                .map(|f| FeatureJson {
                    name: f.name().clone(),
                    dtype: dtype_name(f.data_type()),
                    nullable: f.is_nullable(),
                })
                .collect()
        });

        DatasetInfoJson {
            dataset_name: info.dataset_name.clone(),
            description: info.description.clone(),
            features,
            splits: info.splits.clone(),
        }
    }
}

impl TryFrom<DatasetInfoJson> for DatasetInfo {
    type Error = String;

    fn try_from(json: DatasetInfoJson) -> Result<Self, Self::Error> {
        let features = match json.features {
            Some(features) => {
                let fields = features
                    .into_iter()
                    .map(|f| Ok(Field::new(f.name, parse_dtype(&f.dtype)?, f.nullable)))
                    .collect::<Result<Vec<_>, String>>()?;
                Some(Arc::new(Schema::new(fields)))
            }
            None => None,
        };

        let mut splits = SplitDict::new();
        for (key, split) in json.splits.splits {
            if key != split.name {
                return Err(format!(
                    "split keyed as '{key}' is named '{}'",
                    split.name
                ));
            }
            // Re-validate through `add` so bad shard lengths are caught on load.
            splits.add(split).map_err(|e| e.to_string())?;
        }

        Ok(DatasetInfo {
            dataset_name: json.dataset_name,
            description: json.description,
            features,
            splits,
        })
    }
}

fn dtype_name(datatype: &DataType) -> String {
    match datatype {
        DataType::Boolean => "bool".to_string(),
        DataType::Int8 => "int8".to_string(),
        DataType::Int16 => "int16".to_string(),
        DataType::Int32 => "int32".to_string(),
        DataType::Int64 => "int64".to_string(),
        DataType::UInt8 => "uint8".to_string(),
        DataType::UInt16 => "uint16".to_string(),
        DataType::UInt32 => "uint32".to_string(),
        DataType::UInt64 => "uint64".to_string(),
        DataType::Float32 => "float32".to_string(),
        DataType::Float64 => "float64".to_string(),
        DataType::Utf8 => "string".to_string(),
        DataType::LargeUtf8 => "large_string".to_string(),
        DataType::Binary => "binary".to_string(),
        DataType::LargeBinary => "large_binary".to_string(),
        other => other.to_string(),
    }
}

fn parse_dtype(s: &str) -> Result<DataType, String> {
    Ok(match s {
        "bool" => DataType::Boolean,
        "int8" => DataType::Int8,
        "int16" => DataType::Int16,
        "int32" => DataType::Int32,
        "int64" => DataType::Int64,
        "uint8" => DataType::UInt8,
        "uint16" => DataType::UInt16,
        "uint32" => DataType::UInt32,
        "uint64" => DataType::UInt64,
        "float32" => DataType::Float32,
        "float64" => DataType::Float64,
        "string" => DataType::Utf8,
        "large_string" => DataType::LargeUtf8,
        "binary" => DataType::Binary,
        "large_binary" => DataType::LargeBinary,
        other => return Err(format!("Unsupported feature dtype: {other}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_preserves_insertion_order() {
        let dict =
            SplitDict::from_split_infos([SplitInfo::new("train", 100), SplitInfo::new("test", 10)])
                .unwrap();

        let names: Vec<_> = dict.names().collect();
        assert_eq!(vec!["train", "test"], names);
        assert_eq!(110, dict.total_num_examples());
    }

    #[test]
    fn add_duplicate_split() {
        let mut dict = SplitDict::new();
        dict.add(SplitInfo::new("train", 100)).unwrap();

        let err = dict.add(SplitInfo::new("train", 5)).unwrap_err();
        assert!(matches!(err, SplitReadError::DuplicateSplit(name) if name == "train"));
    }

    #[test]
    fn shard_lengths_must_sum_to_num_examples() {
        let mut dict = SplitDict::new();
        let err = dict
            .add(SplitInfo::new("train", 100).with_shard_lengths(vec![40, 40]))
            .unwrap_err();
        assert!(matches!(err, SplitReadError::Range { .. }));
    }

    #[test]
    fn shard_lengths_overflow() {
        let mut dict = SplitDict::new();
        let err = dict
            .add(SplitInfo::new("train", 1).with_shard_lengths(vec![usize::MAX, 2]))
            .unwrap_err();
        match err {
            SplitReadError::Range { name, msg } => {
                assert_eq!("train", name);
                assert!(msg.contains("overflow"), "msg: {msg}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn try_get_unknown() {
        let dict = SplitDict::from_split_infos([SplitInfo::new("train", 100)]).unwrap();
        let err = dict.try_get("validation").unwrap_err();
        match err {
            SplitReadError::UnknownSplit { name, known } => {
                assert_eq!("validation", name);
                assert_eq!(vec!["train".to_string()], known);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn dataset_info_json() {
        let splits = SplitDict::from_split_infos([
            SplitInfo::new("train", 30).with_shard_lengths(vec![10, 20]),
            SplitInfo::new("test", 5),
        ])
        .unwrap();
        let schema = Arc::new(Schema::new(vec![
            Field::new("text", DataType::Utf8, true),
            Field::new("label", DataType::Int64, false),
        ]));
        let info = DatasetInfo::new(splits)
            .with_features(schema)
            .with_dataset_name("imdb");

        let json = info.to_json().unwrap();
        let got = DatasetInfo::from_json(&json).unwrap();
        assert_eq!(info, got);
    }

    #[test]
    fn dataset_info_json_rejects_unknown_dtype() {
        let json = r#"{"features": [{"name": "a", "dtype": "tensor"}], "splits": {}}"#;
        assert!(DatasetInfo::from_json(json).is_err());
    }

    #[test]
    fn dataset_info_json_rejects_mismatched_key() {
        let json = r#"{"splits": {"train": {"name": "test", "num_examples": 10}}}"#;
        let err = DatasetInfo::from_json(json).unwrap_err();
        assert!(err.to_string().contains("keyed as 'train'"), "{err}");
    }

    #[test]
    fn dataset_info_json_rejects_overflowing_shard_lengths() {
        let json = format!(
            r#"{{"splits": {{"train": {{"name": "train", "num_examples": 1, "shard_lengths": [{}, 2]}}}}}}"#,
            usize::MAX
        );
        assert!(DatasetInfo::from_json(&json).is_err());
    }

    #[test]
    fn dataset_info_directory() {
        let dir = tempfile::tempdir().unwrap();
        let info =
            DatasetInfo::new(SplitDict::from_split_infos([SplitInfo::new("train", 3)]).unwrap());
        info.write_to_directory(dir.path()).unwrap();

        let got = DatasetInfo::from_directory(dir.path()).unwrap();
        assert_eq!(info, got);
    }

    #[test]
    fn dataset_info_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = DatasetInfo::from_directory(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, SplitReadError::Io { .. }));
    }
}
