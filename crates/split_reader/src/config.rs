use std::path::PathBuf;

use crate::planner::PercentRounding;

/// Environment variable for the default memory mode.
pub const ENV_IN_MEMORY: &str = "SPLIT_READER_IN_MEMORY";
/// Environment variable for the directory holding shard files.
pub const ENV_BASE_DIR: &str = "SPLIT_READER_BASE_DIR";

pub const DEFAULT_FILE_SUFFIX: &str = "arrow";

/// Configuration for a split reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Directory containing the shard files.
    pub base_dir: PathBuf,
    /// Extension appended to shard file names. `None` for no extension.
    pub file_suffix: Option<String>,
    /// Copy shards onto the heap instead of mapping them. Can be overridden
    /// per read.
    pub in_memory: bool,
    pub rounding: PercentRounding,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            base_dir: PathBuf::new(),
            file_suffix: Some(DEFAULT_FILE_SUFFIX.to_string()),
            in_memory: false,
            rounding: PercentRounding::Floor,
        }
    }
}

impl ReaderConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        ReaderConfig {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    /// Build a config from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut conf = ReaderConfig::default();
        if let Some(dir) = get(ENV_BASE_DIR) {
            conf.base_dir = PathBuf::from(dir);
        }
        if let Some(v) = get(ENV_IN_MEMORY) {
            conf.in_memory = matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        conf
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn with_file_suffix(mut self, suffix: Option<&str>) -> Self {
        self.file_suffix = suffix.map(|s| s.to_string());
        self
    }

    pub fn with_in_memory(mut self, in_memory: bool) -> Self {
        self.in_memory = in_memory;
        self
    }

    pub fn with_rounding(mut self, rounding: PercentRounding) -> Self {
        self.rounding = rounding;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults() {
        let conf = ReaderConfig::default();
        assert!(!conf.in_memory);
        assert_eq!(Some("arrow"), conf.file_suffix.as_deref());
        assert_eq!(PercentRounding::Floor, conf.rounding);
    }

    #[test]
    fn from_vars() {
        let vars: HashMap<_, _> = [(ENV_IN_MEMORY, "TRUE"), (ENV_BASE_DIR, "/data/cache")]
            .into_iter()
            .collect();
        let conf = ReaderConfig::from_vars(|k| vars.get(k).map(|v| v.to_string()));

        assert!(conf.in_memory);
        assert_eq!(PathBuf::from("/data/cache"), conf.base_dir);
    }

    #[test]
    fn from_vars_unset() {
        let conf = ReaderConfig::from_vars(|_| None);
        assert_eq!(ReaderConfig::default(), conf);
    }
}
