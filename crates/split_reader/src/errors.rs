use std::path::PathBuf;

use arrow::error::ArrowError;

#[derive(Debug, thiserror::Error)]
pub enum SplitReadError {
    #[error("Failed to parse split selection '{input}': {msg} (near '{near}')")]
    Parse {
        input: String,
        near: String,
        msg: String,
    },

    #[error("Unknown split '{name}'. Known splits: {known:?}")]
    UnknownSplit { name: String, known: Vec<String> },

    #[error("Range error for '{name}': {msg}")]
    Range { name: String, msg: String },

    #[error("Split '{0}' already registered")]
    DuplicateSplit(String),

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid shard payload in '{path}': {msg}")]
    Format { path: PathBuf, msg: String },

    #[error("Schema mismatch during concatenation: {msg}. Conflicting columns: {columns:?}")]
    SchemaMismatch { msg: String, columns: Vec<String> },

    #[error("Cannot infer a schema for an empty result of '{0}'")]
    EmptySchema(String),

    #[error("Invalid dataset metadata in '{path}': {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Arrow(#[from] ArrowError),
}

pub type Result<T, E = SplitReadError> = std::result::Result<T, E>;

impl SplitReadError {
    /// If this error describes a bad request (expression or range) rather than
    /// broken storage.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            SplitReadError::Parse { .. }
                | SplitReadError::UnknownSplit { .. }
                | SplitReadError::Range { .. }
                | SplitReadError::DuplicateSplit(_)
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SplitReadError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        SplitReadError::Format {
            path: path.into(),
            msg: msg.into(),
        }
    }
}

macro_rules! range_error {
    ($name:expr, $($arg:tt)*) => {
        crate::errors::SplitReadError::Range {
            name: ($name).to_string(),
            msg: std::format!($($arg)*),
        }
    };
}
pub(crate) use range_error;
