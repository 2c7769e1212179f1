use std::path::PathBuf;
use thiserror::Error;

/// Result type for corpus operations
pub type Result<T> = std::result::Result<T, CorpusError>;

/// Errors that can occur while loading a record collection
#[derive(Error, Debug)]
pub enum CorpusError {
    /// The index file could not be read
    #[error("Failed to read index {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSONL line is not a valid record object
    #[error("Invalid record on line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl CorpusError {
    /// Create an IO error bound to the offending path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// 1-based line number for JSON errors
    #[must_use]
    pub const fn line(&self) -> Option<usize> {
        match self {
            Self::Json { line, .. } => Some(*line),
            Self::Io { .. } => None,
        }
    }
}
