use std::path::{Path, PathBuf};

/// Failures of the load and aggregation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// A source file is missing, unreadable, or does not have the expected shape.
    #[error("invalid data in {path:?}: {reason}")]
    Format { path: PathBuf, reason: String },

    /// A selection names a locality with no records.
    #[error("unknown locality: {0}")]
    UnknownLocality(String),
}

impl DataError {
    pub fn format(path: &Path, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}
