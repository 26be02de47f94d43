//! Sentinel error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("health history I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("health history record is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid health policy: {0}")]
    InvalidPolicy(String),
}

impl SentinelError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SentinelError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SentinelError>;
