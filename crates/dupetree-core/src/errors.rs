//! Error types for dupetree-core.
//!
//! All fallible core operations return [`DupetreeResult`]. Configuration
//! errors are fatal; I/O errors on individual files are not caught here
//! except where a missing path is substituted by a sentinel fingerprint
//! (see the `fingerprint` module).

use std::path::{Path, PathBuf};

use thiserror::Error;

pub type DupetreeResult<T> = Result<T, DupetreeError>;

#[derive(Debug, Error)]
pub enum DupetreeError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown file/dir type: {path}")]
    UnknownPathType { path: PathBuf },

    #[error("i/o failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("worker pool failure: {0}")]
    Worker(String),

    #[error("serialization failure: {0}")]
    Serialization(String),

    #[error("invalid size string: {0}")]
    InvalidSize(String),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl DupetreeError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn unknown_path_type(path: impl Into<PathBuf>) -> Self {
        Self::UnknownPathType { path: path.into() }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn worker(msg: impl Into<String>) -> Self {
        Self::Worker(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    pub fn invalid_size(msg: impl Into<String>) -> Self {
        Self::InvalidSize(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }
}
