//! Graph loading error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while loading a definition or reconstructing initializer bytes.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum GraphLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse definition {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid tensor '{name}': {reason}")]
    InvalidTensor { name: String, reason: String },

    #[error("invalid external reference for '{name}': {reason}")]
    InvalidExternalReference { name: String, reason: String },

    #[error(
        "external data for '{name}' out of bounds: offset {offset} + length {length} exceeds file size {file_len}"
    )]
    ExternalDataOutOfBounds { name: String, offset: u64, length: u64, file_len: u64 },

    #[error("duplicate initializer name: {0}")]
    DuplicateInitializer(String),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, GraphLoadError>;

impl GraphLoadError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub(crate) fn invalid_tensor(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidTensor { name: name.to_string(), reason: reason.into() }
    }

    pub(crate) fn invalid_reference(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidExternalReference { name: name.to_string(), reason: reason.into() }
    }
}
