//! Save path error types.

use std::io;
use std::path::PathBuf;

use extinit_graph::GraphLoadError;
use thiserror::Error;

/// Errors produced by a save operation.
///
/// Every variant is fatal: a failed save leaves no consistent artifacts, and
/// the caller is responsible for discarding whatever was written.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("graph load failed: {0}")]
    GraphLoad(#[from] GraphLoadError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("definition serialization failed: {0}")]
    Format(#[from] serde_json::Error),

    #[error("invalid save options: {0}")]
    InvalidOptions(String),

    #[error("invalid external data path {path}: {reason}")]
    InvalidExternalPath { path: PathBuf, reason: String },

    #[error("external data offset overflow writing '{name}' at {offset} (+{length} bytes)")]
    OffsetOverflow { name: String, offset: u64, length: u64 },

    #[error("invalid prepack manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid prepack entry '{name}': {reason}")]
    InvalidPrepackEntry { name: String, reason: String },

    #[error(
        "prepacked tensor '{name}' is {prepacked} bytes, smaller than the {original}-byte original"
    )]
    PrepackShrinks { name: String, original: u64, prepacked: u64 },
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, SerializationError>;

impl SerializationError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
