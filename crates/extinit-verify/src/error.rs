//! Verification error types.

use std::io;
use std::path::PathBuf;

use extinit_graph::{DataLocation, GraphLoadError};
use extinit_save::SerializationError;
use thiserror::Error;

/// A rewritten model that does not honor the save contract, or a failure
/// to produce or read one.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("graph load failed: {0}")]
    GraphLoad(#[from] GraphLoadError),

    #[error("save failed: {0}")]
    Save(#[from] SerializationError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("output {path} would overwrite part of the input model")]
    OutputOverlapsInput { path: PathBuf },

    #[error("initializer count mismatch: {original} original, {rewritten} rewritten")]
    CountMismatch { original: usize, rewritten: usize },

    #[error("rewritten initializer '{name}' has no original counterpart")]
    MissingInitializer { name: String },

    #[error("original initializer '{name}' is absent from the rewritten model")]
    DroppedInitializer { name: String },

    #[error("initializer '{name}' has prepacked variants but was kept unqualified")]
    UnreplacedInitializer { name: String },

    #[error("prepacked variant '{name}' is absent from the rewritten model")]
    MissingVariant { name: String },

    #[error("size mismatch for '{name}': {original} bytes original, {rewritten} bytes rewritten")]
    SizeMismatch { name: String, original: u64, rewritten: u64 },

    #[error("location mismatch for '{name}': expected {expected:?}, found {actual:?}")]
    LocationMismatch { name: String, expected: DataLocation, actual: DataLocation },

    #[error("data mismatch for '{name}' at byte {first_difference}")]
    DataMismatch { name: String, first_difference: usize },

    #[error("offset {offset} of '{name}' is not a multiple of {granularity}")]
    AlignmentViolation { name: String, offset: u64, granularity: u64 },

    #[error("invalid external reference for '{name}': {reason}")]
    InvalidReference { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, VerifyError>;
