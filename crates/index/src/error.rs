//! Index error types

use docchat_core::ServiceError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("Corpus root not found or not a directory: {}", .0.display())]
    CorpusNotFound(PathBuf),

    #[error("No documents with extensions [{extensions}] found under {}", root.display())]
    EmptyCorpus { root: PathBuf, extensions: String },

    #[error("Failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("No document produced any text to index")]
    NothingToIndex,

    #[error("Index build failed: {0}")]
    IndexBuildFailed(#[from] ServiceError),
}

pub type Result<T> = std::result::Result<T, IndexError>;
