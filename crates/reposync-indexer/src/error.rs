//! Indexer error types.

use reposync_core::CoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during indexing and sync operations.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse file with tree-sitter
    #[error("Parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Vector store error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Named collection does not exist
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Named collection already exists
    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    /// Version-control command failed
    #[error("VCS error: {0}")]
    Vcs(String),

    /// Embedding model failed to load or run
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Token encoding could not be loaded
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Path not found
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] CoreError),
}

impl From<serde_json::Error> for IndexerError {
    fn from(e: serde_json::Error) -> Self {
        IndexerError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for IndexerError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        IndexerError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for IndexerError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        IndexerError::Serialization(e.to_string())
    }
}
