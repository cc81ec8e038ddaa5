//! Error types
//!
//! Hard errors of the files provider. Soft failures never appear here; they are
//! reported through [`crate::storage::OpOutcome`].

use std::io;

use thiserror::Error;

/// Errors propagated to the caller as programming or usage mistakes.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    #[error("Directory already exists: {0}")]
    DirectoryAlreadyExists(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
