//! Sandboxed, case-insensitive file and attachment storage for a wiki.

pub mod attachments;
pub mod config;
pub mod error;
pub mod provider;
pub mod storage;
pub mod utils;

pub use crate::config::StorageConfig;
pub use error::StorageError;
pub use provider::{FilesStorageProvider, LocalFilesProvider, ProviderInfo};
pub use storage::{FileDetails, OpOutcome};
