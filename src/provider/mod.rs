//! Provider module
//!
//! The public files-storage contract and its local filesystem implementation.

pub mod contract;
pub mod core;

pub use contract::{FilesStorageProvider, ProviderInfo};
pub use self::core::LocalFilesProvider;
