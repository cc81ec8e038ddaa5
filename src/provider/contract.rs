//! Files storage contract
//!
//! Virtual paths are UNIX-style and case-insensitive. The root is `None`, `""`
//! or `"/"`, and a leading `/` is optional. Directory paths are returned with a
//! trailing `/`.
//!
//! Hard errors come back as `Err`. A soft failure (overwrite declined, or an I/O
//! error after validation) comes back as `Ok(false)`.

use std::io::{Read, Write};

use crate::error::StorageError;
use crate::storage::FileDetails;

/// Static description of a provider implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
}

/// Files and page attachments exposed to the wiki.
pub trait FilesStorageProvider {
    fn provider_info(&self) -> &ProviderInfo;

    fn list_files(&self, directory: Option<&str>) -> Result<Vec<String>, StorageError>;

    fn list_directories(&self, directory: Option<&str>) -> Result<Vec<String>, StorageError>;

    fn store_file(&self, full_name: &str, source: &mut dyn Read, overwrite: bool) -> Result<bool, StorageError>;

    fn retrieve_file(&self, full_name: &str, sink: &mut dyn Write) -> Result<bool, StorageError>;

    /// `None` if the file does not exist.
    fn file_details(&self, full_name: &str) -> Result<Option<FileDetails>, StorageError>;

    fn delete_file(&self, full_name: &str) -> Result<bool, StorageError>;

    fn rename_file(&self, old_full_name: &str, new_full_name: &str) -> Result<bool, StorageError>;

    fn create_directory(&self, path: Option<&str>, name: &str) -> Result<bool, StorageError>;

    fn delete_directory(&self, path: &str) -> Result<bool, StorageError>;

    fn rename_directory(&self, old_path: &str, new_path: &str) -> Result<bool, StorageError>;

    fn pages_with_attachments(&self) -> Result<Vec<String>, StorageError>;

    /// Empty if the page has no attachments.
    fn list_page_attachments(&self, page: &str) -> Result<Vec<String>, StorageError>;

    fn store_page_attachment(
        &self,
        page: &str,
        name: &str,
        source: &mut dyn Read,
        overwrite: bool,
    ) -> Result<bool, StorageError>;

    fn retrieve_page_attachment(&self, page: &str, name: &str, sink: &mut dyn Write) -> Result<bool, StorageError>;

    /// `None` if either the page or the attachment is absent.
    fn page_attachment_details(&self, page: &str, name: &str) -> Result<Option<FileDetails>, StorageError>;

    fn delete_page_attachment(&self, page: &str, name: &str) -> Result<bool, StorageError>;

    fn rename_page_attachment(&self, page: &str, old_name: &str, new_name: &str) -> Result<bool, StorageError>;

    /// Must be called by the page manager inside every page rename. Without it
    /// the attachment set stays under the old key.
    fn notify_page_renaming(&self, old_page: &str, new_page: &str) -> Result<(), StorageError>;
}
