//! Provider core
//!
//! Provides `LocalFilesProvider`, which owns the file and attachment sandboxes
//! built from a `StorageConfig` and implements the public provider trait.

use std::io::{Read, Write};

use log::info;

use crate::attachments::AttachmentNamespace;
use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::error::handlers::into_legacy;
use crate::provider::contract::{FilesStorageProvider, ProviderInfo};
use crate::storage::{DirectoryTree, FileDetails, FileStore, OpOutcome, PathResolver, VirtualPath};

static PROVIDER_INFO: ProviderInfo = ProviderInfo {
    name: "Local Files Provider",
    version: env!("CARGO_PKG_VERSION"),
    description: "Stores files and page attachments in the local data directory",
};

/// Files provider backed by two sandboxes under the configured data directory:
/// `<data>/<upload_dir>` for files and `<data>/<attachments_dir>` for attachments.
#[derive(Debug)]
pub struct LocalFilesProvider {
    config: StorageConfig,
    files: FileStore,
    tree: DirectoryTree,
    attachments: AttachmentNamespace,
}

impl LocalFilesProvider {
    /// Validate the configuration and create both sandbox roots if absent.
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        config.validate()?;
        let settings = config.io_settings();

        let upload = PathResolver::new(&config.upload_root())?;
        let attachments = PathResolver::new(&config.attachments_root())?;

        info!(
            "Files provider initialised (files: {}, attachments: {})",
            upload.root().display(),
            attachments.root().display()
        );

        Ok(Self {
            files: FileStore::new(upload.clone(), settings),
            tree: DirectoryTree::new(upload, settings),
            attachments: AttachmentNamespace::new(attachments, settings),
            config,
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn file_exists(&self, full_name: &str) -> Result<bool, StorageError> {
        self.files.file_exists(&file_path(full_name)?)
    }

    pub fn directory_exists(&self, path: Option<&str>) -> Result<bool, StorageError> {
        self.tree.directory_exists(&VirtualPath::parse(path)?)
    }

    pub fn try_store_file(
        &self,
        full_name: &str,
        source: &mut dyn Read,
        overwrite: bool,
    ) -> Result<OpOutcome, StorageError> {
        self.files.store_file(&file_path(full_name)?, source, overwrite)
    }

    pub fn try_retrieve_file(&self, full_name: &str, sink: &mut dyn Write) -> Result<OpOutcome, StorageError> {
        self.files.retrieve_file(&file_path(full_name)?, sink)
    }

    pub fn try_delete_file(&self, full_name: &str) -> Result<OpOutcome, StorageError> {
        self.files.delete_file(&file_path(full_name)?)
    }

    pub fn try_rename_file(&self, old_full_name: &str, new_full_name: &str) -> Result<OpOutcome, StorageError> {
        let old = file_path(old_full_name)?;
        let new = file_path(new_full_name)?;
        self.files.rename_file(&old, &new)
    }

    pub fn try_create_directory(&self, path: Option<&str>, name: &str) -> Result<OpOutcome, StorageError> {
        self.tree.create_directory(&VirtualPath::parse(path)?, name)
    }

    pub fn try_delete_directory(&self, path: &str) -> Result<OpOutcome, StorageError> {
        self.tree.delete_directory(&VirtualPath::parse(Some(path))?)
    }

    pub fn try_rename_directory(&self, old_path: &str, new_path: &str) -> Result<OpOutcome, StorageError> {
        let old = VirtualPath::parse(Some(old_path))?;
        let new = VirtualPath::parse(Some(new_path))?;
        self.tree.rename_directory(&old, &new)
    }

    pub fn try_store_page_attachment(
        &self,
        page: &str,
        name: &str,
        source: &mut dyn Read,
        overwrite: bool,
    ) -> Result<OpOutcome, StorageError> {
        self.attachments.store_page_attachment(page, name, source, overwrite)
    }

    pub fn try_retrieve_page_attachment(
        &self,
        page: &str,
        name: &str,
        sink: &mut dyn Write,
    ) -> Result<OpOutcome, StorageError> {
        self.attachments.retrieve_page_attachment(page, name, sink)
    }

    pub fn try_delete_page_attachment(&self, page: &str, name: &str) -> Result<OpOutcome, StorageError> {
        self.attachments.delete_page_attachment(page, name)
    }

    pub fn try_rename_page_attachment(
        &self,
        page: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<OpOutcome, StorageError> {
        self.attachments.rename_page_attachment(page, old_name, new_name)
    }

    pub fn try_notify_page_renaming(&self, old_page: &str, new_page: &str) -> Result<OpOutcome, StorageError> {
        self.attachments.notify_page_renaming(old_page, new_page)
    }

    /// Explicitly drop every attachment of a page (cascade-on-delete policy).
    pub fn purge_page_attachments(&self, page: &str) -> Result<OpOutcome, StorageError> {
        self.attachments.purge_page_attachments(page)
    }
}

impl FilesStorageProvider for LocalFilesProvider {
    fn provider_info(&self) -> &ProviderInfo {
        &PROVIDER_INFO
    }

    fn list_files(&self, directory: Option<&str>) -> Result<Vec<String>, StorageError> {
        let files = self.files.list_files(&VirtualPath::parse(directory)?)?;
        Ok(files.iter().map(VirtualPath::to_file_string).collect())
    }

    fn list_directories(&self, directory: Option<&str>) -> Result<Vec<String>, StorageError> {
        let dirs = self.tree.list_directories(&VirtualPath::parse(directory)?)?;
        Ok(dirs.iter().map(VirtualPath::to_directory_string).collect())
    }

    fn store_file(&self, full_name: &str, source: &mut dyn Read, overwrite: bool) -> Result<bool, StorageError> {
        let outcome = self.try_store_file(full_name, source, overwrite)?;
        Ok(into_legacy("Store file", full_name, outcome))
    }

    fn retrieve_file(&self, full_name: &str, sink: &mut dyn Write) -> Result<bool, StorageError> {
        let outcome = self.try_retrieve_file(full_name, sink)?;
        Ok(into_legacy("Retrieve file", full_name, outcome))
    }

    fn file_details(&self, full_name: &str) -> Result<Option<FileDetails>, StorageError> {
        self.files.file_details(&file_path(full_name)?)
    }

    fn delete_file(&self, full_name: &str) -> Result<bool, StorageError> {
        let outcome = self.try_delete_file(full_name)?;
        Ok(into_legacy("Delete file", full_name, outcome))
    }

    fn rename_file(&self, old_full_name: &str, new_full_name: &str) -> Result<bool, StorageError> {
        let outcome = self.try_rename_file(old_full_name, new_full_name)?;
        Ok(into_legacy("Rename file", old_full_name, outcome))
    }

    fn create_directory(&self, path: Option<&str>, name: &str) -> Result<bool, StorageError> {
        let outcome = self.try_create_directory(path, name)?;
        Ok(into_legacy("Create directory", name, outcome))
    }

    fn delete_directory(&self, path: &str) -> Result<bool, StorageError> {
        let outcome = self.try_delete_directory(path)?;
        Ok(into_legacy("Delete directory", path, outcome))
    }

    fn rename_directory(&self, old_path: &str, new_path: &str) -> Result<bool, StorageError> {
        let outcome = self.try_rename_directory(old_path, new_path)?;
        Ok(into_legacy("Rename directory", old_path, outcome))
    }

    fn pages_with_attachments(&self) -> Result<Vec<String>, StorageError> {
        self.attachments.pages_with_attachments()
    }

    fn list_page_attachments(&self, page: &str) -> Result<Vec<String>, StorageError> {
        self.attachments.list_page_attachments(page)
    }

    fn store_page_attachment(
        &self,
        page: &str,
        name: &str,
        source: &mut dyn Read,
        overwrite: bool,
    ) -> Result<bool, StorageError> {
        let outcome = self.try_store_page_attachment(page, name, source, overwrite)?;
        Ok(into_legacy("Store attachment", &format!("{page}/{name}"), outcome))
    }

    fn retrieve_page_attachment(&self, page: &str, name: &str, sink: &mut dyn Write) -> Result<bool, StorageError> {
        let outcome = self.try_retrieve_page_attachment(page, name, sink)?;
        Ok(into_legacy("Retrieve attachment", &format!("{page}/{name}"), outcome))
    }

    fn page_attachment_details(&self, page: &str, name: &str) -> Result<Option<FileDetails>, StorageError> {
        self.attachments.page_attachment_details(page, name)
    }

    fn delete_page_attachment(&self, page: &str, name: &str) -> Result<bool, StorageError> {
        let outcome = self.try_delete_page_attachment(page, name)?;
        Ok(into_legacy("Delete attachment", &format!("{page}/{name}"), outcome))
    }

    fn rename_page_attachment(&self, page: &str, old_name: &str, new_name: &str) -> Result<bool, StorageError> {
        let outcome = self.try_rename_page_attachment(page, old_name, new_name)?;
        Ok(into_legacy("Rename attachment", &format!("{page}/{old_name}"), outcome))
    }

    fn notify_page_renaming(&self, old_page: &str, new_page: &str) -> Result<(), StorageError> {
        match self.try_notify_page_renaming(old_page, new_page)? {
            OpOutcome::Failed(e) => Err(StorageError::Io(e)),
            _ => Ok(()),
        }
    }
}

/// Parse a file path; the root is not a file.
fn file_path(full_name: &str) -> Result<VirtualPath, StorageError> {
    let path = VirtualPath::parse(Some(full_name))?;
    if path.is_root() {
        return Err(StorageError::InvalidArgument("Empty file name".into()));
    }
    Ok(path)
}
