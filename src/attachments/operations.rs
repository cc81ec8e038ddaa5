//! Attachment operations implementation

use std::io::{Read, Write};

use log::{debug, info, warn};

use crate::error::StorageError;
use crate::storage::{
    DirectoryTree, FileDetails, FileStore, IoSettings, OpOutcome, PathResolver, VirtualPath,
};

/// Attachments of every page, one directory per page key.
///
/// A page has an attachment set exactly when its directory exists, empty or
/// not. Nothing removes a set when a page is deleted without a rename
/// notification; hosts that want that call [`AttachmentNamespace::purge_page_attachments`].
#[derive(Debug)]
pub struct AttachmentNamespace {
    files: FileStore,
    tree: DirectoryTree,
}

impl AttachmentNamespace {
    pub fn new(resolver: PathResolver, settings: IoSettings) -> Self {
        Self {
            files: FileStore::new(resolver.clone(), settings),
            tree: DirectoryTree::new(resolver, settings),
        }
    }

    /// Keys of all pages owning an attachment directory.
    pub fn pages_with_attachments(&self) -> Result<Vec<String>, StorageError> {
        let pages = self.tree.list_directories(&VirtualPath::root())?;
        Ok(pages.iter().filter_map(|p| p.name().map(str::to_string)).collect())
    }

    /// Attachment names of a page; empty if the page has none.
    pub fn list_page_attachments(&self, page: &str) -> Result<Vec<String>, StorageError> {
        let dir = page_directory(page)?;
        if !self.tree.directory_exists(&dir)? {
            return Ok(Vec::new());
        }
        let files = self.files.list_files(&dir)?;
        Ok(files.iter().filter_map(|f| f.name().map(str::to_string)).collect())
    }

    /// Stores an attachment, creating the page directory on first use.
    pub fn store_page_attachment(
        &self,
        page: &str,
        name: &str,
        source: &mut dyn Read,
        overwrite: bool,
    ) -> Result<OpOutcome, StorageError> {
        let dir = page_directory(page)?;
        let path = dir.join(name)?;

        let outcome = self
            .tree
            .within_directory(&dir, || self.files.store_file(&path, source, overwrite))?;
        if let OpOutcome::Failed(e) = &outcome {
            warn!("Cannot store attachment {name} of page {page}: {e}");
        }
        Ok(outcome)
    }

    pub fn retrieve_page_attachment(
        &self,
        page: &str,
        name: &str,
        sink: &mut dyn Write,
    ) -> Result<OpOutcome, StorageError> {
        let path = attachment_path(page, name)?;
        self.files.retrieve_file(&path, sink)
    }

    /// Details of an attachment, `None` if the page or the attachment is absent.
    pub fn page_attachment_details(&self, page: &str, name: &str) -> Result<Option<FileDetails>, StorageError> {
        let path = attachment_path(page, name)?;
        self.files.file_details(&path)
    }

    pub fn delete_page_attachment(&self, page: &str, name: &str) -> Result<OpOutcome, StorageError> {
        let path = attachment_path(page, name)?;
        self.files.delete_file(&path)
    }

    pub fn rename_page_attachment(
        &self,
        page: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<OpOutcome, StorageError> {
        let old = attachment_path(page, old_name)?;
        let new = attachment_path(page, new_name)?;
        self.files.rename_file(&old, &new)
    }

    /// Moves a page's attachment set to its new key.
    ///
    /// A page without attachments is a no-op ([`OpOutcome::Unchanged`]).
    pub fn notify_page_renaming(&self, old_page: &str, new_page: &str) -> Result<OpOutcome, StorageError> {
        let old_dir = page_directory(old_page)?;
        let new_dir = page_directory(new_page)?;

        let outcome = self.tree.rename_directory_if_exists(&old_dir, &new_dir)?;
        match &outcome {
            OpOutcome::Unchanged => debug!("Page {old_page} has no attachments to move"),
            OpOutcome::Completed => info!("Moved attachments of page {old_page} to {new_page}"),
            _ => {}
        }
        Ok(outcome)
    }

    /// Removes a page's whole attachment set. Never called implicitly.
    pub fn purge_page_attachments(&self, page: &str) -> Result<OpOutcome, StorageError> {
        self.tree.delete_directory_if_exists(&page_directory(page)?)
    }
}

fn page_directory(page: &str) -> Result<VirtualPath, StorageError> {
    VirtualPath::root().join(page)
}

fn attachment_path(page: &str, name: &str) -> Result<VirtualPath, StorageError> {
    page_directory(page)?.join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, AttachmentNamespace) {
        let dir = TempDir::new().unwrap();
        let resolver = PathResolver::new(&dir.path().join("Attachments")).unwrap();
        (dir, AttachmentNamespace::new(resolver, IoSettings::default()))
    }

    #[test]
    fn test_empty_namespace() {
        let (_dir, ns) = setup();
        assert!(ns.pages_with_attachments().unwrap().is_empty());
        assert!(ns.list_page_attachments("Page").unwrap().is_empty());
        assert!(ns.page_attachment_details("Page", "a.png").unwrap().is_none());
    }

    #[test]
    fn test_page_key_must_be_single_segment() {
        let (_dir, ns) = setup();
        assert!(matches!(
            ns.list_page_attachments("a/b"),
            Err(StorageError::InvalidArgument(_))
        ));
        assert!(matches!(
            ns.list_page_attachments(".."),
            Err(StorageError::PathTraversal(_))
        ));
        assert!(matches!(
            ns.store_page_attachment("", "x.txt", &mut &b"x"[..], false),
            Err(StorageError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_rename_notification_without_attachments_is_noop() {
        let (_dir, ns) = setup();
        assert!(matches!(
            ns.notify_page_renaming("Ghost", "Other").unwrap(),
            OpOutcome::Unchanged
        ));
        assert!(ns.pages_with_attachments().unwrap().is_empty());
    }

    #[test]
    fn test_rename_notification_conflict() {
        let (_dir, ns) = setup();
        ns.store_page_attachment("A", "1.txt", &mut &b"1"[..], false).unwrap();
        ns.store_page_attachment("B", "2.txt", &mut &b"2"[..], false).unwrap();
        let err = ns.notify_page_renaming("A", "b").unwrap_err();
        assert!(matches!(err, StorageError::DirectoryAlreadyExists(_)));
    }

    #[test]
    fn test_purge_is_explicit() {
        let (_dir, ns) = setup();
        ns.store_page_attachment("Page", "a.txt", &mut &b"a"[..], false).unwrap();
        assert!(ns.purge_page_attachments("Page").unwrap().succeeded());
        assert!(ns.pages_with_attachments().unwrap().is_empty());
        assert!(matches!(
            ns.purge_page_attachments("Page").unwrap(),
            OpOutcome::Unchanged
        ));
    }
}
