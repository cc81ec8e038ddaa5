//! File operations
//!
//! Store, retrieve, stat, delete and rename individual files inside one sandbox.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use log::{debug, error, info};

use crate::error::StorageError;
use crate::storage::filesystem::{
    IoSettings, PathResolver, ResolvedPath, list_children, read_locked, with_retries, write_locked,
};
use crate::storage::results::{EntryKind, FileDetails, OpOutcome};
use crate::storage::validation::VirtualPath;

/// CRUD over the files of one sandbox root.
#[derive(Debug, Clone)]
pub struct FileStore {
    resolver: PathResolver,
    settings: IoSettings,
}

impl FileStore {
    pub fn new(resolver: PathResolver, settings: IoSettings) -> Self {
        Self { resolver, settings }
    }

    /// Lists the files of a directory as full virtual paths.
    pub fn list_files(&self, directory: &VirtualPath) -> Result<Vec<VirtualPath>, StorageError> {
        let dir = self.resolver.resolve(directory, EntryKind::Directory)?;
        if !dir.exists {
            return Err(StorageError::DirectoryNotFound(directory.to_directory_string()));
        }

        let names = list_children(&dir.real, EntryKind::File, self.settings).map_err(|e| {
            error!(
                "Failed to list files of {} (real: {}): {}",
                directory.to_directory_string(),
                dir.real.display(),
                e
            );
            StorageError::from(e)
        })?;

        debug!(
            "Listed files of {} (real: {}) - {} entries",
            dir.virtual_path.to_directory_string(),
            dir.real.display(),
            names.len()
        );

        Ok(names
            .into_iter()
            .map(|name| child_of(&dir, name))
            .collect())
    }

    /// Stores a file, streaming all bytes from `source`.
    ///
    /// An existing target with `overwrite == false` yields [`OpOutcome::Declined`].
    pub fn store_file(
        &self,
        path: &VirtualPath,
        source: &mut dyn Read,
        overwrite: bool,
    ) -> Result<OpOutcome, StorageError> {
        let target = self.resolve_file_name(path)?;
        self.require_parent(&target)?;

        if target.occupied && !overwrite {
            debug!("Declined to overwrite {}", target.virtual_path);
            return Ok(OpOutcome::Declined);
        }

        let (mut file, created) = match open_for_store(&target.real, overwrite) {
            Ok(Some(opened)) => opened,
            Ok(None) => {
                debug!("Declined to overwrite {} (created concurrently)", target.virtual_path);
                return Ok(OpOutcome::Declined);
            }
            Err(e) => {
                error!("Failed to open {} for writing: {}", target.real.display(), e);
                return Ok(OpOutcome::Failed(e));
            }
        };

        match write_locked(&mut file, source, self.settings) {
            Ok(written) => {
                info!(
                    "Stored file {} (real: {}) - {} bytes",
                    target.virtual_path,
                    target.real.display(),
                    written
                );
                Ok(OpOutcome::Completed)
            }
            Err(e) => {
                error!(
                    "Failed to store file {} (real: {}): {}",
                    target.virtual_path,
                    target.real.display(),
                    e
                );
                drop(file);
                if created {
                    let _ = fs::remove_file(&target.real);
                }
                Ok(OpOutcome::Failed(e))
            }
        }
    }

    /// Copies the content of a file into `sink`.
    pub fn retrieve_file(&self, path: &VirtualPath, sink: &mut dyn Write) -> Result<OpOutcome, StorageError> {
        let target = self.existing_file(path)?;

        let mut file = match File::open(&target.real) {
            Ok(file) => file,
            Err(e) => {
                error!("Failed to open {}: {}", target.real.display(), e);
                return Ok(OpOutcome::Failed(e));
            }
        };

        match read_locked(&mut file, sink, self.settings) {
            Ok(read) => {
                debug!("Retrieved file {} - {} bytes", target.virtual_path, read);
                Ok(OpOutcome::Completed)
            }
            Err(e) => {
                error!("Failed to retrieve file {}: {}", target.virtual_path, e);
                Ok(OpOutcome::Failed(e))
            }
        }
    }

    /// Live size and modification time, or `None` if the file is absent.
    pub fn file_details(&self, path: &VirtualPath) -> Result<Option<FileDetails>, StorageError> {
        let target = self.resolve_file_name(path)?;
        if !target.exists {
            return Ok(None);
        }
        let meta = match fs::metadata(&target.real) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(FileDetails {
            size: meta.len(),
            last_modified: DateTime::<Utc>::from(meta.modified()?),
        }))
    }

    pub fn file_exists(&self, path: &VirtualPath) -> Result<bool, StorageError> {
        Ok(self.resolve_file_name(path)?.exists)
    }

    /// Deletes a file
    pub fn delete_file(&self, path: &VirtualPath) -> Result<OpOutcome, StorageError> {
        let target = self.existing_file(path)?;

        let result = with_retries(self.settings.max_retries, || fs::remove_file(&target.real));
        match &result {
            Ok(()) => info!(
                "Deleted file {} (real: {})",
                target.virtual_path,
                target.real.display()
            ),
            Err(e) => error!(
                "Failed to delete file {} (real: {}): {}",
                target.virtual_path,
                target.real.display(),
                e
            ),
        }
        Ok(result.into())
    }

    /// Renames or moves a file. A target differing from the source only by case
    /// changes the stored casing.
    pub fn rename_file(&self, old: &VirtualPath, new: &VirtualPath) -> Result<OpOutcome, StorageError> {
        let source = self.existing_file(old)?;
        let target = self.resolve_file_name(new)?;

        let destination = if target.occupied {
            if target.real != source.real || target.virtual_path.name() == new.name() {
                return Err(StorageError::FileAlreadyExists(new.to_file_string()));
            }
            // Case-only rename of the same entry.
            match (source.real.parent(), new.name()) {
                (Some(parent), Some(name)) => parent.join(name),
                _ => return Err(StorageError::InvalidArgument(new.to_file_string())),
            }
        } else {
            self.require_parent(&target)?;
            target.real.clone()
        };

        let result = with_retries(self.settings.max_retries, || fs::rename(&source.real, &destination));
        match &result {
            Ok(()) => info!(
                "Renamed file {} to {} (real: {} -> {})",
                source.virtual_path,
                new,
                source.real.display(),
                destination.display()
            ),
            Err(e) => error!("Failed to rename file {} to {}: {}", source.virtual_path, new, e),
        }
        Ok(result.into())
    }

    fn resolve_file_name(&self, path: &VirtualPath) -> Result<ResolvedPath, StorageError> {
        if path.is_root() {
            return Err(StorageError::InvalidArgument("Empty file name".into()));
        }
        self.resolver.resolve(path, EntryKind::File)
    }

    fn existing_file(&self, path: &VirtualPath) -> Result<ResolvedPath, StorageError> {
        let target = self.resolve_file_name(path)?;
        if !target.exists {
            return Err(StorageError::FileNotFound(path.to_file_string()));
        }
        Ok(target)
    }

    fn require_parent(&self, target: &ResolvedPath) -> Result<(), StorageError> {
        let parent_ok = target.real.parent().map(|p| p.is_dir()).unwrap_or(false);
        if !parent_ok {
            let parent = target.virtual_path.parent().unwrap_or_default();
            return Err(StorageError::DirectoryNotFound(parent.to_directory_string()));
        }
        Ok(())
    }
}

/// Open `real` for a store. Returns the file and whether this call created it,
/// or `None` when the file exists and `overwrite` is off.
fn open_for_store(real: &Path, overwrite: bool) -> io::Result<Option<(File, bool)>> {
    loop {
        match OpenOptions::new().write(true).create_new(true).open(real) {
            Ok(file) => return Ok(Some((file, true))),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if !overwrite {
                    return Ok(None);
                }
            }
            Err(e) => return Err(e),
        }
        match OpenOptions::new().write(true).open(real) {
            Ok(file) => return Ok(Some((file, false))),
            // Removed between the two opens.
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Virtual path of a child found inside a resolved directory.
pub(crate) fn child_of(dir: &ResolvedPath, name: String) -> VirtualPath {
    let mut segments = dir.virtual_path.segments().to_vec();
    segments.push(name);
    VirtualPath::from_segments(segments)
}
