//! Directory operations
//!
//! Create, list, delete and rename directories inside one sandbox. Structural
//! changes take the write side of a lock owned by the tree, one per sandbox
//! root. Work that needs a directory to stay put while it runs holds the read
//! side. The lock is in-process only.

use std::fs;
use std::io;

use log::{debug, error, info};
use parking_lot::{RwLock, RwLockWriteGuard};

use crate::error::StorageError;
use crate::storage::files::child_of;
use crate::storage::filesystem::{IoSettings, PathResolver, ResolvedPath, list_children, with_retries};
use crate::storage::results::{EntryKind, OpOutcome};
use crate::storage::validation::{VirtualPath, validate_name};

/// Directory hierarchy of one sandbox root.
#[derive(Debug)]
pub struct DirectoryTree {
    resolver: PathResolver,
    settings: IoSettings,
    structure_lock: RwLock<()>,
}

impl DirectoryTree {
    pub fn new(resolver: PathResolver, settings: IoSettings) -> Self {
        Self {
            resolver,
            settings,
            structure_lock: RwLock::new(()),
        }
    }

    /// Lists the subdirectories of a directory as full virtual paths.
    pub fn list_directories(&self, directory: &VirtualPath) -> Result<Vec<VirtualPath>, StorageError> {
        let dir = self.existing_directory(directory)?;
        let names = list_children(&dir.real, EntryKind::Directory, self.settings).map_err(|e| {
            error!(
                "Failed to list directories of {} (real: {}): {}",
                directory.to_directory_string(),
                dir.real.display(),
                e
            );
            StorageError::from(e)
        })?;

        debug!(
            "Listed directories of {} (real: {}) - {} entries",
            dir.virtual_path.to_directory_string(),
            dir.real.display(),
            names.len()
        );

        Ok(names
            .into_iter()
            .map(|name| child_of(&dir, name))
            .collect())
    }

    pub fn directory_exists(&self, path: &VirtualPath) -> Result<bool, StorageError> {
        Ok(self.resolver.resolve(path, EntryKind::Directory)?.exists)
    }

    /// Creates `name` inside an existing `parent` (single level).
    pub fn create_directory(&self, parent: &VirtualPath, name: &str) -> Result<OpOutcome, StorageError> {
        let name = validate_name(name)?;
        let _guard = self.structure_lock.write();

        let parent_dir = self.existing_directory(parent)?;
        let child = parent_dir.virtual_path.join(name)?;
        let target = self.resolver.resolve(&child, EntryKind::Directory)?;
        if target.occupied {
            return Err(StorageError::DirectoryAlreadyExists(
                target.virtual_path.to_directory_string(),
            ));
        }
        self.create_resolved(&target)
    }

    /// Creates `path` if it is absent (its parent must exist), then runs `work`
    /// while no structural change can touch the tree. `work` is skipped if the
    /// directory cannot be created.
    pub fn within_directory<F>(&self, path: &VirtualPath, work: F) -> Result<OpOutcome, StorageError>
    where
        F: FnOnce() -> Result<OpOutcome, StorageError>,
    {
        let guard = self.structure_lock.write();
        match self.ensure_locked(path)? {
            OpOutcome::Failed(e) => return Ok(OpOutcome::Failed(e)),
            OpOutcome::Completed => debug!("Created directory {}", path.to_directory_string()),
            _ => {}
        }
        let _guard = RwLockWriteGuard::downgrade(guard);
        work()
    }

    fn ensure_locked(&self, path: &VirtualPath) -> Result<OpOutcome, StorageError> {
        let target = self.resolver.resolve(path, EntryKind::Directory)?;
        if target.exists {
            return Ok(OpOutcome::Unchanged);
        }
        if target.occupied {
            return Err(StorageError::FileAlreadyExists(path.to_file_string()));
        }
        match self.create_resolved(&target) {
            Err(StorageError::DirectoryAlreadyExists(_)) => Ok(OpOutcome::Unchanged),
            other => other,
        }
    }

    /// Deletes a directory and everything below it.
    pub fn delete_directory(&self, path: &VirtualPath) -> Result<OpOutcome, StorageError> {
        check_not_root(path, "Cannot delete the root directory")?;
        let _guard = self.structure_lock.write();
        let target = self.existing_directory(path)?;
        self.delete_resolved(&target)
    }

    /// Like [`DirectoryTree::delete_directory`], but an absent directory is
    /// [`OpOutcome::Unchanged`]. The existence check and the removal share one
    /// critical section.
    pub fn delete_directory_if_exists(&self, path: &VirtualPath) -> Result<OpOutcome, StorageError> {
        check_not_root(path, "Cannot delete the root directory")?;
        let _guard = self.structure_lock.write();
        let target = self.resolver.resolve(path, EntryKind::Directory)?;
        if !target.exists {
            return Ok(OpOutcome::Unchanged);
        }
        self.delete_resolved(&target)
    }

    fn delete_resolved(&self, target: &ResolvedPath) -> Result<OpOutcome, StorageError> {
        let result = with_retries(self.settings.max_retries, || fs::remove_dir_all(&target.real));
        match &result {
            Ok(()) => info!(
                "Deleted directory {} (real: {})",
                target.virtual_path.to_directory_string(),
                target.real.display()
            ),
            Err(e) => error!(
                "Failed to delete directory {} (real: {}): {}",
                target.virtual_path.to_directory_string(),
                target.real.display(),
                e
            ),
        }
        Ok(result.into())
    }

    /// Moves a directory with its whole subtree. A target differing from the
    /// source only by case changes the stored casing.
    pub fn rename_directory(&self, old: &VirtualPath, new: &VirtualPath) -> Result<OpOutcome, StorageError> {
        check_rename(old, new)?;
        let _guard = self.structure_lock.write();
        let source = self.existing_directory(old)?;
        self.move_resolved(&source, new)
    }

    /// Like [`DirectoryTree::rename_directory`], but an absent source is
    /// [`OpOutcome::Unchanged`]. The existence check and the move share one
    /// critical section.
    pub fn rename_directory_if_exists(
        &self,
        old: &VirtualPath,
        new: &VirtualPath,
    ) -> Result<OpOutcome, StorageError> {
        check_rename(old, new)?;
        let _guard = self.structure_lock.write();
        let source = self.resolver.resolve(old, EntryKind::Directory)?;
        if !source.exists {
            debug!("Nothing to move at {}", old.to_directory_string());
            return Ok(OpOutcome::Unchanged);
        }
        self.move_resolved(&source, new)
    }

    fn move_resolved(&self, source: &ResolvedPath, new: &VirtualPath) -> Result<OpOutcome, StorageError> {
        let target = self.resolver.resolve(new, EntryKind::Directory)?;

        let destination = if target.occupied {
            if target.real != source.real || target.virtual_path.name() == new.name() {
                return Err(StorageError::DirectoryAlreadyExists(new.to_directory_string()));
            }
            match (source.real.parent(), new.name()) {
                (Some(parent), Some(name)) => parent.join(name),
                _ => return Err(StorageError::InvalidArgument(new.to_directory_string())),
            }
        } else {
            let parent_ok = target.real.parent().map(|p| p.is_dir()).unwrap_or(false);
            if !parent_ok {
                let parent = new.parent().unwrap_or_default();
                return Err(StorageError::DirectoryNotFound(parent.to_directory_string()));
            }
            target.real.clone()
        };

        let result = with_retries(self.settings.max_retries, || fs::rename(&source.real, &destination));
        match &result {
            Ok(()) => info!(
                "Renamed directory {} to {} (real: {} -> {})",
                source.virtual_path.to_directory_string(),
                new.to_directory_string(),
                source.real.display(),
                destination.display()
            ),
            Err(e) => error!(
                "Failed to rename directory {} to {}: {}",
                source.virtual_path.to_directory_string(),
                new.to_directory_string(),
                e
            ),
        }
        Ok(result.into())
    }

    fn existing_directory(&self, path: &VirtualPath) -> Result<ResolvedPath, StorageError> {
        let dir = self.resolver.resolve(path, EntryKind::Directory)?;
        if !dir.exists {
            return Err(StorageError::DirectoryNotFound(path.to_directory_string()));
        }
        Ok(dir)
    }

    fn create_resolved(&self, target: &ResolvedPath) -> Result<OpOutcome, StorageError> {
        match fs::create_dir(&target.real) {
            Ok(()) => {
                info!(
                    "Created directory {} (real: {})",
                    target.virtual_path.to_directory_string(),
                    target.real.display()
                );
                Ok(OpOutcome::Completed)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(
                StorageError::DirectoryAlreadyExists(target.virtual_path.to_directory_string()),
            ),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::DirectoryNotFound(
                target
                    .virtual_path
                    .parent()
                    .unwrap_or_default()
                    .to_directory_string(),
            )),
            Err(e) => {
                error!(
                    "Failed to create directory {} (real: {}): {}",
                    target.virtual_path.to_directory_string(),
                    target.real.display(),
                    e
                );
                Ok(OpOutcome::Failed(e))
            }
        }
    }
}

fn check_not_root(path: &VirtualPath, message: &str) -> Result<(), StorageError> {
    if path.is_root() {
        return Err(StorageError::InvalidArgument(message.into()));
    }
    Ok(())
}

fn check_rename(old: &VirtualPath, new: &VirtualPath) -> Result<(), StorageError> {
    if old.is_root() || new.is_root() {
        return Err(StorageError::InvalidArgument(
            "Cannot rename the root directory".into(),
        ));
    }
    if new.is_descendant_of(old) {
        return Err(StorageError::InvalidArgument(format!(
            "Cannot move {} into its own subtree {}",
            old.to_directory_string(),
            new.to_directory_string()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, DirectoryTree) {
        let dir = TempDir::new().unwrap();
        let resolver = PathResolver::new(&dir.path().join("Upload")).unwrap();
        (dir, DirectoryTree::new(resolver, IoSettings::default()))
    }

    fn vp(s: &str) -> VirtualPath {
        VirtualPath::parse(Some(s)).unwrap()
    }

    #[test]
    fn test_create_requires_parent() {
        let (_dir, tree) = setup();
        let err = tree.create_directory(&vp("/missing/"), "Sub").unwrap_err();
        assert!(matches!(err, StorageError::DirectoryNotFound(_)));
    }

    #[test]
    fn test_create_conflict_is_case_insensitive() {
        let (_dir, tree) = setup();
        assert!(tree.create_directory(&VirtualPath::root(), "Docs").unwrap().succeeded());
        let err = tree.create_directory(&VirtualPath::root(), "DOCS").unwrap_err();
        assert!(matches!(err, StorageError::DirectoryAlreadyExists(_)));
    }

    #[test]
    fn test_within_directory_reuses_existing_case() {
        let (_dir, tree) = setup();
        tree.within_directory(&vp("/Page"), || Ok(OpOutcome::Completed)).unwrap();
        tree.within_directory(&vp("/page"), || Ok(OpOutcome::Completed)).unwrap();
        assert_eq!(tree.list_directories(&VirtualPath::root()).unwrap(), vec![vp("/Page")]);
    }

    #[test]
    fn test_rename_into_own_subtree_rejected() {
        let (_dir, tree) = setup();
        tree.create_directory(&VirtualPath::root(), "Dir").unwrap();
        let err = tree.rename_directory(&vp("/Dir/"), &vp("/dir/Inner/")).unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
    }

    #[test]
    fn test_case_only_directory_rename() {
        let (_dir, tree) = setup();
        tree.create_directory(&VirtualPath::root(), "docs").unwrap();
        assert!(tree.rename_directory(&vp("/docs/"), &vp("/Docs/")).unwrap().succeeded());
        assert_eq!(tree.list_directories(&VirtualPath::root()).unwrap(), vec![vp("/Docs")]);
    }

    #[test]
    fn test_rename_target_parent_must_exist() {
        let (_dir, tree) = setup();
        tree.create_directory(&VirtualPath::root(), "Dir").unwrap();
        let err = tree.rename_directory(&vp("/Dir/"), &vp("/Nope/Dir/")).unwrap_err();
        assert!(matches!(err, StorageError::DirectoryNotFound(_)));
    }

    #[test]
    fn test_if_exists_variants_on_absent_directory() {
        let (_dir, tree) = setup();
        assert!(matches!(
            tree.rename_directory_if_exists(&vp("/Ghost/"), &vp("/Other/")).unwrap(),
            OpOutcome::Unchanged
        ));
        assert!(matches!(
            tree.delete_directory_if_exists(&vp("/Ghost/")).unwrap(),
            OpOutcome::Unchanged
        ));
        assert!(tree.list_directories(&VirtualPath::root()).unwrap().is_empty());
    }

    #[test]
    fn test_within_directory_creates_then_runs() {
        let (_dir, tree) = setup();
        let mut ran = false;
        let outcome = tree
            .within_directory(&vp("/Page/"), || {
                ran = true;
                Ok(OpOutcome::Completed)
            })
            .unwrap();
        assert!(ran);
        assert!(outcome.succeeded());
        assert!(tree.directory_exists(&vp("/page/")).unwrap());
    }

    #[test]
    fn test_concurrent_structure_changes_stay_consistent() {
        let (_dir, tree) = setup();
        tree.create_directory(&VirtualPath::root(), "Base").unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..200 {
                    let result = tree.create_directory(&vp("/Base/"), "Dir");
                    assert!(matches!(
                        result,
                        Ok(OpOutcome::Completed) | Err(StorageError::DirectoryAlreadyExists(_))
                    ));
                }
            });
            scope.spawn(|| {
                for _ in 0..200 {
                    let outcome = tree.delete_directory_if_exists(&vp("/Base/Dir/")).unwrap();
                    assert!(!matches!(outcome, OpOutcome::Failed(_)));
                }
            });
            scope.spawn(|| {
                for _ in 0..200 {
                    for (from, to) in [("/Base/Dir/", "/Base/Moved/"), ("/Base/Moved/", "/Base/Dir/")] {
                        let result = tree.rename_directory_if_exists(&vp(from), &vp(to));
                        assert!(matches!(
                            result,
                            Ok(OpOutcome::Completed)
                                | Ok(OpOutcome::Unchanged)
                                | Err(StorageError::DirectoryAlreadyExists(_))
                        ));
                    }
                }
            });
        });

        let children = tree.list_directories(&vp("/Base/")).unwrap();
        assert!(children.len() <= 2);
        for child in children {
            assert!(matches!(child.name(), Some("Dir") | Some("Moved")));
        }
    }
}
