//! File system operations
//!
//! Maps virtual paths onto a sandbox root on the host filesystem and provides
//! the locked copy and retry primitives shared by the file and directory stores.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use fs2::FileExt;
use log::{debug, warn};

use crate::error::StorageError;
use crate::storage::results::EntryKind;
use crate::storage::validation::{VirtualPath, case_key, check_path};

/// Tunables for host I/O.
#[derive(Debug, Clone, Copy)]
pub struct IoSettings {
    pub buffer_size: usize,
    pub max_retries: usize,
}

impl Default for IoSettings {
    fn default() -> Self {
        Self {
            buffer_size: 8192,
            max_retries: 3,
        }
    }
}

/// A virtual path mapped onto the host.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    /// The virtual path with on-disk casing for every segment that already exists.
    pub virtual_path: VirtualPath,
    /// Real location inside the sandbox.
    pub real: PathBuf,
    /// Something (of any kind) is present at `real`.
    pub occupied: bool,
    /// An entry of the requested kind is present at `real`.
    pub exists: bool,
}

/// Translates virtual paths into real paths confined to one sandbox root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Create the sandbox root if needed and bind a resolver to its canonical form.
    pub fn new(root: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(root)?;
        let root = root.canonicalize()?;
        debug!("Sandbox root ready: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a virtual path.
    ///
    /// Each segment is matched case-insensitively against the entries already on
    /// disk, so an existing entry is always found under its stored name. Segments
    /// with no match keep the caller's casing.
    pub fn resolve(&self, path: &VirtualPath, kind: EntryKind) -> Result<ResolvedPath, StorageError> {
        let mut real = self.root.clone();
        let mut matched = Vec::with_capacity(path.segments().len());
        let mut on_disk = true;

        for segment in path.segments() {
            let name = if on_disk {
                find_entry(&real, segment)
            } else {
                None
            };
            match name {
                Some(name) => {
                    real.push(&name);
                    matched.push(name);
                }
                None => {
                    real.push(segment);
                    matched.push(segment.clone());
                    on_disk = false;
                }
            }
        }

        check_path(&self.root, &real)?;
        self.ensure_contained(&real)?;

        let (occupied, exists) = if on_disk {
            match fs::metadata(&real) {
                Ok(meta) => {
                    let exists = match kind {
                        EntryKind::File => meta.is_file(),
                        EntryKind::Directory => meta.is_dir(),
                    };
                    (true, exists)
                }
                Err(_) => (false, false),
            }
        } else {
            (false, false)
        };

        Ok(ResolvedPath {
            virtual_path: VirtualPath::from_segments(matched),
            real,
            occupied,
            exists,
        })
    }

    /// Canonical containment check on the deepest existing ancestor of `real`.
    fn ensure_contained(&self, real: &Path) -> Result<(), StorageError> {
        let mut probe = real;
        while fs::symlink_metadata(probe).is_err() {
            probe = match probe.parent() {
                Some(parent) => parent,
                None => return Err(StorageError::PathTraversal(real.display().to_string())),
            };
        }
        match probe.canonicalize() {
            Ok(canonical) if canonical.starts_with(&self.root) => Ok(()),
            _ => Err(StorageError::PathTraversal(real.display().to_string())),
        }
    }
}

/// Find the on-disk name of `segment` inside `dir`, preferring an exact match.
fn find_entry(dir: &Path, segment: &str) -> Option<String> {
    let entries = fs::read_dir(dir).ok()?;
    let wanted = case_key(segment);
    let mut candidates: Vec<String> = entries
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| case_key(name) == wanted)
        .collect();

    if candidates.iter().any(|name| name == segment) {
        return Some(segment.to_string());
    }
    candidates.sort();
    candidates.into_iter().next()
}

/// Names of the regular children of `dir` with the given kind, sorted by key.
///
/// Symlinks and names that are not valid UTF-8 are skipped.
pub fn list_children(dir: &Path, kind: EntryKind, settings: IoSettings) -> io::Result<Vec<String>> {
    let entries = with_retries(settings.max_retries, || fs::read_dir(dir))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let wanted = match kind {
            EntryKind::File => file_type.is_file(),
            EntryKind::Directory => file_type.is_dir(),
        };
        if !wanted {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort_by_key(|name| (case_key(name), name.clone()));
    Ok(names)
}

/// Run a host operation, retrying on transient `PermissionDenied`.
pub fn with_retries<T, F>(max_retries: usize, mut op: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    let retries = max_retries.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < retries && e.kind() == io::ErrorKind::PermissionDenied => {
                warn!("Transient error (attempt {attempt}/{retries}): {e}. Retrying...");
                thread::sleep(Duration::from_millis(100 * attempt as u64));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Copy everything from `source` into `file` while holding an exclusive lock.
///
/// The file is truncated only once the lock is held.
pub fn write_locked(file: &mut File, source: &mut dyn Read, settings: IoSettings) -> io::Result<u64> {
    FileExt::lock_exclusive(&*file)?;
    let result = replace_contents(file, source, settings.buffer_size);
    let _ = FileExt::unlock(&*file);
    result
}

/// Copy the whole of `file` into `sink` while holding a shared lock.
pub fn read_locked(file: &mut File, sink: &mut dyn Write, settings: IoSettings) -> io::Result<u64> {
    FileExt::lock_shared(&*file)?;
    let result = copy_buffered(&mut *file, &mut *sink, settings.buffer_size);
    let _ = FileExt::unlock(&*file);
    let read = result?;
    sink.flush()?;
    Ok(read)
}

fn replace_contents(file: &mut File, source: &mut dyn Read, buffer_size: usize) -> io::Result<u64> {
    file.set_len(0)?;
    let written = copy_buffered(source, &mut *file, buffer_size)?;
    file.flush()?;
    file.sync_all()?;
    Ok(written)
}

fn copy_buffered(reader: &mut dyn Read, writer: &mut dyn Write, buffer_size: usize) -> io::Result<u64> {
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buffer[..n])?;
        total += n as u64;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathResolver) {
        let dir = TempDir::new().unwrap();
        let resolver = PathResolver::new(&dir.path().join("Upload")).unwrap();
        (dir, resolver)
    }

    #[test]
    fn test_resolve_is_inside_root() {
        let (_dir, resolver) = setup();
        let path = VirtualPath::parse(Some("/a/b/c.txt")).unwrap();
        let resolved = resolver.resolve(&path, EntryKind::File).unwrap();
        assert!(resolved.real.starts_with(resolver.root()));
        assert!(!resolved.exists);
        assert!(!resolved.occupied);
    }

    #[test]
    fn test_resolve_matches_existing_case() {
        let (_dir, resolver) = setup();
        fs::create_dir(resolver.root().join("Docs")).unwrap();
        fs::write(resolver.root().join("Docs").join("Read.ME"), b"x").unwrap();

        let path = VirtualPath::parse(Some("/docs/read.me")).unwrap();
        let resolved = resolver.resolve(&path, EntryKind::File).unwrap();
        assert!(resolved.exists);
        assert_eq!(resolved.virtual_path.to_file_string(), "/Docs/Read.ME");

        let as_dir = resolver.resolve(&path, EntryKind::Directory).unwrap();
        assert!(as_dir.occupied);
        assert!(!as_dir.exists);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_exact_match_preferred() {
        let (_dir, resolver) = setup();
        fs::write(resolver.root().join("a.txt"), b"lower").unwrap();
        fs::write(resolver.root().join("A.txt"), b"upper").unwrap();
        let path = VirtualPath::parse(Some("/A.txt")).unwrap();
        let resolved = resolver.resolve(&path, EntryKind::File).unwrap();
        assert_eq!(resolved.virtual_path.name(), Some("A.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let (dir, resolver) = setup();
        let outside = dir.path().join("outside");
        fs::create_dir(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, resolver.root().join("link")).unwrap();

        let path = VirtualPath::parse(Some("/link/secret.txt")).unwrap();
        let err = resolver.resolve(&path, EntryKind::File).unwrap_err();
        assert!(matches!(err, StorageError::PathTraversal(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_rejected() {
        let (dir, resolver) = setup();
        std::os::unix::fs::symlink(dir.path().join("nowhere"), resolver.root().join("ghost")).unwrap();
        let path = VirtualPath::parse(Some("/ghost")).unwrap();
        assert!(resolver.resolve(&path, EntryKind::File).is_err());
    }

    #[test]
    fn test_list_children_sorted_by_key() {
        let (_dir, resolver) = setup();
        for name in ["b.txt", "A.txt", "c.txt"] {
            fs::write(resolver.root().join(name), b"").unwrap();
        }
        fs::create_dir(resolver.root().join("sub")).unwrap();
        let files = list_children(resolver.root(), EntryKind::File, IoSettings::default()).unwrap();
        assert_eq!(files, vec!["A.txt", "b.txt", "c.txt"]);
        let dirs = list_children(resolver.root(), EntryKind::Directory, IoSettings::default()).unwrap();
        assert_eq!(dirs, vec!["sub"]);
    }

    #[test]
    fn test_with_retries_gives_up() {
        let mut calls = 0;
        let result: io::Result<()> = with_retries(2, || {
            calls += 1;
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        });
        assert!(result.is_err());
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_with_retries_does_not_retry_other_errors() {
        let mut calls = 0;
        let result: io::Result<()> = with_retries(3, || {
            calls += 1;
            Err(io::Error::from(io::ErrorKind::NotFound))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
