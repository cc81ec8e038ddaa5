//! Path validation
//!
//! Parses caller-supplied virtual paths and performs the string-level sandbox
//! check on joined real paths.

use std::fmt;
use std::path::{MAIN_SEPARATOR_STR, Path};

use crate::error::StorageError;

/// Separator used by callers in virtual paths.
pub const VIRTUAL_SEPARATOR: char = '/';

/// A normalized, UNIX-style path inside a sandbox.
///
/// Invariants (enforced at construction):
/// - every segment is non-empty
/// - no `.` or `..` segments
/// - no `\` or NUL inside a segment
///
/// Equality is byte-wise; use [`VirtualPath::key`] for the case-insensitive
/// identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VirtualPath {
    segments: Vec<String>,
}

impl VirtualPath {
    /// The namespace root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a caller path. `None`, `""` and `"/"` all denote the root; a leading
    /// separator is optional and a trailing one is ignored.
    pub fn parse(input: Option<&str>) -> Result<Self, StorageError> {
        let input = input.unwrap_or("");
        let mut segments = Vec::new();
        for segment in input.split(VIRTUAL_SEPARATOR).filter(|s| !s.is_empty()) {
            validate_segment(segment, input)?;
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Final segment, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Parent path, or `None` for the root.
    pub fn parent(&self) -> Option<VirtualPath> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Append a single segment, validating it.
    pub fn join(&self, name: &str) -> Result<VirtualPath, StorageError> {
        let name = validate_name(name)?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self { segments })
    }

    /// Build a path from segments that were already read back from disk.
    pub(crate) fn from_segments(segments: Vec<String>) -> Self {
        Self { segments }
    }

    /// Lower-cased lookup key; two paths with the same key denote one entity.
    pub fn key(&self) -> String {
        self.segments
            .iter()
            .map(|s| case_key(s))
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Case-insensitive check that `self` lies strictly below `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &VirtualPath) -> bool {
        self.segments.len() > ancestor.segments.len()
            && ancestor
                .segments
                .iter()
                .zip(&self.segments)
                .all(|(a, b)| case_key(a) == case_key(b))
    }

    /// Render in file form: `/a/b`.
    pub fn to_file_string(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    /// Render in directory form: `/a/b/`, or `/` for the root.
    pub fn to_directory_string(&self) -> String {
        if self.is_root() {
            "/".to_string()
        } else {
            format!("/{}/", self.segments.join("/"))
        }
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_file_string())
    }
}

/// Case-folding used for every name comparison.
pub fn case_key(name: &str) -> String {
    name.to_lowercase()
}

/// Validate a single name (file, directory or page key).
pub fn validate_name(name: &str) -> Result<&str, StorageError> {
    if name.is_empty() {
        return Err(StorageError::InvalidArgument("Empty name".into()));
    }
    if name.contains(VIRTUAL_SEPARATOR) {
        return Err(StorageError::InvalidArgument(format!(
            "Name cannot contain '{VIRTUAL_SEPARATOR}': {name}"
        )));
    }
    validate_segment(name, name)?;
    Ok(name)
}

fn validate_segment(segment: &str, input: &str) -> Result<(), StorageError> {
    if segment == "." || segment == ".." {
        return Err(StorageError::PathTraversal(input.to_string()));
    }
    if segment.contains('\\') || segment.contains('\0') {
        return Err(StorageError::InvalidArgument(format!(
            "Illegal character in path: {input}"
        )));
    }
    Ok(())
}

/// String-level sandbox check on a joined real path.
///
/// The path must start with `root` and must not contain a separator
/// immediately followed by `..` nor `..` immediately followed by a separator.
/// This sits underneath the canonical containment check, it does not replace it.
pub fn check_path(root: &Path, candidate: &Path) -> Result<(), StorageError> {
    let root_str = root.to_string_lossy();
    let candidate_str = candidate.to_string_lossy();

    let upward = format!("{MAIN_SEPARATOR_STR}..");
    let downward = format!("..{MAIN_SEPARATOR_STR}");

    if !candidate_str.starts_with(root_str.as_ref())
        || candidate_str.contains(&upward)
        || candidate_str.contains(&downward)
    {
        return Err(StorageError::PathTraversal(candidate_str.into_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_root_forms() {
        assert!(VirtualPath::parse(None).unwrap().is_root());
        assert!(VirtualPath::parse(Some("")).unwrap().is_root());
        assert!(VirtualPath::parse(Some("/")).unwrap().is_root());
        assert!(VirtualPath::parse(Some("//")).unwrap().is_root());
    }

    #[test]
    fn test_leading_and_trailing_separators() {
        let a = VirtualPath::parse(Some("/Dir/Sub/")).unwrap();
        let b = VirtualPath::parse(Some("Dir/Sub")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_directory_string(), "/Dir/Sub/");
        assert_eq!(a.to_file_string(), "/Dir/Sub");
        assert_eq!(VirtualPath::root().to_directory_string(), "/");
    }

    #[test]
    fn test_rejects_dot_segments() {
        for bad in ["/../secret", "a/../../b", "/./x", "..", "/dir/.."] {
            let err = VirtualPath::parse(Some(bad)).unwrap_err();
            assert!(matches!(err, StorageError::PathTraversal(_)), "{bad}");
        }
    }

    #[test]
    fn test_rejects_backslash_and_nul() {
        assert!(matches!(
            VirtualPath::parse(Some("/a\\b")),
            Err(StorageError::InvalidArgument(_))
        ));
        assert!(matches!(
            VirtualPath::parse(Some("/a\0b")),
            Err(StorageError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_key_is_case_insensitive() {
        let a = VirtualPath::parse(Some("/File.TXT")).unwrap();
        let b = VirtualPath::parse(Some("/file.txt")).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_descendant() {
        let dir = VirtualPath::parse(Some("/Dir/")).unwrap();
        let sub = VirtualPath::parse(Some("/dir/sub/")).unwrap();
        assert!(sub.is_descendant_of(&dir));
        assert!(!dir.is_descendant_of(&dir));
        assert!(!dir.is_descendant_of(&sub));
        assert!(dir.is_descendant_of(&VirtualPath::root()));
    }

    #[test]
    fn test_join_and_parent() {
        let dir = VirtualPath::parse(Some("/Dir")).unwrap();
        let file = dir.join("a.txt").unwrap();
        assert_eq!(file.to_file_string(), "/Dir/a.txt");
        assert_eq!(file.name(), Some("a.txt"));
        assert_eq!(file.parent().unwrap(), dir);
        assert!(VirtualPath::root().parent().is_none());
        assert!(dir.join("x/y").is_err());
        assert!(dir.join("").is_err());
        assert!(matches!(dir.join(".."), Err(StorageError::PathTraversal(_))));
    }

    #[test]
    fn test_check_path() {
        let root = PathBuf::from("/srv/data/Upload");
        assert!(check_path(&root, &root.join("a").join("b.txt")).is_ok());
        assert!(check_path(&root, &root).is_ok());
        assert!(check_path(&root, Path::new("/srv/other/a")).is_err());
        assert!(check_path(&root, &root.join("..").join("x")).is_err());
        assert!(check_path(&root, &root.join("..hidden")).is_err());
        assert!(check_path(&root, &root.join("name..").join("x")).is_err());
        assert!(check_path(&root, &root.join("a..b")).is_ok());
    }
}
