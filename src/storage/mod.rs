//! File system storage management
//!
//! Path resolution, file and directory operations over a sandboxed root.

pub mod directories;
pub mod files;
pub mod filesystem;
pub mod results;
pub mod validation;

pub use directories::DirectoryTree;
pub use files::FileStore;
pub use filesystem::{IoSettings, PathResolver, ResolvedPath};
pub use results::{EntryKind, FileDetails, OpOutcome};
pub use validation::VirtualPath;
