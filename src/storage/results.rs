//! Storage result types
//!
//! Defines the outcome and detail structures returned by storage operations.

use std::io;

use chrono::{DateTime, Utc};

/// Kind of entry a virtual path is expected to denote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Outcome of a mutating operation that passed validation.
///
/// Hard errors never reach this type; they are returned as
/// [`crate::error::StorageError`] before any I/O is attempted.
#[derive(Debug)]
pub enum OpOutcome {
    /// The operation was performed.
    Completed,
    /// There was nothing to do.
    Unchanged,
    /// The target exists and overwriting was not requested.
    Declined,
    /// The host filesystem failed after validation passed.
    Failed(io::Error),
}

impl OpOutcome {
    /// Whether the legacy boolean contract reports success
    pub fn succeeded(&self) -> bool {
        matches!(self, OpOutcome::Completed | OpOutcome::Unchanged)
    }

    /// The underlying I/O error of a soft failure, if any
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            OpOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Result<()>> for OpOutcome {
    fn from(result: io::Result<()>) -> Self {
        match result {
            Ok(()) => OpOutcome::Completed,
            Err(e) => OpOutcome::Failed(e),
        }
    }
}

/// Live attributes of a stored file, queried from the host on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDetails {
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}
