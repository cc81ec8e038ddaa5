//! Error handlers
//!
//! Classifies hard errors and adapts typed outcomes to the boolean contract.

use log::{error, warn};

use crate::error::types::StorageError;
use crate::storage::OpOutcome;

/// Coarse category of a hard error, as seen by UI/API layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    InvalidArgument,
    InvalidOperation,
    NotFound,
    AlreadyExists,
    Io,
    Configuration,
}

/// Handle a provider error
pub fn handle_error(err: &StorageError) {
    error!("Files provider error ({:?}): {}", error_class(err), err);
}

/// Map an error onto the category reported to callers
pub fn error_class(err: &StorageError) -> ErrorClass {
    match err {
        StorageError::InvalidArgument(_) => ErrorClass::InvalidArgument,
        StorageError::PathTraversal(_) => ErrorClass::InvalidOperation,
        StorageError::FileNotFound(_) | StorageError::DirectoryNotFound(_) => {
            ErrorClass::NotFound
        }
        StorageError::FileAlreadyExists(_) | StorageError::DirectoryAlreadyExists(_) => {
            ErrorClass::AlreadyExists
        }
        StorageError::Io(_) => ErrorClass::Io,
        StorageError::Config(_) => ErrorClass::Configuration,
    }
}

/// Collapse a typed outcome into the legacy boolean result.
///
/// The I/O cause of a soft failure is logged here and then dropped; callers that
/// need it use the `try_*` methods instead.
pub fn into_legacy(operation: &str, target: &str, outcome: OpOutcome) -> bool {
    match outcome {
        OpOutcome::Completed | OpOutcome::Unchanged => true,
        OpOutcome::Declined => false,
        OpOutcome::Failed(e) => {
            warn!("{operation} failed for {target}: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_traversal_is_invalid_operation() {
        let err = StorageError::PathTraversal("/../x".into());
        assert_eq!(error_class(&err), ErrorClass::InvalidOperation);
    }

    #[test]
    fn test_legacy_adapter() {
        assert!(into_legacy("Store", "/a", OpOutcome::Completed));
        assert!(into_legacy("Rename", "/a", OpOutcome::Unchanged));
        assert!(!into_legacy("Store", "/a", OpOutcome::Declined));
        let failed = OpOutcome::Failed(io::Error::other("disk full"));
        assert!(!into_legacy("Store", "/a", failed));
    }
}
