//! Attachments module
//!
//! A file hierarchy keyed by page full name, kept in its own sandbox root and
//! moved along when the owning page is renamed.

mod operations;

pub use operations::AttachmentNamespace;
