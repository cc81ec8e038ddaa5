//! Error handling
//!
//! Defines the hard error type of the provider and the helpers that classify,
//! log and adapt operation outcomes.

pub mod handlers;
pub mod types;

pub use types::*;
