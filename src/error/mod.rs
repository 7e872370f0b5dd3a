//! Error types for the webhook gate.
//!
//! Provides a unified error handling system using thiserror.

mod types;

pub use types::*;
