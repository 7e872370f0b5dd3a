//! Audit logging module.
//!
//! Records every authorization decision as one JSON object per line.
//! Nonces, signatures and bodies are never written.

mod entry;
mod logger;

pub use entry::{AuditEntry, AuditResult};
pub use logger::AuditLogger;
