//! Audit logger for writing audit entries to file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::GateError;

use super::entry::AuditEntry;

/// Appends audit entries to a file in JSON lines format.
///
/// Thread-safe via internal mutex.
pub struct AuditLogger {
    file: Mutex<File>,
    path: PathBuf,
}

impl AuditLogger {
    /// Open the audit log for appending, creating the parent directory if
    /// needed.
    pub fn new(path: &Path) -> Result<Self, GateError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                debug!(path = %parent.display(), "Creating audit log directory");
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        debug!(path = %path.display(), "Audit logger initialized");

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Write one entry as a single line and sync it.
    pub fn log(&self, entry: &AuditEntry) -> Result<(), GateError> {
        let json = serde_json::to_string(entry)?;

        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(file, "{}", json)?;

        if let Err(e) = file.sync_data() {
            warn!(error = %e, "Failed to sync audit log");
        }

        debug!(request_id = %entry.request_id, "Audit entry logged");

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
