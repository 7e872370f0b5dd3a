//! Directory-backed nonce ledger.
//!
//! Each nonce is stored as one file named after the SHA-256 of the nonce,
//! containing its expiry as UNIX seconds. Every check-and-store runs under an
//! exclusive `flock` on `<dir>/.lock`, so workers in separate processes that
//! share the directory serialize on the same lock.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use nix::fcntl::{Flock, FlockArg};
use ring::digest;
use tracing::{debug, warn};

use super::NonceLedger;
use crate::error::GateError;

const LOCK_FILE: &str = ".lock";
const TMP_SUFFIX: &str = ".tmp";

/// Nonce ledger persisted in a directory.
#[derive(Debug, Clone)]
pub struct FileNonceLedger {
    dir: PathBuf,
}

impl FileNonceLedger {
    /// Open (and create if needed) a ledger directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, GateError> {
        let dir = dir.into();
        if !dir.exists() {
            debug!(path = %dir.display(), "Creating nonce directory");
        }
        fs::create_dir_all(&dir).map_err(|e| ledger_error(&dir, "create directory", e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))
                .map_err(|e| ledger_error(&dir, "set permissions on", e))?;
        }

        Ok(Self { dir })
    }

    fn record_path(&self, nonce: &str) -> PathBuf {
        let name = hex::encode(digest::digest(&digest::SHA256, nonce.as_bytes()).as_ref());
        self.dir.join(name)
    }

    /// Take the directory-wide exclusive lock. Released on drop.
    fn lock(&self) -> Result<Flock<File>, GateError> {
        let path = self.dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| ledger_error(&path, "open lock file", e))?;
        Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| GateError::Ledger {
            message: format!("Failed to lock {}: {}", path.display(), errno),
        })
    }

    fn check_and_store_sync(&self, nonce: &str, ttl: Duration) -> Result<bool, GateError> {
        let _guard = self.lock()?;
        let now = unix_now();
        let path = self.record_path(nonce);

        match read_expiry(&path) {
            Ok(Some(expiry)) if expiry > now => return Ok(false),
            Ok(_) => {}
            Err(e) => return Err(ledger_error(&path, "read", e)),
        }

        let expiry = now.saturating_add(ttl_seconds(ttl));
        write_record(&path, expiry).map_err(|e| ledger_error(&path, "write", e))?;
        Ok(true)
    }

    /// Remove expired records. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize, GateError> {
        let _guard = self.lock()?;
        let now = unix_now();
        let mut removed = 0;

        let entries = fs::read_dir(&self.dir).map_err(|e| ledger_error(&self.dir, "list", e))?;
        for entry in entries {
            let entry = entry.map_err(|e| ledger_error(&self.dir, "list", e))?;
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == LOCK_FILE {
                continue;
            }

            let expired = name.ends_with(TMP_SUFFIX)
                || match read_expiry(&path) {
                    Ok(Some(expiry)) => expiry <= now,
                    Ok(None) => false,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Unreadable nonce record");
                        false
                    }
                };

            if expired {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove nonce record"),
                }
            }
        }

        debug!(removed, "Purged expired nonce records");
        Ok(removed)
    }
}

#[async_trait]
impl NonceLedger for FileNonceLedger {
    async fn check_and_store(&self, nonce: &str, ttl: Duration) -> Result<bool, GateError> {
        let ledger = self.clone();
        let nonce = nonce.to_string();
        tokio::task::spawn_blocking(move || ledger.check_and_store_sync(&nonce, ttl))
            .await
            .map_err(|e| GateError::Ledger {
                message: format!("Nonce ledger task failed: {}", e),
            })?
    }
}

/// Read a record's expiry. `Ok(None)` if the record does not exist.
///
/// A record that exists but cannot be parsed is treated as never expiring.
fn read_expiry(path: &Path) -> std::io::Result<Option<u64>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content.trim().parse().unwrap_or(u64::MAX))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Write a record via a temporary file and rename.
fn write_record(path: &Path, expiry: u64) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(TMP_SUFFIX);
    let tmp = PathBuf::from(tmp);

    let mut file = File::create(&tmp)?;
    write!(file, "{}", expiry)?;
    file.sync_data()?;
    fs::rename(&tmp, path)
}

fn ttl_seconds(ttl: Duration) -> u64 {
    // Round up so sub-second TTLs still cover at least one full second.
    ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn ledger_error(path: &Path, action: &str, e: std::io::Error) -> GateError {
    GateError::Ledger {
        message: format!("Failed to {} {}: {}", action, path.display(), e),
    }
}
