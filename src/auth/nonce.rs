//! Nonce ledger contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::GateError;

/// Single-use token store used for replay protection.
///
/// Implementations must make `check_and_store` atomic: when two callers
/// present the same nonce concurrently, exactly one gets `Ok(true)`.
#[async_trait]
pub trait NonceLedger: Send + Sync {
    /// Record `nonce` for at least `ttl` if it is not already present.
    ///
    /// Returns `Ok(true)` if the nonce is new, `Ok(false)` if it was already
    /// recorded and has not expired.
    async fn check_and_store(&self, nonce: &str, ttl: Duration) -> Result<bool, GateError>;
}

/// In-memory nonce ledger with TTL-based expiry.
///
/// Only suitable for a single process; use
/// [`FileNonceLedger`](super::FileNonceLedger) when several workers share
/// replay state. Expiry uses the tokio clock.
#[derive(Default)]
pub struct MemoryNonceLedger {
    /// Nonce -> expiry. `None` means the TTL is too large to represent and
    /// the record never expires.
    records: Mutex<HashMap<String, Option<Instant>>>,
}

impl MemoryNonceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, Option<Instant>>> {
        // A panic while holding the lock cannot leave a record half-written.
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn prune(records: &mut HashMap<String, Option<Instant>>, now: Instant) {
        records.retain(|_, expiry| expiry.map_or(true, |at| at > now));
    }

    fn check_and_store_sync(&self, nonce: &str, ttl: Duration) -> bool {
        let mut records = self.records();
        let now = Instant::now();
        Self::prune(&mut records, now);

        if records.contains_key(nonce) {
            return false;
        }
        records.insert(nonce.to_string(), now.checked_add(ttl));
        true
    }

    /// Number of records held, expired or not (for monitoring).
    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired records.
    pub fn cleanup(&self) {
        Self::prune(&mut self.records(), Instant::now());
    }

    /// Spawn a tokio task that calls [`MemoryNonceLedger::cleanup`] every
    /// `interval`.
    pub fn start_cleanup_task(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let ledger = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                ledger.cleanup();
            }
        })
    }
}

#[async_trait]
impl NonceLedger for MemoryNonceLedger {
    async fn check_and_store(&self, nonce: &str, ttl: Duration) -> Result<bool, GateError> {
        Ok(self.check_and_store_sync(nonce, ttl))
    }
}
