//! The external key-value ledger the engine persists into.
//!
//! Only point reads and point writes are assumed. There are no range scans and
//! no multi-key atomicity, so the engine serializes read-modify-write
//! sequences itself (see [`KeyLocks`](crate::engine::KeyLocks)).

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger rejected write to '{0}'")]
    WriteRejected(String),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Point read/write access to durable state.
///
/// Implementations must give per-key read-after-write consistency. An absent
/// key reads as `Ok(None)`.
pub trait Ledger: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError>;

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), LedgerError>;
}

/// In-process ledger.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    /// Writes to keys with any of these prefixes are rejected.
    write_faults: RwLock<Vec<String>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every subsequent write whose key starts with `prefix`.
    pub fn fail_writes_with_prefix(&self, prefix: impl Into<String>) {
        self.write_faults.write().push(prefix.into());
    }

    pub fn clear_write_faults(&self) {
        self.write_faults.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }
}

impl Ledger for MemoryLedger {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), LedgerError> {
        if self
            .write_faults
            .read()
            .iter()
            .any(|prefix| key.starts_with(prefix.as_str()))
        {
            return Err(LedgerError::WriteRejected(key.to_string()));
        }
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }
}
