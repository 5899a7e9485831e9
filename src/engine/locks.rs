use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Per-key mutual exclusion for read-modify-write sequences.
///
/// A lock entry lives only while some caller holds or waits on it.
/// Not reentrant: a closure must never lock the key it already holds.
#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`.
    pub fn with<R>(&self, key: &str, f: impl FnOnce() -> R) -> R {
        let lock = self
            .locks
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone();

        let result = {
            let _guard = lock.lock();
            f()
        };

        let mut locks = self.locks.lock();
        // one handle in the map, one here: nobody else is waiting
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
        result
    }

    /// Number of keys currently held or waited on.
    pub fn active(&self) -> usize {
        self.locks.lock().len()
    }
}
