//! Monotonic identifier allocation.

use super::{Engine, EngineError};
use crate::ledger::Ledger;

/// Entity kinds that draw identifiers from a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sequence {
    Company,
    User,
    Transaction,
}

impl Sequence {
    pub fn counter_key(self) -> &'static str {
        match self {
            Sequence::Company => "current_cid",
            Sequence::User => "current_uid",
            Sequence::Transaction => "current_txid",
        }
    }
}

impl<L: Ledger> Engine<L> {
    /// Allocate the next identifier for `seq`. The first allocation yields 1.
    ///
    /// The counter read and write run under the counter's key lock, so
    /// concurrent callers never observe the same prior value.
    pub fn allocate(&self, seq: Sequence) -> Result<u64, EngineError> {
        let key = seq.counter_key();
        self.locks.with(key, || -> Result<u64, EngineError> {
            let current = self.store.read_counter(key)?;
            let next = current
                .checked_add(1)
                .ok_or_else(|| EngineError::Overflow(key.to_string()))?;
            self.store.write_counter(key, next)?;
            Ok(next)
        })
    }
}
