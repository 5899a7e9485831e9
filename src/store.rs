//! Typed record access over the raw ledger, and the key naming scheme.

use std::fmt;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::ledger::{Ledger, LedgerError};
use crate::model::{Company, CompanyId, Transaction, TxId, User, UserFund, UserId, UserRole};

/// Kind of record stored under a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Company,
    User,
    UserRole,
    UserFund,
    Transaction,
    Counter,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Company => "company",
            EntityKind::User => "user",
            EntityKind::UserRole => "user role",
            EntityKind::UserFund => "user fund",
            EntityKind::Transaction => "transaction",
            EntityKind::Counter => "counter",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} '{key}' not found")]
    NotFound { kind: EntityKind, key: String },

    #[error("{kind} '{key}' is corrupt: {source}")]
    Encoding {
        kind: EntityKind,
        key: String,
        source: serde_json::Error,
    },

    #[error("failed to read '{key}': {source}")]
    Read { key: String, source: LedgerError },

    #[error("failed to write '{key}': {source}")]
    Write { key: String, source: LedgerError },
}

pub fn company_key(cid: CompanyId) -> String {
    format!("c_{cid}")
}

pub fn user_key(uid: UserId) -> String {
    format!("u_{uid}")
}

pub fn user_role_key(cid: CompanyId, uid: UserId) -> String {
    format!("ur_{cid}_{uid}")
}

pub fn user_fund_key(cid: CompanyId, uid: UserId) -> String {
    format!("uf_{cid}_{uid}")
}

pub fn transaction_key(txid: TxId) -> String {
    format!("tx_{txid}")
}

/// A record kind persisted under a deterministic key.
pub trait Record: Serialize + DeserializeOwned {
    const KIND: EntityKind;

    fn key(&self) -> String;
}

impl Record for Company {
    const KIND: EntityKind = EntityKind::Company;

    fn key(&self) -> String {
        company_key(self.cid)
    }
}

impl Record for User {
    const KIND: EntityKind = EntityKind::User;

    fn key(&self) -> String {
        user_key(self.uid)
    }
}

impl Record for UserRole {
    const KIND: EntityKind = EntityKind::UserRole;

    fn key(&self) -> String {
        user_role_key(self.cid, self.uid)
    }
}

impl Record for UserFund {
    const KIND: EntityKind = EntityKind::UserFund;

    fn key(&self) -> String {
        user_fund_key(self.cid, self.uid)
    }
}

impl Record for Transaction {
    const KIND: EntityKind = EntityKind::Transaction;

    fn key(&self) -> String {
        transaction_key(self.txid)
    }
}

/// Encodes and decodes records to and from the ledger.
///
/// No locking and no versioning: callers serialize read-modify-write
/// sequences on the same key.
pub struct EntityStore<L> {
    ledger: L,
}

impl<L: Ledger> EntityStore<L> {
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Read the record under `key`, or `None` if absent.
    pub fn find<R: Record>(&self, key: &str) -> Result<Option<R>, StoreError> {
        let bytes = self.ledger.get(key).map_err(|source| StoreError::Read {
            key: key.to_string(),
            source,
        })?;
        bytes
            .map(|bytes| {
                serde_json::from_slice(&bytes).map_err(|source| StoreError::Encoding {
                    kind: R::KIND,
                    key: key.to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// Read the record under `key`; absence is [`StoreError::NotFound`].
    pub fn get<R: Record>(&self, key: &str) -> Result<R, StoreError> {
        self.find(key)?.ok_or_else(|| StoreError::NotFound {
            kind: R::KIND,
            key: key.to_string(),
        })
    }

    /// Persist `record` under its own key, returning the bytes written.
    pub fn put<R: Record>(&self, record: &R) -> Result<Vec<u8>, StoreError> {
        let key = record.key();
        let bytes = serde_json::to_vec(record).map_err(|source| StoreError::Encoding {
            kind: R::KIND,
            key: key.clone(),
            source,
        })?;
        self.ledger
            .put(&key, bytes.clone())
            .map_err(|source| StoreError::Write { key, source })?;
        Ok(bytes)
    }

    /// Read a counter; absent counts as zero.
    pub fn read_counter(&self, key: &str) -> Result<u64, StoreError> {
        let bytes = self.ledger.get(key).map_err(|source| StoreError::Read {
            key: key.to_string(),
            source,
        })?;
        match bytes {
            None => Ok(0),
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Encoding {
                kind: EntityKind::Counter,
                key: key.to_string(),
                source,
            }),
        }
    }

    pub fn write_counter(&self, key: &str, value: u64) -> Result<(), StoreError> {
        // stored as a bare decimal number
        self.ledger
            .put(key, value.to_string().into_bytes())
            .map_err(|source| StoreError::Write {
                key: key.to_string(),
                source,
            })
    }
}
