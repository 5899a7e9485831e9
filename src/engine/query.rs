//! Read-only projections.

use serde::Serialize;
use tracing::debug;

use super::{Engine, EngineError};
use crate::ledger::Ledger;
use crate::model::{Company, CompanyId, Transaction, TxId, User, UserFund, UserId, UserRole};
use crate::store::{
    StoreError, company_key, transaction_key, user_fund_key, user_key, user_role_key,
};

/// Per-company outcome of a batch lookup, in request order.
pub type BatchItems<T> = Vec<(CompanyId, Result<T, StoreError>)>;

/// A company id a batch lookup could not resolve, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub cid: CompanyId,
    pub error: String,
}

/// Batch lookup result split into found records and failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Batch<T> {
    pub records: Vec<T>,
    pub failures: Vec<BatchFailure>,
}

impl<T> From<BatchItems<T>> for Batch<T> {
    fn from(items: BatchItems<T>) -> Self {
        let mut records = Vec::new();
        let mut failures = Vec::new();
        for (cid, item) in items {
            match item {
                Ok(record) => records.push(record),
                Err(e) => failures.push(BatchFailure {
                    cid,
                    error: e.to_string(),
                }),
            }
        }
        Self { records, failures }
    }
}

impl<L: Ledger> Engine<L> {
    pub fn company(&self, cid: CompanyId) -> Result<Company, EngineError> {
        Ok(self.store.get(&company_key(cid))?)
    }

    pub fn user(&self, uid: UserId) -> Result<User, EngineError> {
        Ok(self.store.get(&user_key(uid))?)
    }

    pub fn transaction(&self, txid: TxId) -> Result<Transaction, EngineError> {
        Ok(self.store.get(&transaction_key(txid))?)
    }

    pub fn user_fund(&self, cid: CompanyId, uid: UserId) -> Result<UserFund, EngineError> {
        Ok(self.store.get(&user_fund_key(cid, uid))?)
    }

    pub fn user_role(&self, cid: CompanyId, uid: UserId) -> Result<UserRole, EngineError> {
        Ok(self.store.get(&user_role_key(cid, uid))?)
    }

    /// Fund buckets of `uid` across `cids`, one read per company.
    pub fn user_funds(&self, cids: &[CompanyId], uid: UserId) -> BatchItems<UserFund> {
        cids.iter()
            .map(|&cid| {
                let item = self.store.get(&user_fund_key(cid, uid));
                if let Err(e) = &item {
                    debug!(cid = %cid, uid = %uid, reason = %e, "user fund unavailable");
                }
                (cid, item)
            })
            .collect()
    }

    /// Roles of `uid` across `cids`, one read per company.
    pub fn user_roles(&self, cids: &[CompanyId], uid: UserId) -> BatchItems<UserRole> {
        cids.iter()
            .map(|&cid| {
                let item = self.store.get(&user_role_key(cid, uid));
                if let Err(e) = &item {
                    debug!(cid = %cid, uid = %uid, reason = %e, "user role unavailable");
                }
                (cid, item)
            })
            .collect()
    }
}
