//! Balance-affecting operations on company balances and user fund buckets.
//!
//! Each operation is a read-modify-write of a single key, run under that
//! key's lock.

use tracing::info;

use super::{Engine, EngineError};
use crate::Amount;
use crate::ledger::Ledger;
use crate::model::{self, Company, CompanyId, UserFund, UserId};
use crate::store::{company_key, user_fund_key};

impl<L: Ledger> Engine<L> {
    /// Debit a company's balance. Fails with `InsufficientFunds`, writing
    /// nothing, if the balance is lower than `amount`.
    pub fn debit_company(&self, cid: CompanyId, amount: Amount) -> Result<Company, EngineError> {
        let key = company_key(cid);
        self.locks.with(&key, || -> Result<Company, EngineError> {
            let mut company: Company = self.store.get(&key)?;
            company.fund_balance = company.fund_balance.checked_sub(amount).ok_or(
                EngineError::InsufficientFunds {
                    cid,
                    balance: company.fund_balance,
                    requested: amount,
                },
            )?;
            self.store.put(&company)?;
            Ok(company)
        })
    }

    /// Credit a company's balance, e.g. to reverse a debit.
    pub fn credit_company(&self, cid: CompanyId, amount: Amount) -> Result<Company, EngineError> {
        let key = company_key(cid);
        let company = self.locks.with(&key, || -> Result<Company, EngineError> {
            let mut company: Company = self.store.get(&key)?;
            company.fund_balance = company
                .fund_balance
                .checked_add(amount)
                .ok_or_else(|| EngineError::Overflow(key.clone()))?;
            self.store.put(&company)?;
            Ok(company)
        })?;
        info!(cid = %cid, amount = %amount, balance = %company.fund_balance, "company credited");
        Ok(company)
    }

    /// Add `amount` to the (company, user) fund bucket. An absent bucket
    /// starts from zero.
    pub fn accrue_user_fund(
        &self,
        cid: CompanyId,
        uid: UserId,
        amount: Amount,
    ) -> Result<UserFund, EngineError> {
        let key = user_fund_key(cid, uid);
        let fund = self.locks.with(&key, || -> Result<UserFund, EngineError> {
            let now = model::now();
            let mut fund = self
                .store
                .find::<UserFund>(&key)?
                .unwrap_or_else(|| UserFund::empty(cid, uid, now));
            fund.fund = fund
                .fund
                .checked_add(amount)
                .ok_or_else(|| EngineError::Overflow(key.clone()))?;
            fund.modify_time = now;
            self.store.put(&fund)?;
            Ok(fund)
        })?;
        info!(cid = %cid, uid = %uid, amount = %amount, fund = %fund.fund, "user fund accrued");
        Ok(fund)
    }
}
