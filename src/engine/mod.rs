//! Transaction lifecycle engine.
//!
//! The engine owns no state between calls: every operation reads what it
//! needs from the ledger, mutates it and writes it back. Read-modify-write
//! sequences on one key are serialized with [`KeyLocks`]; sequences spanning
//! several keys compensate earlier writes when a later one fails.
//!
//! A transfer debits the company and records a `Pending` transaction. A
//! lawyer and an auditor each audit it once; the status is derived from the
//! two results. Moving funds after a terminal status is an explicit step
//! ([`Engine::release_funds`]), never a side effect of an audit.

use tokio_stream::{Stream, StreamExt};
use tracing::{error, info, warn};

use crate::Amount;
use crate::dispatch::Invocation;
use crate::ledger::{Ledger, MemoryLedger};
use crate::model::{
    self, Audit, AuditResult, AuditRole, Company, CompanyId, Transaction, TransactionStatus,
    TxId, User, UserId, UserRole,
};
use crate::store::{EntityStore, transaction_key};

mod allocator;
pub use allocator::Sequence;

mod error;
pub use error::EngineError;

mod funds;

mod locks;
pub use locks::KeyLocks;

mod query;
pub use query::{Batch, BatchFailure, BatchItems};

/// The transaction lifecycle engine over a ledger `L`.
pub struct Engine<L = MemoryLedger> {
    store: EntityStore<L>,
    locks: KeyLocks,
}

/// Public API
impl<L: Ledger> Engine<L> {
    pub fn new(ledger: L) -> Self {
        Self {
            store: EntityStore::new(ledger),
            locks: KeyLocks::new(),
        }
    }

    pub fn ledger(&self) -> &L {
        self.store.ledger()
    }

    /// Dispatch every invocation of `stream` in order, handing each outcome
    /// to `on_outcome`. A failed invocation never stops the run.
    pub async fn run<F>(&self, mut stream: impl Stream<Item = Invocation> + Unpin, mut on_outcome: F)
    where
        F: FnMut(&Invocation, Result<Vec<u8>, EngineError>),
    {
        while let Some(invocation) = stream.next().await {
            let result = self.dispatch(&invocation);
            on_outcome(&invocation, result);
        }
    }

    pub fn create_company(
        &self,
        name: &str,
        contract_hash: &str,
        fund_initial: Amount,
        ctype: i64,
    ) -> Result<Company, EngineError> {
        require_non_empty("company name", name)?;
        let cid = self.allocate(Sequence::Company)?;
        let company = Company {
            cid,
            name: name.to_string(),
            contract_hash: contract_hash.to_string(),
            ctype,
            fund_initial,
            fund_balance: fund_initial,
            create_time: model::now(),
        };
        self.store.put(&company)?;
        info!(cid = %cid, fund = %fund_initial, "company created");
        Ok(company)
    }

    pub fn create_user(&self, name: &str, pwd: &str) -> Result<User, EngineError> {
        require_non_empty("user name", name)?;
        let uid = self.allocate(Sequence::User)?;
        let user = User {
            uid,
            name: name.to_string(),
            pwd: pwd.to_string(),
            create_time: model::now(),
        };
        self.store.put(&user)?;
        info!(uid = %uid, "user created");
        Ok(user)
    }

    /// Assign `uid` a role in `cid`, replacing any earlier role.
    pub fn register_user_role(
        &self,
        uid: UserId,
        cid: CompanyId,
        ctype: i64,
        role: i64,
    ) -> Result<UserRole, EngineError> {
        self.user(uid)?;
        self.company(cid)?;
        let user_role = UserRole {
            uid,
            cid,
            ctype,
            role,
        };
        self.store.put(&user_role)?;
        info!(cid = %cid, uid = %uid, role, "user role registered");
        Ok(user_role)
    }

    /// Debit `amount` from the company and record a `Pending` transaction.
    ///
    /// `InsufficientFunds` aborts before any write. If recording the
    /// transaction fails after the debit, the debit is credited back.
    pub fn transfer(
        &self,
        cid: CompanyId,
        from_uid: UserId,
        to_uid: UserId,
        amount: Amount,
    ) -> Result<Transaction, EngineError> {
        if amount.is_zero() {
            return Err(EngineError::invalid("transfer amount must be positive"));
        }
        self.user(from_uid)?;
        self.user(to_uid)?;

        let company = self.debit_company(cid, amount)?;

        match self.record_transfer(cid, from_uid, to_uid, amount) {
            Ok(tx) => {
                info!(
                    txid = %tx.txid,
                    cid = %cid,
                    amount = %amount,
                    balance = %company.fund_balance,
                    "transfer recorded"
                );
                Ok(tx)
            }
            Err(e) => {
                self.reverse_debit(cid, amount, &e);
                Err(e)
            }
        }
    }

    pub fn audit_by_lawyer(
        &self,
        txid: TxId,
        lawyer_uid: UserId,
        result: AuditResult,
        remark: &str,
    ) -> Result<Transaction, EngineError> {
        self.audit(AuditRole::Lawyer, txid, lawyer_uid, result, remark)
    }

    pub fn audit_by_auditor(
        &self,
        txid: TxId,
        auditor_uid: UserId,
        result: AuditResult,
        remark: &str,
    ) -> Result<Transaction, EngineError> {
        self.audit(AuditRole::Auditor, txid, auditor_uid, result, remark)
    }

    /// Move the funds of a transaction that reached a terminal status:
    /// - `Settled`: accrue the amount into the recipient's fund bucket
    /// - `Rejected`: credit the amount back to the company
    ///
    /// Runs at most once per transaction.
    pub fn release_funds(&self, txid: TxId) -> Result<Transaction, EngineError> {
        let key = transaction_key(txid);
        let tx = self.locks.with(&key, || -> Result<Transaction, EngineError> {
            let mut tx: Transaction = self.store.get(&key)?;
            if !tx.status.is_terminal() {
                return Err(EngineError::NotTerminal(txid));
            }
            if tx.funds_released {
                return Err(EngineError::AlreadyReleased(txid));
            }

            // marked before the funds move
            tx.funds_released = true;
            self.store.put(&tx)?;

            let moved = if tx.status == TransactionStatus::Settled {
                self.accrue_user_fund(tx.cid, tx.to_uid, tx.fund_amount)
                    .map(drop)
            } else {
                self.credit_company(tx.cid, tx.fund_amount).map(drop)
            };

            if let Err(e) = moved {
                tx.funds_released = false;
                if let Err(undo) = self.store.put(&tx) {
                    error!(
                        txid = %txid,
                        reason = %e,
                        undo = %undo,
                        "funds not moved but transaction still marked released; needs repair"
                    );
                }
                return Err(e);
            }
            Ok(tx)
        })?;
        info!(txid = %txid, status = ?tx.status, amount = %tx.fund_amount, "funds released");
        Ok(tx)
    }
}

/// Private API
impl<L: Ledger> Engine<L> {
    fn record_transfer(
        &self,
        cid: CompanyId,
        from_uid: UserId,
        to_uid: UserId,
        amount: Amount,
    ) -> Result<Transaction, EngineError> {
        let txid = self.allocate(Sequence::Transaction)?;
        let tx = Transaction::new(txid, cid, from_uid, to_uid, amount, model::now());
        self.store.put(&tx)?;
        Ok(tx)
    }

    /// Credit back a debit whose transaction could not be recorded.
    fn reverse_debit(&self, cid: CompanyId, amount: Amount, cause: &EngineError) {
        match self.credit_company(cid, amount) {
            Ok(_) => warn!(
                cid = %cid,
                amount = %amount,
                reason = %cause,
                "transfer aborted, debit reversed"
            ),
            Err(e) => error!(
                cid = %cid,
                amount = %amount,
                reason = %cause,
                compensation = %e,
                "transfer aborted and debit not reversed; company balance needs repair"
            ),
        }
    }

    /// Fill the `role` audit slot of `txid` and re-derive its status.
    fn audit(
        &self,
        role: AuditRole,
        txid: TxId,
        uid: UserId,
        result: AuditResult,
        remark: &str,
    ) -> Result<Transaction, EngineError> {
        if uid == 0 {
            return Err(EngineError::invalid(format!("{role} uid must be non-zero")));
        }
        self.user(uid)?;

        let key = transaction_key(txid);
        let tx = self.locks.with(&key, || -> Result<Transaction, EngineError> {
            let mut tx: Transaction = self.store.get(&key)?;
            let audit = Audit {
                uid,
                result,
                remark: remark.to_string(),
                time: model::now(),
            };
            if !tx.record_audit(role, audit) {
                return Err(EngineError::AlreadyAudited { txid, role });
            }
            self.store.put(&tx)?;
            Ok(tx)
        })?;

        info!(
            txid = %txid,
            role = %role,
            uid = %uid,
            result = ?result,
            status = ?tx.status,
            "transaction audited"
        );
        Ok(tx)
    }
}

impl Default for Engine<MemoryLedger> {
    fn default() -> Self {
        Self::new(MemoryLedger::new())
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::invalid(format!("{field} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    // test utils

    struct Fixture {
        engine: Engine,
        cid: CompanyId,
        payer: UserId,
        payee: UserId,
        lawyer: UserId,
        auditor: UserId,
    }

    fn fixture(initial: u64) -> Fixture {
        let engine: Engine = Engine::default();
        let cid = engine
            .create_company("acme", "0xcontract", Amount::new(initial), 1)
            .unwrap()
            .cid;
        let payer = engine.create_user("payer", "pw").unwrap().uid;
        let payee = engine.create_user("payee", "pw").unwrap().uid;
        let lawyer = engine.create_user("lawyer", "pw").unwrap().uid;
        let auditor = engine.create_user("auditor", "pw").unwrap().uid;
        Fixture {
            engine,
            cid,
            payer,
            payee,
            lawyer,
            auditor,
        }
    }

    impl Fixture {
        fn transfer(&self, amount: u64) -> Result<Transaction, EngineError> {
            self.engine
                .transfer(self.cid, self.payer, self.payee, Amount::new(amount))
        }

        fn balance(&self) -> Amount {
            self.engine.company(self.cid).unwrap().fund_balance
        }
    }

    // Creation

    #[test]
    fn create_company_starts_with_full_balance() {
        let engine: Engine = Engine::default();
        let company = engine
            .create_company("acme", "0xabc", Amount::new(10_000), 3)
            .unwrap();
        assert_eq!(company.cid, 1);
        assert_eq!(company.fund_initial, Amount::new(10_000));
        assert_eq!(company.fund_balance, Amount::new(10_000));
        assert_eq!(engine.company(1).unwrap(), company);
    }

    #[test]
    fn create_company_rejects_empty_name() {
        let engine: Engine = Engine::default();
        let err = engine
            .create_company("  ", "0xabc", Amount::new(1), 1)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
        // no identifier consumed
        assert_eq!(engine.allocate(Sequence::Company).unwrap(), 1);
    }

    #[test]
    fn user_ids_increase() {
        let engine: Engine = Engine::default();
        assert_eq!(engine.create_user("a", "pw").unwrap().uid, 1);
        assert_eq!(engine.create_user("b", "pw").unwrap().uid, 2);
    }

    #[test]
    fn later_role_registration_overwrites() {
        let f = fixture(0);
        f.engine.register_user_role(f.payer, f.cid, 1, 2).unwrap();
        f.engine.register_user_role(f.payer, f.cid, 1, 9).unwrap();
        assert_eq!(f.engine.user_role(f.cid, f.payer).unwrap().role, 9);
    }

    #[test]
    fn role_for_unknown_company_fails() {
        let f = fixture(0);
        let err = f.engine.register_user_role(f.payer, 99, 1, 2).unwrap_err();
        assert!(err.is_not_found());
    }

    // Transfer

    #[test]
    fn transfer_debits_and_records_pending() {
        let f = fixture(10_000);
        let tx = f.transfer(4000).unwrap();

        assert_eq!(tx.txid, 1);
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(tx.lawyer_audit.is_none() && tx.auditor_audit.is_none());
        assert_eq!(f.balance(), Amount::new(6000));
        assert_eq!(f.engine.transaction(1).unwrap(), tx);
    }

    #[test]
    fn transfer_insufficient_funds_writes_nothing() {
        let f = fixture(6000);
        let err = f.transfer(50_000).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { .. }));
        assert_eq!(f.balance(), Amount::new(6000));
        assert!(f.engine.transaction(1).unwrap_err().is_not_found());
        assert_eq!(f.engine.ledger().get("current_txid").unwrap(), None);
    }

    #[test]
    fn transfer_zero_amount_is_invalid() {
        let f = fixture(100);
        assert!(matches!(
            f.transfer(0),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn transfer_to_unknown_user_fails_before_debit() {
        let f = fixture(100);
        let err = f
            .engine
            .transfer(f.cid, f.payer, 404, Amount::new(10))
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(f.balance(), Amount::new(100));
    }

    #[test]
    fn failed_transaction_write_reverses_debit() {
        let f = fixture(1000);
        f.engine.ledger().fail_writes_with_prefix("tx_");

        let err = f.transfer(400).unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::Write { .. })));
        assert_eq!(f.balance(), Amount::new(1000));
    }

    // Audits

    #[test]
    fn dual_approval_settles() {
        let f = fixture(10_000);
        let tx = f.transfer(4000).unwrap();

        let tx = f
            .engine
            .audit_by_lawyer(tx.txid, f.lawyer, AuditResult::Approve, "ok")
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);

        let tx = f
            .engine
            .audit_by_auditor(tx.txid, f.auditor, AuditResult::Approve, "ok")
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Settled);
        assert_eq!(tx.audit(AuditRole::Lawyer).unwrap().uid, f.lawyer);
        assert_eq!(tx.audit(AuditRole::Auditor).unwrap().remark, "ok");
    }

    #[test]
    fn any_rejection_rejects_regardless_of_order() {
        let f = fixture(10_000);
        let tx = f.transfer(10).unwrap();
        let tx = f
            .engine
            .audit_by_auditor(tx.txid, f.auditor, AuditResult::Reject, "no")
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Rejected);

        // the other slot can still be filled, status stays terminal
        let tx = f
            .engine
            .audit_by_lawyer(tx.txid, f.lawyer, AuditResult::Approve, "fine")
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Rejected);
    }

    #[test]
    fn re_audit_is_rejected_and_record_unchanged() {
        let f = fixture(10_000);
        let tx = f.transfer(10).unwrap();
        let audited = f
            .engine
            .audit_by_lawyer(tx.txid, f.lawyer, AuditResult::Approve, "ok")
            .unwrap();

        let err = f
            .engine
            .audit_by_lawyer(tx.txid, f.auditor, AuditResult::Reject, "late")
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::AlreadyAudited {
                role: AuditRole::Lawyer,
                ..
            }
        ));
        assert_eq!(f.engine.transaction(tx.txid).unwrap(), audited);
    }

    #[test]
    fn audit_unknown_transaction_is_not_found() {
        let f = fixture(0);
        let err = f
            .engine
            .audit_by_auditor(77, f.auditor, AuditResult::Approve, "ok")
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn audit_with_zero_uid_is_invalid() {
        let f = fixture(100);
        let tx = f.transfer(10).unwrap();
        let err = f
            .engine
            .audit_by_lawyer(tx.txid, 0, AuditResult::Approve, "ok")
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    // Release

    #[test]
    fn release_settled_accrues_recipient_bucket_once() {
        let f = fixture(10_000);
        let tx = f.transfer(4000).unwrap();
        f.engine
            .audit_by_lawyer(tx.txid, f.lawyer, AuditResult::Approve, "ok")
            .unwrap();
        f.engine
            .audit_by_auditor(tx.txid, f.auditor, AuditResult::Approve, "ok")
            .unwrap();

        let released = f.engine.release_funds(tx.txid).unwrap();
        assert!(released.funds_released);
        assert_eq!(
            f.engine.user_fund(f.cid, f.payee).unwrap().fund,
            Amount::new(4000)
        );
        assert_eq!(f.balance(), Amount::new(6000));

        assert!(matches!(
            f.engine.release_funds(tx.txid),
            Err(EngineError::AlreadyReleased(_))
        ));
        assert_eq!(
            f.engine.user_fund(f.cid, f.payee).unwrap().fund,
            Amount::new(4000)
        );
    }

    #[test]
    fn release_rejected_credits_company() {
        let f = fixture(10_000);
        let tx = f.transfer(4000).unwrap();
        f.engine
            .audit_by_lawyer(tx.txid, f.lawyer, AuditResult::Reject, "no")
            .unwrap();

        f.engine.release_funds(tx.txid).unwrap();
        assert_eq!(f.balance(), Amount::new(10_000));
        assert!(f.engine.user_fund(f.cid, f.payee).unwrap_err().is_not_found());
    }

    #[test]
    fn release_pending_is_refused() {
        let f = fixture(10_000);
        let tx = f.transfer(1).unwrap();
        assert!(matches!(
            f.engine.release_funds(tx.txid),
            Err(EngineError::NotTerminal(_))
        ));
    }

    #[test]
    fn failed_fund_move_unmarks_release() {
        let f = fixture(10_000);
        let tx = f.transfer(100).unwrap();
        f.engine
            .audit_by_lawyer(tx.txid, f.lawyer, AuditResult::Approve, "ok")
            .unwrap();
        f.engine
            .audit_by_auditor(tx.txid, f.auditor, AuditResult::Approve, "ok")
            .unwrap();

        f.engine.ledger().fail_writes_with_prefix("uf_");
        assert!(f.engine.release_funds(tx.txid).is_err());
        assert!(!f.engine.transaction(tx.txid).unwrap().funds_released);

        f.engine.ledger().clear_write_faults();
        assert!(f.engine.release_funds(tx.txid).unwrap().funds_released);
    }

    //  Async run()

    #[tokio::test]
    async fn run_dispatches_in_order_and_continues_past_failures() {
        let engine: Engine = Engine::default();
        let invocations = vec![
            Invocation::new("createCompany", ["acme", "0xh", "100", "1"]),
            Invocation::new("createUser", ["a", "pw"]),
            Invocation::new("transfer", ["1", "1", "1", "500"]), // insufficient funds
            Invocation::new("transfer", ["1", "1", "1", "60"]),
        ];

        let mut outcomes = Vec::new();
        engine
            .run(tokio_stream::iter(invocations), |inv, result| {
                outcomes.push((inv.op.clone(), result.is_ok()));
            })
            .await;

        assert_eq!(
            outcomes,
            vec![
                ("createCompany".to_string(), true),
                ("createUser".to_string(), true),
                ("transfer".to_string(), false),
                ("transfer".to_string(), true),
            ]
        );
        assert_eq!(engine.company(1).unwrap().fund_balance, Amount::new(40));
    }
}
