//! Core domain records persisted in the ledger.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::Amount;

/// Company identifier.
pub type CompanyId = u64;

/// User identifier.
pub type UserId = u64;

/// Transaction identifier.
pub type TxId = u64;

/// Wall-clock sample in Unix milliseconds. Not monotonic, not unique.
pub type Timestamp = i64;

pub fn now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub cid: CompanyId,
    pub name: String,
    pub contract_hash: String,
    pub ctype: i64,
    pub fund_initial: Amount,
    pub fund_balance: Amount,
    pub create_time: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: UserId,
    pub name: String,
    pub pwd: String,
    pub create_time: Timestamp,
}

/// Role of a user within one company. One record per (company, user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole {
    pub uid: UserId,
    pub cid: CompanyId,
    pub ctype: i64,
    pub role: i64,
}

/// Per-(company, user) fund bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFund {
    pub cid: CompanyId,
    pub uid: UserId,
    pub fund: Amount,
    pub create_time: Timestamp,
    pub modify_time: Timestamp,
}

impl UserFund {
    /// An empty bucket, standing in for an absent record.
    pub fn empty(cid: CompanyId, uid: UserId, at: Timestamp) -> Self {
        Self {
            cid,
            uid,
            fund: Amount::ZERO,
            create_time: at,
            modify_time: at,
        }
    }
}

/// Outcome of a single audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditResult {
    Approve,
    Reject,
}

impl FromStr for AuditResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "approve" => Ok(AuditResult::Approve),
            "-1" | "reject" => Ok(AuditResult::Reject),
            other => Err(format!("unrecognized audit result '{other}'")),
        }
    }
}

/// Which of the two audit slots an audit fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditRole {
    Lawyer,
    Auditor,
}

impl fmt::Display for AuditRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditRole::Lawyer => f.write_str("lawyer"),
            AuditRole::Auditor => f.write_str("auditor"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    pub uid: UserId,
    pub result: AuditResult,
    pub remark: String,
    pub time: Timestamp,
}

/// Settlement status, derived from the two audit results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Settled,
    Rejected,
}

impl TransactionStatus {
    /// Any rejection rejects; two approvals settle; anything else is pending.
    pub fn derive(lawyer: Option<AuditResult>, auditor: Option<AuditResult>) -> Self {
        use AuditResult::{Approve, Reject};
        match (lawyer, auditor) {
            (Some(Reject), _) | (_, Some(Reject)) => TransactionStatus::Rejected,
            (Some(Approve), Some(Approve)) => TransactionStatus::Settled,
            _ => TransactionStatus::Pending,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != TransactionStatus::Pending
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: TxId,
    pub cid: CompanyId,
    pub from_uid: UserId,
    pub to_uid: UserId,
    pub fund_amount: Amount,
    pub create_time: Timestamp,
    pub lawyer_audit: Option<Audit>,
    pub auditor_audit: Option<Audit>,
    pub status: TransactionStatus,
    /// Set once the settlement step has moved the funds.
    #[serde(default)]
    pub funds_released: bool,
}

impl Transaction {
    /// A fresh transaction with both audit slots empty.
    pub fn new(
        txid: TxId,
        cid: CompanyId,
        from_uid: UserId,
        to_uid: UserId,
        fund_amount: Amount,
        create_time: Timestamp,
    ) -> Self {
        Self {
            txid,
            cid,
            from_uid,
            to_uid,
            fund_amount,
            create_time,
            lawyer_audit: None,
            auditor_audit: None,
            status: TransactionStatus::Pending,
            funds_released: false,
        }
    }

    pub fn audit(&self, role: AuditRole) -> Option<&Audit> {
        match role {
            AuditRole::Lawyer => self.lawyer_audit.as_ref(),
            AuditRole::Auditor => self.auditor_audit.as_ref(),
        }
    }

    /// Fill the slot for `role` and refresh the status.
    /// Returns `false` without touching the record if the slot is already set.
    pub fn record_audit(&mut self, role: AuditRole, audit: Audit) -> bool {
        let slot = match role {
            AuditRole::Lawyer => &mut self.lawyer_audit,
            AuditRole::Auditor => &mut self.auditor_audit,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(audit);
        self.refresh_status();
        true
    }

    pub fn derived_status(&self) -> TransactionStatus {
        TransactionStatus::derive(
            self.lawyer_audit.as_ref().map(|a| a.result),
            self.auditor_audit.as_ref().map(|a| a.result),
        )
    }

    pub fn refresh_status(&mut self) {
        self.status = self.derived_status();
    }
}
