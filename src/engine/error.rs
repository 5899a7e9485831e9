//! Error types for engine operations.

use thiserror::Error;

use crate::Amount;
use crate::model::{AuditRole, CompanyId, TxId};
use crate::store::StoreError;

/// Top-level error returned by every [`Engine`](super::Engine) operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("insufficient funds for company {cid}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        cid: CompanyId,
        balance: Amount,
        requested: Amount,
    },

    #[error("transaction {txid} has already been audited by another {role}")]
    AlreadyAudited { txid: TxId, role: AuditRole },

    #[error("transaction {0} is still pending")]
    NotTerminal(TxId),

    #[error("funds for transaction {0} have already been released")]
    AlreadyReleased(TxId),

    #[error("amount overflow on '{0}'")]
    Overflow(String),

    #[error("failed to encode response: {0}")]
    Response(#[from] serde_json::Error),
}

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidArgument(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::Store(StoreError::NotFound { .. }))
    }
}
