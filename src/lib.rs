pub mod amount;
pub mod csv;
pub mod dispatch;
pub mod engine;
pub mod ledger;
pub mod model;
pub mod store;

pub use amount::Amount;
pub use dispatch::{Invocation, Operation};
pub use engine::{Engine, EngineError};
pub use ledger::{Ledger, MemoryLedger};
pub use model::{
    AuditResult, AuditRole, Company, CompanyId, Transaction, TransactionStatus, TxId, User,
    UserFund, UserId, UserRole,
};
