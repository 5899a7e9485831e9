//! Routes an operation name and positional string arguments to the engine.

use std::str::FromStr;

use tracing::info;

use crate::Amount;
use crate::csv::parse_id_list;
use crate::engine::{Batch, Engine, EngineError};
use crate::ledger::Ledger;
use crate::model::AuditResult;

/// A single request: operation name plus positional string arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub op: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new<I, S>(op: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            op: op.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Every dispatchable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateCompany,
    CreateUser,
    RegisterUserRole,
    Transfer,
    LawyerAudit,
    AuditorAudit,
    CreditCompany,
    AccrueUserFund,
    ReleaseTransactionFunds,
    GetCompanyById,
    GetUserById,
    GetUserCompanyFund,
    GetUserFund,
    GetUserRoleByCid,
    GetUserRole,
    GetTransactionById,
}

impl Operation {
    pub const ALL: [Operation; 16] = [
        Operation::CreateCompany,
        Operation::CreateUser,
        Operation::RegisterUserRole,
        Operation::Transfer,
        Operation::LawyerAudit,
        Operation::AuditorAudit,
        Operation::CreditCompany,
        Operation::AccrueUserFund,
        Operation::ReleaseTransactionFunds,
        Operation::GetCompanyById,
        Operation::GetUserById,
        Operation::GetUserCompanyFund,
        Operation::GetUserFund,
        Operation::GetUserRoleByCid,
        Operation::GetUserRole,
        Operation::GetTransactionById,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Operation::CreateCompany => "createCompany",
            Operation::CreateUser => "createUser",
            Operation::RegisterUserRole => "registerUserRole",
            Operation::Transfer => "transfer",
            Operation::LawyerAudit => "lawyerAuditTransaction",
            Operation::AuditorAudit => "auditorAuditTransaction",
            Operation::CreditCompany => "creditCompany",
            Operation::AccrueUserFund => "accrueUserFund",
            Operation::ReleaseTransactionFunds => "releaseTransactionFunds",
            Operation::GetCompanyById => "getCompanyByID",
            Operation::GetUserById => "getUserByID",
            Operation::GetUserCompanyFund => "getUserCompanyFund",
            Operation::GetUserFund => "getUserFund",
            Operation::GetUserRoleByCid => "getUserRoleByCID",
            Operation::GetUserRole => "getUserRole",
            Operation::GetTransactionById => "getTransactionByID",
        }
    }

    /// Number of positional arguments the operation takes.
    pub fn arity(self) -> usize {
        match self {
            Operation::CreateCompany
            | Operation::RegisterUserRole
            | Operation::Transfer
            | Operation::LawyerAudit
            | Operation::AuditorAudit => 4,
            Operation::AccrueUserFund => 3,
            Operation::CreateUser
            | Operation::CreditCompany
            | Operation::GetUserCompanyFund
            | Operation::GetUserFund
            | Operation::GetUserRoleByCid
            | Operation::GetUserRole => 2,
            Operation::ReleaseTransactionFunds
            | Operation::GetCompanyById
            | Operation::GetUserById
            | Operation::GetTransactionById => 1,
        }
    }
}

impl FromStr for Operation {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| EngineError::invalid(format!("unexpected function '{s}'")))
    }
}

impl<L: Ledger> Engine<L> {
    /// Run one invocation and return its JSON-encoded result.
    pub fn dispatch(&self, invocation: &Invocation) -> Result<Vec<u8>, EngineError> {
        let result = invocation.op.parse::<Operation>().and_then(|op| {
            let expected = op.arity();
            if invocation.args.len() != expected {
                return Err(EngineError::invalid(format!(
                    "{}: expected {expected} arguments, got {}",
                    op.name(),
                    invocation.args.len()
                )));
            }
            self.execute(op, &invocation.args)
        });
        log_result(invocation, &result);
        result
    }

    fn execute(&self, op: Operation, args: &[String]) -> Result<Vec<u8>, EngineError> {
        let bytes = match op {
            Operation::CreateCompany => serde_json::to_vec(&self.create_company(
                &args[0],
                &args[1],
                parse_amount("fundInitial", &args[2])?,
                parse_int("cType", &args[3])?,
            )?)?,
            Operation::CreateUser => serde_json::to_vec(&self.create_user(&args[0], &args[1])?)?,
            Operation::RegisterUserRole => serde_json::to_vec(&self.register_user_role(
                parse_id("uid", &args[0])?,
                parse_id("cid", &args[1])?,
                parse_int("cType", &args[2])?,
                parse_int("role", &args[3])?,
            )?)?,
            Operation::Transfer => serde_json::to_vec(&self.transfer(
                parse_id("cid", &args[0])?,
                parse_id("fromUid", &args[1])?,
                parse_id("toUid", &args[2])?,
                parse_amount("amount", &args[3])?,
            )?)?,
            Operation::LawyerAudit => serde_json::to_vec(&self.audit_by_lawyer(
                parse_id("txid", &args[0])?,
                parse_id("lawyerUid", &args[1])?,
                parse_result(&args[2])?,
                &args[3],
            )?)?,
            Operation::AuditorAudit => serde_json::to_vec(&self.audit_by_auditor(
                parse_id("txid", &args[0])?,
                parse_id("auditorUid", &args[1])?,
                parse_result(&args[2])?,
                &args[3],
            )?)?,
            Operation::CreditCompany => serde_json::to_vec(&self.credit_company(
                parse_id("cid", &args[0])?,
                parse_amount("amount", &args[1])?,
            )?)?,
            Operation::AccrueUserFund => serde_json::to_vec(&self.accrue_user_fund(
                parse_id("cid", &args[0])?,
                parse_id("uid", &args[1])?,
                parse_amount("amount", &args[2])?,
            )?)?,
            Operation::ReleaseTransactionFunds => {
                serde_json::to_vec(&self.release_funds(parse_id("txid", &args[0])?)?)?
            }
            Operation::GetCompanyById => {
                serde_json::to_vec(&self.company(parse_id("cid", &args[0])?)?)?
            }
            Operation::GetUserById => serde_json::to_vec(&self.user(parse_id("uid", &args[0])?)?)?,
            Operation::GetUserCompanyFund => serde_json::to_vec(&self.user_fund(
                parse_id("cid", &args[0])?,
                parse_id("uid", &args[1])?,
            )?)?,
            Operation::GetUserFund => {
                let cids = parse_cids(&args[0])?;
                let batch = Batch::from(self.user_funds(&cids, parse_id("uid", &args[1])?));
                serde_json::to_vec(&batch)?
            }
            Operation::GetUserRoleByCid => serde_json::to_vec(&self.user_role(
                parse_id("cid", &args[0])?,
                parse_id("uid", &args[1])?,
            )?)?,
            Operation::GetUserRole => {
                let cids = parse_cids(&args[0])?;
                let batch = Batch::from(self.user_roles(&cids, parse_id("uid", &args[1])?));
                serde_json::to_vec(&batch)?
            }
            Operation::GetTransactionById => {
                serde_json::to_vec(&self.transaction(parse_id("txid", &args[0])?)?)?
            }
        };
        Ok(bytes)
    }
}

/// Small helper to log `dispatch` results
fn log_result(invocation: &Invocation, result: &Result<Vec<u8>, EngineError>) {
    match result {
        Ok(_) => info!(op = %invocation.op, args = ?invocation.args, "invocation applied"),
        Err(e) => info!(
            op = %invocation.op,
            args = ?invocation.args,
            reason = %e,
            "invocation failed"
        ),
    }
}

fn parse_id(field: &str, value: &str) -> Result<u64, EngineError> {
    value
        .trim()
        .parse()
        .map_err(|e| EngineError::invalid(format!("{field} '{value}': {e}")))
}

fn parse_int(field: &str, value: &str) -> Result<i64, EngineError> {
    value
        .trim()
        .parse()
        .map_err(|e| EngineError::invalid(format!("{field} '{value}': {e}")))
}

fn parse_amount(field: &str, value: &str) -> Result<Amount, EngineError> {
    value
        .parse()
        .map_err(|e| EngineError::invalid(format!("{field} '{value}': {e}")))
}

fn parse_result(value: &str) -> Result<AuditResult, EngineError> {
    value.parse().map_err(EngineError::InvalidArgument)
}

fn parse_cids(list: &str) -> Result<Vec<u64>, EngineError> {
    parse_id_list(list).map_err(|e| EngineError::invalid(e.to_string()))
}
