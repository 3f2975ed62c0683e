//! Error taxonomy.
//!
//! Three layers: the ledger store's own transactional errors
//! (`LedgerError`), the router's internal failure modes (`RouteError`,
//! which never escape the executor), and the payment executor's
//! caller-facing errors (`PaymentError`), which translate router failures
//! at that boundary. Audit failures (`AuditError`) are a fourth,
//! independent family since audits never mutate state.

use crate::ledger::{AccountId, CreditLineId, PaymentId};
use crate::node::NodeId;
use ledger_amount::AmountError;
use thiserror::Error;

/// Errors raised by `LedgerStore` mutations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    #[error("account {0:?} not found")]
    AccountNotFound(AccountId),
    #[error("creditline {0:?} not found")]
    CreditLineNotFound(CreditLineId),
    #[error("payment {0:?} not found")]
    PaymentNotFound(PaymentId),
    /// Setting `limit` would leave the account's current balance outside
    /// the resulting `[-limit, partner_limit]` window.
    #[error("new limit would leave account {account:?}'s balance outside [-limit, partner_limit]")]
    LimitBelowBalance { account: AccountId },
    /// A creditline's limit must be non-negative, or `Amount::Infinity`.
    #[error("credit limit must be non-negative or infinite, got {limit}")]
    NegativeLimit { limit: ledger_amount::Amount },
    /// A payment's amount must be finite and strictly positive.
    #[error("payment amount must be positive, got {amount}")]
    NonPositivePaymentAmount { amount: ledger_amount::Amount },
    /// A concurrent balance change caused a per-edge limit check to fail at
    /// commit time.
    #[error("concurrent balance change violated a creditline limit on account {account:?}")]
    LimitCollision { account: AccountId },
    #[error("amount error: {0}")]
    Amount(#[from] AmountError),
}

/// Router-internal failure modes. These never escape the executor
/// boundary; `PaymentError::from` folds them into the caller-facing set.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("payer and recipient are not in the same connected component")]
    NotConnected,
    #[error("node demands do not sum to zero")]
    DemandMismatch,
    #[error("a negative-weight cycle makes the flow cost unbounded")]
    Unbounded,
    #[error("no feasible flow satisfies the requested demand")]
    Infeasible,
}

/// Errors surfaced by `attempt_payment`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("no route exists between payer and recipient")]
    NoRoute,
    #[error("network has insufficient aggregate capacity for this payment")]
    Infeasible,
    #[error("concurrent balance change prevented this payment from committing")]
    LimitCollision,
    #[error("payment amount must be positive")]
    InvalidAmount,
}

impl From<RouteError> for PaymentError {
    /// Translate router-internal errors at the executor boundary:
    /// `NotConnected`/`DemandMismatch` ⇒ `NoRoute`; `Unbounded`/`Infeasible`
    /// ⇒ `Infeasible`. The underlying cause is logged by the caller before
    /// this conversion discards it.
    fn from(e: RouteError) -> PaymentError {
        match e {
            RouteError::NotConnected | RouteError::DemandMismatch => PaymentError::NoRoute,
            RouteError::Unbounded | RouteError::Infeasible => PaymentError::Infeasible,
        }
    }
}

impl From<LedgerError> for PaymentError {
    fn from(e: LedgerError) -> PaymentError {
        match e {
            LedgerError::LimitCollision { .. } => PaymentError::LimitCollision,
            LedgerError::NonPositivePaymentAmount { .. } => PaymentError::InvalidAmount,
            _ => PaymentError::Infeasible,
        }
    }
}

/// Offline audit failures. Audits report offenders; they never mutate the
/// ledger.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("account {account:?} balance {balance} does not equal entry sum {entry_sum}")]
    LedgerInconsistent {
        account: AccountId,
        balance: ledger_amount::Amount,
        entry_sum: ledger_amount::Amount,
    },
    #[error("payment {payment:?} entries for node {node} do not sum to the expected signed amount")]
    PaymentInconsistent { payment: PaymentId, node: NodeId },
}
