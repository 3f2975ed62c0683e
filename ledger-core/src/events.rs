//! Events emitted by the ledger store for external collaborators.
//!
//! Derived state outside this crate (activity feeds, search indexes,
//! notifications) needs to react to ledger mutations without the store
//! knowing anything about those consumers. A small set of explicit events
//! a `LedgerStore` emits after a successful mutation covers that. The core
//! itself only consumes `CreditLimitChanged` and `PaymentCommitted`, for
//! its own cache maintenance in `graph.rs`.

use crate::ledger::{AccountId, CreditLineId, PaymentId};
use crate::node::NodeId;

/// Something the ledger store did that external collaborators, or the
/// core's own cache maintenance, may need to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    /// A creditline's `limit` was created or updated.
    CreditLimitChanged {
        account: AccountId,
        creditline: CreditLineId,
    },
    /// A payment was committed (`routed` or `direct`), affecting `accounts`.
    PaymentCommitted {
        payment: PaymentId,
        accounts: Vec<AccountId>,
    },
    /// A node and all its creditlines were removed.
    NodeDeleted { node: NodeId },
}

/// Minimal in-process subscriber list. A real deployment would hand these
/// to a message bus; the core only ever needs to observe its own events
/// synchronously to patch the cached graphs, so a `Vec` of closures is
/// sufficient here.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Box<dyn FnMut(&LedgerEvent) + Send>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe<F>(&mut self, f: F)
    where
        F: FnMut(&LedgerEvent) + Send + 'static,
    {
        self.subscribers.push(Box::new(f));
    }

    pub fn emit(&mut self, event: LedgerEvent) {
        for sub in &mut self.subscribers {
            sub(&event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EventBus({} subscribers)", self.subscribers.len())
    }
}
