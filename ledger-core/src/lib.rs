//! Mutual-credit ledger engine: a `LedgerStore` plus its two cached
//! `FlowGraph`s, wrapped in a single-writer/multiple-reader concurrency
//! contract.
//!
//! The graph cache here mirrors a per-process cache keyed by a version
//! string and rebuilt lazily, reframed as a single in-process `RwLock`
//! rather than a web framework's request-scoped cache.

pub mod audit;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod flow;
pub mod graph;
pub mod ledger;
pub mod maxflow;
pub mod node;
pub mod reputation;

use std::sync::RwLock;

use ledger_amount::Amount;
use log::info;

pub use executor::AdminCapability;

use config::EngineConfig;
use error::{LedgerError, PaymentError};
use events::{EventBus, LedgerEvent};
use graph::FlowGraph;
use ledger::{AccountView, EntryView, LedgerStore, PaymentId, PaymentStatus};
use node::{NodeId, NodeIdAllocator};
use reputation::ReputationCache;

struct EngineState {
    store: LedgerStore,
    payment_graph: FlowGraph,
    reputation_graph: FlowGraph,
    reputation_cache: ReputationCache,
    allocator: NodeIdAllocator,
    events: EventBus,
}

/// The mutual-credit engine: ledger state plus its two cached flow graphs,
/// guarded by a single `RwLock`. A cooperative global writer lock rather
/// than per-subsystem locks: simplest option that still forbids two
/// writers running at once, at the cost of serializing routing computation
/// behind the same lock as the commit it guards.
pub struct Engine {
    state: RwLock<EngineState>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Engine::from_store(LedgerStore::new(), config)
    }

    pub fn with_config_default() -> Self {
        Engine::new(EngineConfig::default())
    }

    /// Rehydrate an `Engine` around an already-populated `LedgerStore`
    /// (e.g. one deserialized from a persisted ledger file). The node
    /// allocator resumes after the highest id already present so newly
    /// created nodes never collide with loaded ones.
    pub fn from_store(store: LedgerStore, config: EngineConfig) -> Self {
        debug_assert_eq!(
            config.scale,
            ledger_amount::SCALE,
            "EngineConfig::scale must match ledger_amount::SCALE; Amount's fractional \
             precision is fixed at compile time, not runtime-adjustable"
        );
        let payment_graph = FlowGraph::build(&store, false, &config);
        let reputation_graph = FlowGraph::build(&store, true, &config);
        let allocator = NodeIdAllocator::starting_after(store.max_node_id());
        Engine {
            state: RwLock::new(EngineState {
                store,
                payment_graph,
                reputation_graph,
                reputation_cache: ReputationCache::new(),
                allocator,
                events: EventBus::new(),
            }),
            config,
        }
    }

    /// A point-in-time copy of the underlying ledger, suitable for
    /// persisting to disk in whatever serialization format the caller
    /// chooses.
    pub fn snapshot_store(&self) -> LedgerStore {
        self.state.read().unwrap().store.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribe to `LedgerEvent`s emitted by subsequent mutations.
    pub fn subscribe<F>(&self, f: F)
    where
        F: FnMut(&LedgerEvent) + Send + 'static,
    {
        self.state.write().unwrap().events.subscribe(f);
    }

    /// Allocate and register a new node.
    pub fn create_node(&self) -> NodeId {
        let mut state = self.state.write().unwrap();
        let id = state.allocator.alloc();
        state.store.create_node(id);
        state.payment_graph.out_adjacency.entry(id).or_default();
        state.reputation_graph.out_adjacency.entry(id).or_default();
        id
    }

    /// Remove a node and all its creditlines.
    pub fn delete_node(&self, node: NodeId) {
        let mut state = self.state.write().unwrap();
        let event = state.store.delete_node(node);
        state.payment_graph = FlowGraph::build(&state.store, false, &self.config);
        state.reputation_graph = FlowGraph::build(&state.store, true, &self.config);
        state.reputation_cache.bump_version();
        state.events.emit(event);
    }

    /// `endorser` sets how much debt `recipient` may emit to it.
    pub fn set_credit_limit(
        &self,
        endorser: NodeId,
        recipient: NodeId,
        limit: Amount,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.write().unwrap();
        let event = state.store.set_credit_limit(endorser, recipient, limit)?;
        if let LedgerEvent::CreditLimitChanged { creditline, .. } = &event {
            let EngineState { store, payment_graph, reputation_graph, .. } = &mut *state;
            payment_graph.patch_creditline(store, *creditline, false, &self.config);
            reputation_graph.patch_creditline(store, *creditline, true, &self.config);
        }
        state.reputation_cache.bump_version();
        info!("credit limit set: {} -> {} = {}", endorser, recipient, limit);
        state.events.emit(event);
        Ok(())
    }

    /// Submit and immediately attempt a routed payment.
    pub fn attempt_payment(
        &self,
        payer: NodeId,
        recipient: NodeId,
        amount: Amount,
        memo: String,
        now: u64,
    ) -> Result<PaymentId, PaymentError> {
        let mut state = self.state.write().unwrap();
        let payment_id = state.store.create_payment(payer, recipient, amount, memo, now)?;

        let result = {
            let EngineState { store, payment_graph, .. } = &mut *state;
            executor::attempt_payment(store, payment_graph, payment_id, &self.config, now)
        };

        match result {
            Ok(LedgerEvent::PaymentCommitted { accounts, .. }) => {
                for account in &accounts {
                    let EngineState { store, payment_graph, reputation_graph, .. } = &mut *state;
                    payment_graph.patch_account(store, *account, false, &self.config);
                    reputation_graph.patch_account(store, *account, true, &self.config);
                }
                state.reputation_cache.bump_version();
                let event = LedgerEvent::PaymentCommitted { payment: payment_id, accounts };
                state.events.emit(event);
                Ok(payment_id)
            }
            Ok(_) => unreachable!("attempt_payment only ever returns PaymentCommitted on success"),
            Err(e) => Err(e),
        }
    }

    /// Administrative bypass: post a payment directly, skipping routing and
    /// per-edge limits. Requires `AdminCapability` proof.
    pub fn commit_as_direct_entry(
        &self,
        capability: AdminCapability,
        payer: NodeId,
        recipient: NodeId,
        amount: Amount,
        memo: String,
        now: u64,
    ) -> Result<PaymentId, PaymentError> {
        let mut state = self.state.write().unwrap();
        let payment_id = state.store.create_payment(payer, recipient, amount, memo, now)?;
        let event = executor::commit_as_direct_entry(&mut state.store, capability, payment_id, now)?;
        if let LedgerEvent::PaymentCommitted { ref accounts, .. } = event {
            for account in accounts {
                let EngineState { store, payment_graph, reputation_graph, .. } = &mut *state;
                payment_graph.patch_account(store, *account, false, &self.config);
                reputation_graph.patch_account(store, *account, true, &self.config);
            }
        }
        state.reputation_cache.bump_version();
        state.events.emit(event);
        Ok(payment_id)
    }

    pub fn payment_status(&self, payment: PaymentId) -> Result<PaymentStatus, LedgerError> {
        Ok(self.state.read().unwrap().store.payment(payment)?.status)
    }

    /// `a`'s view of its account with `b`.
    pub fn get_account(&self, a: NodeId, b: NodeId) -> Option<AccountView> {
        self.state.read().unwrap().store.account_view(a, b)
    }

    pub fn iter_entries_of(&self, a: NodeId, b: NodeId) -> Vec<EntryView> {
        self.state.read().unwrap().store.iter_entries_of(a, b)
    }

    /// Maximum amount routable from `payer` to `recipient` under current
    /// balances and limits, ignoring cost.
    pub fn max_payment(&self, payer: NodeId, recipient: NodeId) -> Amount {
        let state = self.state.read().unwrap();
        maxflow::max_flow(&state.payment_graph, payer, recipient)
    }

    /// `target`'s reputation as seen by `asker`.
    pub fn reputation(&self, target: NodeId, asker: NodeId) -> Amount {
        let state = self.state.read().unwrap();
        state.reputation_cache.reputation(&state.reputation_graph, target, asker)
    }

    pub fn audit_ledger(&self) -> Vec<error::AuditError> {
        audit::audit_ledger(&self.state.read().unwrap().store)
    }

    pub fn audit_payments(&self) -> Vec<error::AuditError> {
        audit::audit_payments(&self.state.read().unwrap().store)
    }

    /// Rebuild both cached graphs from scratch. Normally unnecessary,
    /// since every mutation above patches the caches incrementally.
    pub fn rebuild_graph_cache(&self) {
        let mut state = self.state.write().unwrap();
        state.payment_graph = FlowGraph::build(&state.store, false, &self.config);
        state.reputation_graph = FlowGraph::build(&state.store, true, &self.config);
        state.reputation_cache.bump_version();
    }

    /// Compare the live graphs against a freshly-built one. Returns
    /// `(payment_graph_ok, reputation_graph_ok)`.
    pub fn verify_cached_graph(&self) -> (bool, bool) {
        let state = self.state.read().unwrap();
        (
            graph::verify_cached_graph(&state.store, &state.payment_graph, false, &self.config),
            graph::verify_cached_graph(&state.store, &state.reputation_graph, true, &self.config),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_to_end_one_hop_payment_and_audit() {
        let engine = Engine::with_config_default();
        let a = engine.create_node();
        let b = engine.create_node();
        engine.set_credit_limit(b, a, "10".parse().unwrap()).unwrap();

        let payment = engine.attempt_payment(a, b, "4".parse().unwrap(), "coffee".into(), 1).unwrap();
        assert_eq!(engine.payment_status(payment).unwrap(), PaymentStatus::Completed);

        let view = engine.get_account(a, b).unwrap();
        assert_eq!(view.balance, "-4".parse().unwrap());

        assert!(engine.audit_ledger().is_empty());
        assert!(engine.audit_payments().is_empty());
    }

    #[test]
    fn reputation_updates_after_limit_change() {
        let engine = Engine::with_config_default();
        let a = engine.create_node();
        let b = engine.create_node();
        engine.set_credit_limit(b, a, "5".parse().unwrap()).unwrap();
        assert_eq!(engine.reputation(a, b), "5".parse().unwrap());

        engine.set_credit_limit(b, a, "20".parse().unwrap()).unwrap();
        assert_eq!(engine.reputation(a, b), "20".parse().unwrap());
    }

    #[test]
    fn three_hop_ripple_payment_routes_through_intermediary() {
        let engine = Engine::with_config_default();
        let a = engine.create_node();
        let b = engine.create_node();
        let c = engine.create_node();
        engine.set_credit_limit(b, a, "10".parse().unwrap()).unwrap();
        engine.set_credit_limit(c, b, "10".parse().unwrap()).unwrap();

        let payment = engine.attempt_payment(a, c, "6".parse().unwrap(), String::new(), 1).unwrap();
        assert_eq!(engine.payment_status(payment).unwrap(), PaymentStatus::Completed);
        assert_eq!(engine.get_account(a, b).unwrap().balance, "-6".parse().unwrap());
        assert_eq!(engine.get_account(b, c).unwrap().balance, "-6".parse().unwrap());
    }

    #[test]
    fn direct_entry_requires_explicit_admin_capability() {
        let engine = Engine::with_config_default();
        let a = engine.create_node();
        let b = engine.create_node();
        engine.set_credit_limit(b, a, "1".parse().unwrap()).unwrap();
        let cap = AdminCapability::acquire();
        let payment = engine
            .commit_as_direct_entry(cap, a, b, "100".parse().unwrap(), "correction".into(), 1)
            .unwrap();
        assert_eq!(engine.payment_status(payment).unwrap(), PaymentStatus::Completed);
        assert_eq!(engine.get_account(a, b).unwrap().balance, "-100".parse().unwrap());
    }
}
