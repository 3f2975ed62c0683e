//! Reputation queries: max-flow capacity on the balance-zeroed graph,
//! memoized per `(target, asker)` pair.
//!
//! Cache invalidation is a version counter bumped on every credit-limit
//! change; a reader compares its cached entry's version against the
//! current one and recomputes lazily on mismatch rather than the store
//! proactively pushing invalidations to every cached pair.

use std::collections::HashMap;
use std::sync::Mutex;

use ledger_amount::Amount;

use crate::graph::FlowGraph;
use crate::maxflow;
use crate::node::NodeId;

/// Caches `reputation(target, asker)` results against the `reputation_graph`
/// version they were computed from. A stale entry (version mismatch) is
/// recomputed lazily rather than evicted eagerly: a limit change must be
/// observable on the next query, not proactively pushed to every cached
/// pair.
#[derive(Debug, Default)]
pub struct ReputationCache {
    version: u64,
    entries: Mutex<HashMap<(NodeId, NodeId), (u64, Amount)>>,
}

impl ReputationCache {
    pub fn new() -> Self {
        ReputationCache::default()
    }

    /// Invalidate every memoized entry; call this whenever a credit limit
    /// changes anywhere in the ledger.
    pub fn bump_version(&mut self) {
        self.version += 1;
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// `target`'s reputation as seen by `asker`: how much value could flow
    /// from `target` to `asker` if every creditline were maximally drawn.
    pub fn reputation(&self, graph: &FlowGraph, target: NodeId, asker: NodeId) -> Amount {
        let key = (target, asker);
        if let Some(&(version, value)) = self.entries.lock().unwrap().get(&key) {
            if version == self.version {
                return value;
            }
        }
        let value = maxflow::max_flow(graph, target, asker);
        self.entries.lock().unwrap().insert(key, (self.version, value));
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::ledger::LedgerStore;

    #[test]
    fn reputation_reflects_partner_limit_toward_asker() {
        let mut store = LedgerStore::new();
        let a = NodeId(1);
        let b = NodeId(2);
        store.create_node(a);
        store.create_node(b);
        store.create_account(a, b).unwrap();
        store.set_credit_limit(b, a, "7".parse().unwrap()).unwrap();
        let config = EngineConfig::default();
        let graph = FlowGraph::build(&store, true, &config);
        let cache = ReputationCache::new();
        assert_eq!(cache.reputation(&graph, a, b), "7".parse().unwrap());
    }

    #[test]
    fn stale_cache_entry_is_recomputed_after_version_bump() {
        let mut store = LedgerStore::new();
        let a = NodeId(1);
        let b = NodeId(2);
        store.create_node(a);
        store.create_node(b);
        store.create_account(a, b).unwrap();
        store.set_credit_limit(b, a, "7".parse().unwrap()).unwrap();
        let config = EngineConfig::default();
        let mut graph = FlowGraph::build(&store, true, &config);
        let mut cache = ReputationCache::new();
        assert_eq!(cache.reputation(&graph, a, b), "7".parse().unwrap());

        store.set_credit_limit(b, a, "20".parse().unwrap()).unwrap();
        graph = FlowGraph::build(&store, true, &config);
        cache.bump_version();
        assert_eq!(cache.reputation(&graph, a, b), "20".parse().unwrap());
    }
}
