//! The flow graph: construction, chunked edge costs, and the two-graph
//! cache.
//!
//! One directed edge-group per creditline, keyed by
//! `(creditline_id, chunk_index)` so it can be independently replaced when
//! that creditline's account balance or limit changes.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use ledger_amount::Amount;
use log::{trace, warn};

use crate::config::EngineConfig;
use crate::ledger::{AccountId, CreditLine, CreditLineId, LedgerStore};
use crate::node::NodeId;

/// Identifies one physical edge: the creditline it derives from, and which
/// of its (at most two) capacity/cost chunks it represents.
pub type EdgeKey = (CreditLineId, u8);

/// One directed, weighted, capacitated edge of the flow multigraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphEdge {
    pub key: EdgeKey,
    pub u: NodeId,
    pub v: NodeId,
    /// `None` means unbounded capacity (an infinite credit limit).
    pub capacity: Option<i64>,
    /// Scaled by `EngineConfig::cost_scale_factor` and rounded.
    pub weight: i64,
    pub creditline_id: CreditLineId,
}

/// A directed multigraph whose edges derive from creditlines. Not
/// persistent; materialized from the ledger and cached by `Engine`.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    pub(crate) edges: BTreeMap<EdgeKey, GraphEdge>,
    pub(crate) out_adjacency: HashMap<NodeId, Vec<EdgeKey>>,
}

impl FlowGraph {
    pub fn new() -> Self {
        FlowGraph::default()
    }

    pub fn edge(&self, key: EdgeKey) -> Option<&GraphEdge> {
        self.edges.get(&key)
    }

    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.values()
    }

    pub fn out_adjacency_keys(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.out_adjacency.keys().copied()
    }

    pub fn out_edges(&self, node: NodeId) -> impl Iterator<Item = &GraphEdge> {
        self.out_adjacency
            .get(&node)
            .into_iter()
            .flatten()
            .map(move |k| &self.edges[k])
    }

    /// Build a fresh graph from the ledger. `ignore_balances = true` builds
    /// the reputation graph; `false` builds the payment graph.
    pub fn build(store: &LedgerStore, ignore_balances: bool, config: &EngineConfig) -> FlowGraph {
        let mut graph = FlowGraph::new();
        for node in store.iter_nodes() {
            graph.out_adjacency.entry(node).or_default();
        }
        for cl in store.iter_all_creditlines() {
            graph.recompute_creditline(store, cl, ignore_balances, config);
        }
        graph
    }

    /// Replace the edges derived from a single creditline; called whenever
    /// `set_credit_limit` changes it.
    pub fn patch_creditline(
        &mut self,
        store: &LedgerStore,
        creditline_id: CreditLineId,
        ignore_balances: bool,
        config: &EngineConfig,
    ) {
        if let Ok(cl) = store.creditline(creditline_id) {
            self.remove_creditline_edges(creditline_id);
            self.recompute_creditline(store, cl, ignore_balances, config);
        }
    }

    /// Replace both creditlines' edges for an account whose balance
    /// changed.
    pub fn patch_account(
        &mut self,
        store: &LedgerStore,
        account: AccountId,
        ignore_balances: bool,
        config: &EngineConfig,
    ) {
        if let Some((a, b)) = store.creditline_pair(account) {
            let ids = [a.id, b.id];
            for id in ids {
                self.patch_creditline(store, id, ignore_balances, config);
            }
        }
    }

    fn remove_creditline_edges(&mut self, creditline_id: CreditLineId) {
        let keys: Vec<EdgeKey> = self
            .edges
            .keys()
            .copied()
            .filter(|(id, _)| *id == creditline_id)
            .collect();
        for key in keys {
            if let Some(edge) = self.edges.remove(&key) {
                if let Some(list) = self.out_adjacency.get_mut(&edge.u) {
                    list.retain(|k| *k != key);
                }
            }
        }
    }

    fn recompute_creditline(
        &mut self,
        store: &LedgerStore,
        cl: &CreditLine,
        ignore_balances: bool,
        config: &EngineConfig,
    ) {
        let partner = store.partner_creditline(cl);
        let u = cl.node;
        let v = partner.node;
        let account = match store.account(cl.account) {
            Ok(a) => a,
            Err(_) => return,
        };
        let chunks = edge_chunks(cl.limit, cl.signed_balance(account), ignore_balances, config);
        for (idx, (capacity, weight)) in chunks.into_iter().enumerate() {
            let key: EdgeKey = (cl.id, idx as u8);
            let edge = GraphEdge {
                key,
                u,
                v,
                capacity,
                weight,
                creditline_id: cl.id,
            };
            self.edges.insert(key, edge);
            self.out_adjacency.entry(u).or_default().push(key);
        }
        trace!("recomputed edges for creditline {:?}: {}->{}", cl.id, u, v);
    }

    /// The weakly-connected component containing `seed`. Used to scope the
    /// router to a tractable subgraph.
    pub fn component_containing(&self, seed: NodeId) -> HashSet<NodeId> {
        let mut undirected: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for edge in self.edges.values() {
            undirected.entry(edge.u).or_default().push(edge.v);
            undirected.entry(edge.v).or_default().push(edge.u);
        }
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        seen.insert(seed);
        queue.push_back(seed);
        while let Some(n) = queue.pop_front() {
            for &neighbor in undirected.get(&n).into_iter().flatten() {
                if seen.insert(neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
        seen
    }

    /// Restrict this graph to edges whose endpoints are both in `nodes`.
    pub fn subgraph(&self, nodes: &HashSet<NodeId>) -> FlowGraph {
        let mut out = FlowGraph::new();
        for &n in nodes {
            out.out_adjacency.entry(n).or_default();
        }
        for edge in self.edges.values() {
            if nodes.contains(&edge.u) && nodes.contains(&edge.v) {
                out.edges.insert(edge.key, *edge);
                out.out_adjacency.entry(edge.u).or_default().push(edge.key);
            }
        }
        if out.edges.len() > 0 {
            trace!("subgraph: {} nodes, {} edges", nodes.len(), out.edges.len());
        }
        out
    }

    /// Edge-set comparator for the `verify-cached-graph` CLI command (spec
    /// §6): compares `(src, dest, capacity, weight, creditline_id)` across
    /// every edge, ignoring chunk-index bookkeeping differences.
    pub fn same_edge_set_as(&self, other: &FlowGraph) -> bool {
        if self.edges.len() != other.edges.len() {
            return false;
        }
        let mine: HashSet<(NodeId, NodeId, Option<i64>, i64, CreditLineId)> = self
            .edges
            .values()
            .map(|e| (e.u, e.v, e.capacity, e.weight, e.creditline_id))
            .collect();
        let theirs: HashSet<(NodeId, NodeId, Option<i64>, i64, CreditLineId)> = other
            .edges
            .values()
            .map(|e| (e.u, e.v, e.capacity, e.weight, e.creditline_id))
            .collect();
        mine == theirs
    }
}

/// Derive `(capacity, cost)` chunks for one creditline.
///
/// `limit` is the creditline's own limit; `signed_balance` is this node's
/// signed balance on the account (`account.balance * bal_mult`).
fn edge_chunks(
    limit: Amount,
    signed_balance: Amount,
    ignore_balances: bool,
    config: &EngineConfig,
) -> Vec<(Option<i64>, i64)> {
    if ignore_balances {
        // Reputation graph: balances zeroed, finite-limit chunks collapse
        // to (L, 0).
        return match limit {
            Amount::Infinity => vec![(None, 0)],
            Amount::Finite(_) => vec![(scale_capacity(limit), 0)],
        };
    }

    match limit {
        Amount::Infinity => vec![(None, 0)],
        Amount::Finite(limit_units) => {
            if signed_balance.is_positive() {
                // Two parallel chunks: cash in existing IOUs (zero cost),
                // then issue new IOUs (unit cost).
                let cash_in = scale_capacity(signed_balance);
                let issue = scale_capacity(limit);
                vec![(cash_in, 0), (issue, config.cost_scale_factor)]
            } else if limit_units == 0 {
                // Zero limit is treated uniformly as zero cost, zero capacity,
                // regardless of balance sign.
                vec![(Some(0), 0)]
            } else {
                let capacity = signed_balance
                    .checked_add(limit)
                    .expect("limit is finite and balance is bounded by the limit check");
                let ratio = signed_balance
                    .div_exact(limit)
                    .expect("limit_units != 0, both operands finite");
                let cost = ((1.0 + ratio) * config.cost_scale_factor as f64).round() as i64;
                vec![(scale_capacity(capacity), cost)]
            }
        }
    }
}

fn scale_capacity(amount: Amount) -> Option<i64> {
    match amount {
        Amount::Infinity => None,
        Amount::Finite(units) => Some(units.max(0)),
    }
}

/// CLI administrative helper: compares a freshly-built graph against a
/// cached one and logs the diff size.
pub fn verify_cached_graph(store: &LedgerStore, cached: &FlowGraph, ignore_balances: bool, config: &EngineConfig) -> bool {
    let live = FlowGraph::build(store, ignore_balances, config);
    let ok = live.same_edge_set_as(cached);
    if !ok {
        warn!(
            "cached graph diverged from live graph: {} live edges vs {} cached edges",
            live.edges.len(),
            cached.edges.len()
        );
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeId;

    fn amount(s: &str) -> Amount {
        s.parse().unwrap()
    }

    #[test]
    fn infinite_limit_gives_single_unbounded_zero_cost_chunk() {
        let config = EngineConfig::default();
        let chunks = edge_chunks(Amount::Infinity, amount("3"), false, &config);
        assert_eq!(chunks, vec![(None, 0)]);
    }

    #[test]
    fn positive_balance_splits_into_two_chunks() {
        let config = EngineConfig::default();
        let chunks = edge_chunks(amount("10"), amount("2"), false, &config);
        assert_eq!(
            chunks,
            vec![(Some(2_000_000), 0), (Some(10_000_000), config.cost_scale_factor)]
        );
    }

    #[test]
    fn zero_limit_is_zero_cost_zero_capacity() {
        let config = EngineConfig::default();
        let chunks = edge_chunks(amount("0"), amount("0"), false, &config);
        assert_eq!(chunks, vec![(Some(0), 0)]);
    }

    #[test]
    fn nonpositive_balance_scales_cost_by_distance_from_zero() {
        let config = EngineConfig::default();
        // balance = -5, limit = 10 => cost = 1 + (-5/10) = 0.5
        let chunks = edge_chunks(amount("10"), amount("-5"), false, &config);
        assert_eq!(chunks.len(), 1);
        let (cap, cost) = chunks[0];
        assert_eq!(cap, Some(5_000_000));
        assert_eq!(cost, config.cost_scale_factor / 2);
    }

    #[test]
    fn reputation_graph_ignores_balance_and_zeroes_cost() {
        let config = EngineConfig::default();
        let chunks = edge_chunks(amount("10"), amount("-5"), true, &config);
        assert_eq!(chunks, vec![(Some(10_000_000), 0)]);
    }

    #[test]
    fn component_containing_follows_edges_undirected() {
        let mut store = LedgerStore::new();
        let a = NodeId(1);
        let b = NodeId(2);
        let c = NodeId(3);
        store.create_node(a);
        store.create_node(b);
        store.create_node(c);
        store.create_account(a, b).unwrap();
        let config = EngineConfig::default();
        let graph = FlowGraph::build(&store, false, &config);
        let component = graph.component_containing(a);
        assert!(component.contains(&a));
        assert!(component.contains(&b));
        assert!(!component.contains(&c));
    }
}
