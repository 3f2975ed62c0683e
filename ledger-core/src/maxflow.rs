//! Plain (uncosted) max-flow, used by `reputation.rs` and by
//! `Engine::max_payment`.
//!
//! A small Edmonds-Karp implementation over the same `FlowGraph` structure
//! the router uses: a multigraph's parallel edges just sum their
//! capacities for a pure max-flow query, since no costs are involved. An
//! unbounded path (every edge on it infinite-capacity) short-circuits to
//! `Amount::Infinity` rather than running the residual search at all.

use std::collections::{HashMap, HashSet, VecDeque};

use ledger_amount::Amount;

use crate::graph::FlowGraph;
use crate::node::NodeId;

/// Capacity standing in for "no effective bound" once we've already ruled
/// out a truly unbounded path (see `has_all_infinite_path`). Kept well
/// under `i64::MAX` so repeated augmentation cannot overflow.
const EFFECTIVELY_UNBOUNDED: i64 = i64::MAX / 4;

/// Maximum flow from `source` to `sink` over `graph`'s directed edges.
/// Returns `Amount::Infinity` if a path made entirely of infinite-capacity
/// edges connects `source` to `sink`.
pub fn max_flow(graph: &FlowGraph, source: NodeId, sink: NodeId) -> Amount {
    if source == sink {
        return Amount::Infinity;
    }
    if !graph.out_adjacency_keys().any(|n| n == source) && !has_incoming(graph, source) {
        return Amount::ZERO;
    }
    if has_all_infinite_path(graph, source, sink) {
        return Amount::Infinity;
    }

    // residual[u][v] = remaining forward/backward capacity between u and v.
    let mut residual: HashMap<(NodeId, NodeId), i64> = HashMap::new();
    for edge in graph.edges() {
        let cap = edge.capacity.unwrap_or(EFFECTIVELY_UNBOUNDED);
        *residual.entry((edge.u, edge.v)).or_insert(0) += cap;
        residual.entry((edge.v, edge.u)).or_insert(0);
    }

    let mut total: i64 = 0;
    loop {
        match bfs_augmenting_path(&residual, source, sink) {
            Some(path) => {
                let bottleneck = path
                    .windows(2)
                    .map(|w| residual[&(w[0], w[1])])
                    .min()
                    .expect("path has at least one edge");
                for w in path.windows(2) {
                    *residual.get_mut(&(w[0], w[1])).unwrap() -= bottleneck;
                    *residual.entry((w[1], w[0])).or_insert(0) += bottleneck;
                }
                total += bottleneck;
            }
            None => break,
        }
    }
    Amount::from_units(total).unwrap_or(Amount::ZERO)
}

fn has_incoming(graph: &FlowGraph, node: NodeId) -> bool {
    graph.edges().any(|e| e.v == node)
}

/// BFS over edges whose combined capacity is infinite (`capacity == None`
/// on at least one parallel edge makes the pair effectively unbounded).
fn has_all_infinite_path(graph: &FlowGraph, source: NodeId, sink: NodeId) -> bool {
    let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for edge in graph.edges() {
        if edge.capacity.is_none() {
            adjacency.entry(edge.u).or_default().push(edge.v);
        }
    }
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    seen.insert(source);
    queue.push_back(source);
    while let Some(n) = queue.pop_front() {
        if n == sink {
            return true;
        }
        for &next in adjacency.get(&n).into_iter().flatten() {
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    false
}

fn bfs_augmenting_path(
    residual: &HashMap<(NodeId, NodeId), i64>,
    source: NodeId,
    sink: NodeId,
) -> Option<Vec<NodeId>> {
    let mut nodes: HashSet<NodeId> = HashSet::new();
    for &(u, v) in residual.keys() {
        nodes.insert(u);
        nodes.insert(v);
    }
    let mut pred: HashMap<NodeId, NodeId> = HashMap::new();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    seen.insert(source);
    queue.push_back(source);
    while let Some(u) = queue.pop_front() {
        if u == sink {
            let mut path = vec![sink];
            let mut cur = sink;
            while cur != source {
                cur = pred[&cur];
                path.push(cur);
            }
            path.reverse();
            return Some(path);
        }
        for &n in &nodes {
            if let Some(&cap) = residual.get(&(u, n)) {
                if cap > 0 && seen.insert(n) {
                    pred.insert(n, u);
                    queue.push_back(n);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::ledger::LedgerStore;

    #[test]
    fn max_flow_across_a_single_edge_equals_its_capacity() {
        let mut store = LedgerStore::new();
        let a = NodeId(1);
        let b = NodeId(2);
        store.create_node(a);
        store.create_node(b);
        store.create_account(a, b).unwrap();
        store.set_credit_limit(b, a, "5".parse().unwrap()).unwrap();
        let config = EngineConfig::default();
        let graph = FlowGraph::build(&store, false, &config);
        assert_eq!(max_flow(&graph, a, b), "5".parse().unwrap());
    }

    #[test]
    fn infinite_limit_path_yields_infinite_max_flow() {
        let mut store = LedgerStore::new();
        let a = NodeId(1);
        let b = NodeId(2);
        store.create_node(a);
        store.create_node(b);
        store.create_account(a, b).unwrap();
        // Default creditline limit is Infinity until set_credit_limit narrows it.
        let config = EngineConfig::default();
        let graph = FlowGraph::build(&store, false, &config);
        assert_eq!(max_flow(&graph, b, a), Amount::Infinity);
    }
}
