//! Min-cost flow router: successive shortest paths over a residual
//! multigraph.
//!
//! The residual graph is built as owned Rust structures (a `HashMap` keyed
//! by node pair) rather than a general-purpose min-cost-flow crate's
//! opaque graph type, because the router needs direct access to its
//! specific multigraph-with-chunked-parallel-edges construction (see
//! DESIGN.md).

use std::collections::{HashMap, HashSet, VecDeque};

use log::{debug, trace};

use crate::error::RouteError;
use crate::graph::{EdgeKey, FlowGraph};
use crate::node::NodeId;

/// Per-edge flow assignment, keyed the same way as `FlowGraph`'s edges.
pub type EdgeFlow = HashMap<EdgeKey, i64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RNode {
    Source,
    Sink,
    Real(NodeId),
}

/// One edge of the working flow network, including the two synthetic
/// source/sink edges per node with nonzero demand.
#[derive(Debug, Clone, Copy)]
struct FEdge {
    u: RNode,
    v: RNode,
    capacity: Option<i64>,
    weight: i64,
    flow: i64,
    /// `None` for a synthetic source/sink edge.
    edge_key: Option<EdgeKey>,
}

/// A residual edge, tagged with which underlying `FEdge` it came from and
/// whether it runs opposite that edge's direction.
#[derive(Debug, Clone, Copy)]
struct Residual {
    orig: usize,
    reversed: bool,
    capacity: Option<i64>,
    weight: i64,
}

/// Run the successive-shortest-path min-cost flow algorithm.
///
/// `demands` gives each node's signed demand; non-zero entries should be
/// present only for payer (negative) and recipient (positive), summing to
/// zero. Returns the flow assigned to each real edge (excluding the
/// synthetic source/sink edges), or a `RouteError`.
pub fn min_cost_flow(graph: &FlowGraph, demands: &HashMap<NodeId, i64>) -> Result<EdgeFlow, RouteError> {
    if !is_weakly_connected(graph, demands) {
        return Err(RouteError::NotConnected);
    }
    let demand_sum: i64 = demands.values().sum();
    if demand_sum != 0 {
        return Err(RouteError::DemandMismatch);
    }

    let mut edges: Vec<FEdge> = Vec::with_capacity(graph.edges().count() + demands.len());
    for edge in graph.edges() {
        edges.push(FEdge {
            u: RNode::Real(edge.u),
            v: RNode::Real(edge.v),
            capacity: edge.capacity,
            weight: edge.weight,
            flow: 0,
            edge_key: Some(edge.key),
        });
    }
    for (&node, &demand) in demands {
        if demand < 0 {
            edges.push(FEdge {
                u: RNode::Source,
                v: RNode::Real(node),
                capacity: Some(-demand),
                weight: 0,
                flow: 0,
                edge_key: None,
            });
        } else if demand > 0 {
            edges.push(FEdge {
                u: RNode::Real(node),
                v: RNode::Sink,
                capacity: Some(demand),
                weight: 0,
                flow: 0,
                edge_key: None,
            });
        }
    }

    let source_edge_ids: Vec<usize> = edges
        .iter()
        .enumerate()
        .filter(|(_, e)| e.u == RNode::Source)
        .map(|(i, _)| i)
        .collect();

    if source_edge_ids.is_empty() {
        // No demand at all: trivially feasible, nothing to route.
        return Ok(EdgeFlow::new());
    }

    let mut total_cost: i64 = 0;
    loop {
        let residual = build_residual(&edges);
        match bellman_ford_path(&residual, &edges)? {
            Some(path) => {
                let bottleneck = path
                    .iter()
                    .map(|r| r.capacity)
                    .fold(None::<i64>, |acc, cap| match (acc, cap) {
                        (None, c) => c,
                        (Some(a), None) => Some(a),
                        (Some(a), Some(c)) => Some(a.min(c)),
                    })
                    .expect("a path always has at least one edge with finite capacity by construction");
                for r in &path {
                    let signed = if r.reversed { -bottleneck } else { bottleneck };
                    edges[r.orig].flow += signed;
                    total_cost += signed * edges[r.orig].weight;
                }
                trace!("augmented {} units along a {}-edge path", bottleneck, path.len());
            }
            None => break,
        }
    }

    for &id in &source_edge_ids {
        let e = &edges[id];
        if Some(e.flow) != e.capacity {
            return Err(RouteError::Infeasible);
        }
    }

    debug!("min-cost flow complete: total cost {}", total_cost);

    let mut result = EdgeFlow::new();
    for e in &edges {
        if let Some(key) = e.edge_key {
            result.insert(key, e.flow);
        }
    }
    Ok(result)
}

fn build_residual(edges: &[FEdge]) -> HashMap<(RNode, RNode), Residual> {
    let mut by_pair: HashMap<(RNode, RNode), Residual> = HashMap::new();
    let mut consider = |pair: (RNode, RNode), candidate: Residual| {
        by_pair
            .entry(pair)
            .and_modify(|existing| {
                if candidate.weight < existing.weight {
                    *existing = candidate;
                }
            })
            .or_insert(candidate);
    };
    for (idx, e) in edges.iter().enumerate() {
        let remaining = e.capacity.map(|c| c - e.flow);
        if remaining.is_none() || remaining.unwrap() > 0 {
            consider(
                (e.u, e.v),
                Residual {
                    orig: idx,
                    reversed: false,
                    capacity: remaining,
                    weight: e.weight,
                },
            );
        }
        if e.flow > 0 {
            consider(
                (e.v, e.u),
                Residual {
                    orig: idx,
                    reversed: true,
                    capacity: Some(e.flow),
                    weight: -e.weight,
                },
            );
        }
    }
    by_pair
}

/// Bellman-Ford shortest path from `Source` to `Sink` over the (already
/// parallel-collapsed to the minimum-weight candidate per node pair)
/// residual graph.
/// Returns the list of residual edges on the path, in order, or `None` if
/// `Sink` is unreachable. Returns `Err` only via the caller detecting a
/// negative cycle, surfaced as `RouteError::Unbounded`.
fn bellman_ford_path(
    residual: &HashMap<(RNode, RNode), Residual>,
    edges: &[FEdge],
) -> Result<Option<Vec<Residual>>, RouteError> {
    let nodes = collect_nodes(residual, edges);
    let mut dist: HashMap<RNode, i64> = HashMap::new();
    let mut pred: HashMap<RNode, (RNode, Residual)> = HashMap::new();
    dist.insert(RNode::Source, 0);

    let n = nodes.len();
    for _ in 0..n.saturating_sub(1) {
        let mut changed = false;
        for (&(u, v), r) in residual {
            if let Some(&du) = dist.get(&u) {
                let candidate = du + r.weight;
                if candidate < *dist.get(&v).unwrap_or(&i64::MAX) {
                    dist.insert(v, candidate);
                    pred.insert(v, (u, *r));
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    // One more relaxation pass: if anything still improves, there is a
    // negative cycle reachable from Source, making the min cost unbounded.
    for (&(u, v), r) in residual {
        if let Some(&du) = dist.get(&u) {
            if du + r.weight < *dist.get(&v).unwrap_or(&i64::MAX) {
                return Err(RouteError::Unbounded);
            }
        }
    }

    if !dist.contains_key(&RNode::Sink) {
        return Ok(None);
    }

    let mut path = Vec::new();
    let mut cur = RNode::Sink;
    while cur != RNode::Source {
        let (prev, r) = pred.get(&cur).copied().expect("predecessor chain must reach Source");
        path.push(r);
        cur = prev;
    }
    path.reverse();
    Ok(Some(path))
}

fn collect_nodes(residual: &HashMap<(RNode, RNode), Residual>, edges: &[FEdge]) -> HashSet<RNode> {
    let mut nodes = HashSet::new();
    nodes.insert(RNode::Source);
    nodes.insert(RNode::Sink);
    for e in edges {
        nodes.insert(e.u);
        nodes.insert(e.v);
    }
    for &(u, v) in residual.keys() {
        nodes.insert(u);
        nodes.insert(v);
    }
    nodes
}

fn is_weakly_connected(graph: &FlowGraph, demands: &HashMap<NodeId, i64>) -> bool {
    let mut participants: HashSet<NodeId> = graph.out_adjacency_keys().collect();
    participants.extend(demands.keys().copied());
    if participants.len() <= 1 {
        return true;
    }
    let mut undirected: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for edge in graph.edges() {
        undirected.entry(edge.u).or_default().push(edge.v);
        undirected.entry(edge.v).or_default().push(edge.u);
    }
    let start = *participants.iter().next().unwrap();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    seen.insert(start);
    queue.push_back(start);
    while let Some(n) = queue.pop_front() {
        for &next in undirected.get(&n).into_iter().flatten() {
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    participants.iter().all(|n| seen.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::ledger::LedgerStore;

    fn two_node_graph(limit: &str) -> (LedgerStore, FlowGraph, NodeId, NodeId) {
        let mut store = LedgerStore::new();
        let a = NodeId(1);
        let b = NodeId(2);
        store.create_node(a);
        store.create_node(b);
        store.create_account(a, b).unwrap();
        store.set_credit_limit(b, a, limit.parse().unwrap()).unwrap();
        store.set_credit_limit(a, b, limit.parse().unwrap()).unwrap();
        let config = EngineConfig::default();
        let graph = FlowGraph::build(&store, false, &config);
        (store, graph, a, b)
    }

    #[test]
    fn one_hop_payment_routes_exactly() {
        let (_store, graph, a, b) = two_node_graph("5");
        let mut demands = HashMap::new();
        demands.insert(a, -1_000_000);
        demands.insert(b, 1_000_000);
        let flow = min_cost_flow(&graph, &demands).unwrap();
        let total: i64 = flow.values().filter(|&&f| f > 0).sum();
        assert_eq!(total, 1_000_000);
    }

    #[test]
    fn zero_limit_is_infeasible() {
        let (_store, graph, a, b) = two_node_graph("0");
        let mut demands = HashMap::new();
        demands.insert(a, -1_000_000);
        demands.insert(b, 1_000_000);
        assert_eq!(min_cost_flow(&graph, &demands), Err(RouteError::Infeasible));
    }

    #[test]
    fn disconnected_nodes_report_not_connected() {
        let mut store = LedgerStore::new();
        let a = NodeId(1);
        let b = NodeId(2);
        store.create_node(a);
        store.create_node(b);
        let config = EngineConfig::default();
        let graph = FlowGraph::build(&store, false, &config);
        let mut demands = HashMap::new();
        demands.insert(a, -1_000_000);
        demands.insert(b, 1_000_000);
        assert_eq!(min_cost_flow(&graph, &demands), Err(RouteError::NotConnected));
    }

    #[test]
    fn mismatched_demand_is_rejected() {
        let (_store, graph, a, b) = two_node_graph("5");
        let mut demands = HashMap::new();
        demands.insert(a, -1_000_000);
        demands.insert(b, 2_000_000);
        assert_eq!(min_cost_flow(&graph, &demands), Err(RouteError::DemandMismatch));
    }
}
