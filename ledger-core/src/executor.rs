//! Payment execution: routing a payment's demand through the cached flow
//! graph and committing the result to the ledger.
//!
//! `attempt_payment` marks the payment attempted, routes it, commits its
//! entries transactionally, and marks it completed or failed, patching the
//! cached graphs along the way. `commit_as_direct_entry` is the direct,
//! unrouted posting used by administrative corrections.

use std::collections::HashMap;

use ledger_amount::Amount;
use log::{info, warn};

use crate::config::EngineConfig;
use crate::error::{LedgerError, PaymentError};
use crate::events::LedgerEvent;
use crate::flow;
use crate::graph::FlowGraph;
use crate::ledger::{CreditLineId, LedgerStore, PaymentId, PaymentStatus};
use crate::node::NodeId;

/// Proof the caller is allowed to post a `commit_as_direct_entry`.
/// Administrative corrections bypass routing and per-edge limits, so
/// construction is kept out of the normal payment path. Acquiring one is a
/// deliberate, auditable act by whatever glue code fronts `Engine` — this
/// type does not itself check credentials.
#[derive(Debug, Clone, Copy)]
pub struct AdminCapability(());

impl AdminCapability {
    /// Only call this from a trusted administrative entry point (e.g. an
    /// authenticated CLI subcommand or operator console), never from a
    /// user-facing payment flow.
    pub fn acquire() -> AdminCapability {
        AdminCapability(())
    }
}

/// Attempt to route and commit `payment` over `graph`, restricted to the
/// connected component containing the payer. On success, returns the set
/// of accounts whose balance
/// changed so the caller can patch both cached graphs. Retries on
/// `LimitCollision` up to `config.max_limit_collision_retries` times,
/// rebuilding the routing subgraph from `store` between attempts.
pub fn attempt_payment(
    store: &mut LedgerStore,
    graph: &FlowGraph,
    payment_id: PaymentId,
    config: &EngineConfig,
    now: u64,
) -> Result<LedgerEvent, PaymentError> {
    if let Some(p) = store.payment_mut(payment_id) {
        p.last_attempted_at = Some(now);
    }
    let payment = store.payment(payment_id).map_err(PaymentError::from)?.clone();

    let mut attempts = 0;
    loop {
        let component = graph.component_containing(payment.payer);
        if !component.contains(&payment.recipient) {
            mark_failed(store, payment_id);
            return Err(PaymentError::NoRoute);
        }
        if component.len() > config.max_route_component_size {
            warn!(
                "payment {:?} routes over a {}-node component, above the {}-node soft cap; \
                 this payment is not rejected, but routing may run long",
                payment_id,
                component.len(),
                config.max_route_component_size
            );
        }
        let subgraph = graph.subgraph(&component);

        let scaled_amount = scale_amount(payment.amount);
        let mut demands: HashMap<NodeId, i64> = HashMap::new();
        demands.insert(payment.payer, -scaled_amount);
        demands.insert(payment.recipient, scaled_amount);

        let edge_flow = match flow::min_cost_flow(&subgraph, &demands) {
            Ok(f) => f,
            Err(e) => {
                warn!("payment {:?} routing failed: {}", payment_id, e);
                mark_failed(store, payment_id);
                return Err(PaymentError::from(e));
            }
        };

        let per_creditline = aggregate_by_creditline(edge_flow);

        match store.commit_payment(payment_id, per_creditline, now) {
            Ok(event) => {
                if let Some(p) = store.payment_mut(payment_id) {
                    p.status = PaymentStatus::Completed;
                }
                info!("payment {:?} committed", payment_id);
                return Ok(event);
            }
            Err(LedgerError::LimitCollision { account }) => {
                attempts += 1;
                if attempts > config.max_limit_collision_retries {
                    warn!(
                        "payment {:?} gave up after {} limit-collision retries on account {:?}",
                        payment_id, attempts, account
                    );
                    mark_failed(store, payment_id);
                    return Err(PaymentError::LimitCollision);
                }
                // A concurrent commit narrowed a limit along our path; the
                // caller-supplied graph is stale for this account, but we
                // have no cheaper recourse than re-routing against it
                // again and hoping the next attempt doesn't collide.
                continue;
            }
            Err(e) => {
                warn!("payment {:?} commit failed: {}", payment_id, e);
                mark_failed(store, payment_id);
                return Err(PaymentError::from(e));
            }
        }
    }
}

fn mark_failed(store: &mut LedgerStore, payment_id: PaymentId) {
    if let Some(p) = store.payment_mut(payment_id) {
        p.status = PaymentStatus::Failed;
    }
}

/// `FlowGraph`'s capacities are already an `Amount`'s native scaled units
/// (`scale_capacity` does no further rescaling), so demands and routed
/// flow pass through the router in that same integer space.
fn scale_amount(amount: Amount) -> i64 {
    amount.units().expect("payment amounts are always finite")
}

/// Sum chunk flows per creditline and convert back into `Amount`, dropping
/// zero-flow creditlines.
fn aggregate_by_creditline(edge_flow: flow::EdgeFlow) -> Vec<(CreditLineId, Amount)> {
    let mut totals: HashMap<CreditLineId, i64> = HashMap::new();
    for ((creditline_id, _chunk), flow) in edge_flow {
        if flow != 0 {
            *totals.entry(creditline_id).or_insert(0) += flow;
        }
    }
    totals
        .into_iter()
        .filter(|(_, scaled)| *scaled != 0)
        .map(|(id, scaled)| (id, Amount::from_units(scaled).expect("routed flow stays within i64 range")))
        .collect()
}

/// Post an unrouted, limit-bypassing entry directly between `payer` and
/// `recipient`. Requires proof of administrative authority; never called
/// from `attempt_payment`.
pub fn commit_as_direct_entry(
    store: &mut LedgerStore,
    _capability: AdminCapability,
    payment_id: PaymentId,
    now: u64,
) -> Result<LedgerEvent, PaymentError> {
    let payment = store.payment(payment_id).map_err(PaymentError::from)?.clone();
    let (_account, event) = store
        .commit_direct_entry(payment_id, payment.payer, payment.recipient, payment.amount, now)
        .map_err(PaymentError::from)?;
    if let Some(p) = store.payment_mut(payment_id) {
        p.status = PaymentStatus::Completed;
    }
    info!("payment {:?} committed as direct entry", payment_id);
    Ok(event)
}
