//! Offline, non-mutating consistency checks: every account's balance
//! equals the sum of its posted entries, and every completed payment's
//! entries sum to `-amount` at the payer, `+amount` at the recipient, and
//! `0` at every intermediary.

use std::collections::HashMap;

use ledger_amount::Amount;

use crate::error::AuditError;
use crate::ledger::{LedgerStore, PaymentStatus};
use crate::node::NodeId;

/// Checks, for every account, that `balance == Σ entries`. Returns every
/// violation found rather than stopping at the first.
pub fn audit_ledger(store: &LedgerStore) -> Vec<AuditError> {
    let mut violations = Vec::new();
    for account in store.iter_accounts() {
        let entry_sum = store
            .iter_entries_of_account(account.id)
            .fold(Amount::ZERO, |acc, e| {
                acc.checked_add(e.amount).expect("entry sums stay within ledger bounds")
            });
        if entry_sum != account.balance {
            violations.push(AuditError::LedgerInconsistent {
                account: account.id,
                balance: account.balance,
                entry_sum,
            });
        }
    }
    violations
}

/// Checks, for every completed payment, that the payer's entries sum to
/// `-amount`, the recipient's to `+amount`, and every intermediary's to
/// zero.
pub fn audit_payments(store: &LedgerStore) -> Vec<AuditError> {
    let mut violations = Vec::new();
    for payment in store.iter_payments() {
        if payment.status != PaymentStatus::Completed {
            continue;
        }
        let mut by_node: HashMap<NodeId, Amount> = HashMap::new();
        for entry in store.iter_entries_of_payment(payment.id) {
            if let Some((pos_cl, neg_cl)) = store.creditline_pair(entry.account) {
                for cl in [pos_cl, neg_cl] {
                    let signed = entry
                        .amount
                        .checked_mul_small(cl.bal_mult.as_i64())
                        .expect("bal_mult is ±1");
                    let acc = by_node.entry(cl.node).or_insert(Amount::ZERO);
                    *acc = acc.checked_add(signed).expect("payment entry sums stay within ledger bounds");
                }
            }
        }
        for (&node, &sum) in &by_node {
            let expected = if node == payment.payer {
                payment.amount.checked_neg().expect("payment amounts are finite")
            } else if node == payment.recipient {
                payment.amount
            } else {
                Amount::ZERO
            };
            if sum != expected {
                violations.push(AuditError::PaymentInconsistent { payment: payment.id, node });
            }
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::executor;
    use crate::graph::FlowGraph;

    #[test]
    fn clean_ledger_has_no_violations() {
        let mut store = LedgerStore::new();
        let a = NodeId(1);
        let b = NodeId(2);
        let c = NodeId(3);
        store.create_node(a);
        store.create_node(b);
        store.create_node(c);
        store.create_account(a, b).unwrap();
        store.create_account(b, c).unwrap();
        store.set_credit_limit(b, a, "10".parse().unwrap()).unwrap();
        store.set_credit_limit(c, b, "10".parse().unwrap()).unwrap();

        let config = EngineConfig::default();
        let payment_id = store.create_payment(a, c, "4".parse().unwrap(), String::new(), 0).unwrap();
        let graph = FlowGraph::build(&store, false, &config);
        executor::attempt_payment(&mut store, &graph, payment_id, &config, 1).unwrap();

        assert!(audit_ledger(&store).is_empty());
        assert!(audit_payments(&store).is_empty());
    }
}
