//! Invariant and property checks, exercised as hand-written fixed-sequence
//! tests rather than a randomized-property framework.

use std::collections::HashMap;

use ledger_amount::Amount;
use ledger_core::node::NodeId;
use ledger_core::Engine;

fn amount(s: &str) -> Amount {
    s.parse().unwrap()
}

fn assert_invariants_hold(engine: &Engine, nodes: &[NodeId]) {
    // Structural invariants are enforced by the ledger itself and checked
    // at every mutation site; a clean audit plus "every pairwise account
    // view respects its limits" is as close as a black-box check gets.
    assert!(engine.audit_ledger().is_empty(), "balance does not equal entry sum");
    assert!(engine.audit_payments().is_empty(), "payment entries do not sum correctly");
    for &a in nodes {
        for &b in nodes {
            if a == b {
                continue;
            }
            if let Some(view) = engine.get_account(a, b) {
                if view.out_limit != Amount::Infinity {
                    assert!(view.balance >= view.out_limit.checked_neg().unwrap());
                }
            }
        }
    }
}

#[test]
fn invariants_survive_a_mixed_sequence_of_limits_and_payments() {
    let engine = Engine::with_config_default();
    let nodes: Vec<NodeId> = (0..4).map(|_| engine.create_node()).collect();
    let (a, b, c, d) = (nodes[0], nodes[1], nodes[2], nodes[3]);

    engine.set_credit_limit(b, a, amount("20")).unwrap();
    engine.set_credit_limit(c, b, amount("20")).unwrap();
    engine.set_credit_limit(d, c, amount("20")).unwrap();
    assert_invariants_hold(&engine, &nodes);

    engine.attempt_payment(a, d, amount("5"), String::new(), 1).unwrap();
    assert_invariants_hold(&engine, &nodes);

    // Tighten a limit below nothing risky, then try a payment that should
    // now fail cleanly.
    engine.set_credit_limit(b, a, amount("5")).unwrap();
    let _ = engine.attempt_payment(a, d, amount("5"), String::new(), 2);
    assert_invariants_hold(&engine, &nodes);
}

#[test]
fn failed_payment_is_all_or_nothing() {
    let engine = Engine::with_config_default();
    let a = engine.create_node();
    let b = engine.create_node();
    engine.set_credit_limit(b, a, amount("1")).unwrap();

    let before = engine.get_account(a, b).unwrap().balance;
    engine.attempt_payment(a, b, amount("5"), String::new(), 1).unwrap_err();
    let after = engine.get_account(a, b).unwrap().balance;
    assert_eq!(before, after);
    assert!(engine.iter_entries_of(a, b).is_empty());
}

#[test]
fn max_payment_matches_actual_routability() {
    let engine = Engine::with_config_default();
    let a = engine.create_node();
    let b = engine.create_node();
    engine.set_credit_limit(b, a, amount("5")).unwrap();

    let cap = engine.max_payment(a, b);
    assert_eq!(cap, amount("5"));

    assert!(engine.attempt_payment(a, b, cap, String::new(), 1).is_ok());

    let engine2 = Engine::with_config_default();
    let a2 = engine2.create_node();
    let b2 = engine2.create_node();
    engine2.set_credit_limit(b2, a2, amount("5")).unwrap();
    let over = engine2.max_payment(a2, b2).checked_add(amount("0.01")).unwrap();
    assert!(engine2.attempt_payment(a2, b2, over, String::new(), 1).is_err());
}

#[test]
fn reputation_memo_is_stable_until_a_limit_change() {
    let engine = Engine::with_config_default();
    let a = engine.create_node();
    let b = engine.create_node();
    engine.set_credit_limit(b, a, amount("3")).unwrap();

    let first = engine.reputation(a, b);
    let second = engine.reputation(a, b);
    assert_eq!(first, second);

    engine.set_credit_limit(b, a, amount("9")).unwrap();
    let third = engine.reputation(a, b);
    assert_eq!(third, amount("9"));
    assert_ne!(first, third);
}

#[test]
fn node_balance_round_trips_against_completed_payments() {
    let engine = Engine::with_config_default();
    let a = engine.create_node();
    let b = engine.create_node();
    let c = engine.create_node();
    engine.set_credit_limit(b, a, amount("20")).unwrap();
    engine.set_credit_limit(c, b, amount("20")).unwrap();

    let payments = [(a, c, amount("4")), (a, c, amount("2"))];
    for &(payer, recipient, amt) in &payments {
        engine.attempt_payment(payer, recipient, amt, String::new(), 1).unwrap();
    }

    let mut expected: HashMap<NodeId, Amount> = [a, b, c].iter().map(|&n| (n, Amount::ZERO)).collect();
    for &(payer, recipient, amt) in &payments {
        *expected.get_mut(&payer).unwrap() = expected[&payer].checked_sub(amt).unwrap();
        *expected.get_mut(&recipient).unwrap() = expected[&recipient].checked_add(amt).unwrap();
    }

    for &n in &[a, b, c] {
        let mut total = Amount::ZERO;
        for &other in &[a, b, c] {
            if other == n {
                continue;
            }
            if let Some(view) = engine.get_account(n, other) {
                total = total.checked_add(view.balance).unwrap();
            }
        }
        assert_eq!(total, expected[&n], "node {:?} balance mismatch", n);
    }

    assert!(engine.audit_payments().is_empty());
}
