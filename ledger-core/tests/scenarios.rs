//! End-to-end payment scenarios, driven through `Engine`'s public API
//! rather than any one module's internals.

use ledger_amount::Amount;
use ledger_core::ledger::PaymentStatus;
use ledger_core::Engine;

fn amount(s: &str) -> Amount {
    s.parse().unwrap()
}

#[test]
fn scenario_1_one_hop() {
    let engine = Engine::with_config_default();
    let n1 = engine.create_node();
    let n2 = engine.create_node();
    engine.set_credit_limit(n2, n1, amount("5")).unwrap();
    engine.set_credit_limit(n1, n2, amount("5")).unwrap();

    let payment = engine.attempt_payment(n1, n2, amount("1"), String::new(), 1).unwrap();
    assert_eq!(engine.payment_status(payment).unwrap(), PaymentStatus::Completed);
    assert_eq!(engine.get_account(n1, n2).unwrap().balance, amount("-1"));
    assert_eq!(engine.get_account(n2, n1).unwrap().balance, amount("1"));
    assert_eq!(engine.iter_entries_of(n1, n2).len(), 1);
}

#[test]
fn scenario_2_exact_limit_then_overage_fails() {
    let engine = Engine::with_config_default();
    let n1 = engine.create_node();
    let n2 = engine.create_node();
    engine.set_credit_limit(n2, n1, amount("5")).unwrap();
    engine.set_credit_limit(n1, n2, amount("5")).unwrap();

    let payment = engine.attempt_payment(n1, n2, amount("5"), String::new(), 1).unwrap();
    assert_eq!(engine.payment_status(payment).unwrap(), PaymentStatus::Completed);

    let err = engine
        .attempt_payment(n1, n2, amount("0.01"), String::new(), 2)
        .unwrap_err();
    assert_eq!(err.to_string(), "network has insufficient aggregate capacity for this payment");
}

#[test]
fn scenario_3_zero_limit_fails() {
    let engine = Engine::with_config_default();
    let n1 = engine.create_node();
    let n2 = engine.create_node();
    engine.set_credit_limit(n2, n1, amount("0")).unwrap();
    engine.set_credit_limit(n1, n2, amount("0")).unwrap();

    let err = engine.attempt_payment(n1, n2, amount("1"), String::new(), 1).unwrap_err();
    assert_eq!(err.to_string(), "network has insufficient aggregate capacity for this payment");
    assert_eq!(engine.get_account(n1, n2).unwrap().balance, Amount::ZERO);
}

#[test]
fn scenario_4_three_hop_ripple_nets_out_the_intermediary() {
    let engine = Engine::with_config_default();
    let n1 = engine.create_node();
    let n2 = engine.create_node();
    let n3 = engine.create_node();
    for (endorser, recipient) in [(n2, n1), (n1, n2), (n3, n2), (n2, n3)] {
        engine.set_credit_limit(endorser, recipient, amount("10")).unwrap();
    }

    let payment = engine.attempt_payment(n1, n3, amount("3"), String::new(), 1).unwrap();
    assert_eq!(engine.payment_status(payment).unwrap(), PaymentStatus::Completed);
    assert_eq!(engine.get_account(n1, n2).unwrap().balance, amount("-3"));
    assert_eq!(engine.get_account(n2, n3).unwrap().balance, amount("-3"));

    // n2's net signed balance across both its accounts is zero: an
    // intermediary is left unchanged by a routed payment passing through it.
    let n2_vs_n1 = engine.get_account(n2, n1).unwrap().balance;
    let n2_vs_n3 = engine.get_account(n2, n3).unwrap().balance;
    assert_eq!(n2_vs_n1.checked_add(n2_vs_n3).unwrap(), Amount::ZERO);
}

#[test]
fn scenario_5_multi_path_payment_splits_across_routes() {
    let engine = Engine::with_config_default();
    let n1 = engine.create_node();
    let n2 = engine.create_node();
    let n3 = engine.create_node();
    let n4 = engine.create_node();
    // n1 -> n2 -> n4 and n1 -> n3 -> n4, each leg capped at 4 so no single
    // path can carry 6 but the two together can.
    for (endorser, recipient) in [
        (n2, n1),
        (n3, n1),
        (n4, n2),
        (n4, n3),
    ] {
        engine.set_credit_limit(endorser, recipient, amount("4")).unwrap();
    }

    let payment = engine.attempt_payment(n1, n4, amount("6"), String::new(), 1).unwrap();
    assert_eq!(engine.payment_status(payment).unwrap(), PaymentStatus::Completed);

    let leg_12 = engine.get_account(n1, n2).unwrap().balance;
    let leg_13 = engine.get_account(n1, n3).unwrap().balance;
    assert_eq!(leg_12.checked_add(leg_13).unwrap(), amount("-6"));
    assert!(leg_12 != Amount::ZERO && leg_13 != Amount::ZERO, "payment should split across both routes");
}

#[test]
fn scenario_6_prefers_settling_existing_debt_before_new_debt() {
    let engine = Engine::with_config_default();
    let n1 = engine.create_node();
    let n2 = engine.create_node();
    // n2 already owes n1 2 units; give n1 room to issue new IOUs to n2 too.
    engine.set_credit_limit(n1, n2, amount("10")).unwrap();
    engine.set_credit_limit(n2, n1, amount("10")).unwrap();
    let seed = engine
        .commit_as_direct_entry(
            ledger_core::AdminCapability::acquire(),
            n2,
            n1,
            amount("2"),
            "seed debt".into(),
            0,
        )
        .unwrap();
    assert_eq!(engine.payment_status(seed).unwrap(), PaymentStatus::Completed);
    assert_eq!(engine.get_account(n1, n2).unwrap().balance, amount("2"));

    let payment = engine.attempt_payment(n1, n2, amount("5"), String::new(), 1).unwrap();
    assert_eq!(engine.payment_status(payment).unwrap(), PaymentStatus::Completed);
    // 2 units cash in the existing IOU, 3 units issue new debt: n1 ends up
    // owing n2 net 3 (2 cashed in plus 3 new, minus the 2 it was owed).
    assert_eq!(engine.get_account(n1, n2).unwrap().balance, amount("-3"));
}
