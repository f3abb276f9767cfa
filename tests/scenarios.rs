//! End-to-end scenarios against the public API, mirroring the literal
//! fixtures used to validate the payment core's behavior.

use crypto_payment_core::chain_profile::Network;
use crypto_payment_core::config::PaymentCoreConfig;
use crypto_payment_core::payment::{
    CreatePaymentRequest, FiatSnapshot, PaymentFlowStateMachine, PaymentState,
};
use crypto_payment_core::reconciler::Reconciler;
use rust_decimal_macros::dec;

fn fiat() -> FiatSnapshot {
    FiatSnapshot {
        fiat_amount_minor_units: 250_00,
        fiat_currency: "USD".to_string(),
        exchange_rate: dec!(2500.0),
    }
}

fn request(id: &str, network: Network, currency: &str, amount: rust_decimal::Decimal) -> CreatePaymentRequest {
    CreatePaymentRequest {
        id: id.to_string(),
        workspace_id: Some("ws-acme".to_string()),
        user_id: "user-42".to_string(),
        subscription_id: Some("sub-1".to_string()),
        invoice_id: None,
        network,
        currency: currency.to_string(),
        expected_amount: amount,
        fiat: fiat(),
    }
}

#[test]
fn scenario_a_happy_eth_path_reaches_completed_at_version_four() {
    let machine = PaymentFlowStateMachine::new(PaymentCoreConfig::for_tests());
    let now = 1_700_000_000_000i64;

    machine
        .create_payment(request("pay-A", Network::Ethereum, "ETH", dec!(1.00000000)), now)
        .expect("create succeeds");

    let tx_hash = format!("0x{}", "a".repeat(64));
    let from = format!("0x{}", "b".repeat(40));
    let outcome = machine.record_transaction_detected("pay-A", &tx_hash, &from, dec!(1.00000000), now);
    assert!(outcome.success);

    assert!(machine.update_confirmations("pay-A", 1, None, now).success);
    let outcome = machine.update_confirmations("pay-A", 12, None, now);
    assert_eq!(outcome.record.unwrap().state, PaymentState::Confirmed);

    let outcome = machine.complete_payment("pay-A", now);
    let record = outcome.record.expect("completion succeeds");

    assert_eq!(record.state, PaymentState::Completed);
    assert_eq!(record.version, 4);
    assert!(!record.discrepancy.is_overpayment);
    assert!(!record.discrepancy.is_underpayment);
    assert_eq!(record.state_history.len(), 4);
}

#[test]
fn scenario_b_btc_underpayment_surfaces_in_reconciliation() {
    let machine = PaymentFlowStateMachine::new(PaymentCoreConfig::for_tests());
    let now = 1_700_000_000_000i64;

    machine
        .create_payment(request("pay-B", Network::Bitcoin, "BTC", dec!(1.00000000)), now)
        .expect("create succeeds");

    let tx_hash = "b".repeat(64);
    let from = "bc1qwatchedsenderaddress0000000000000";
    let outcome = machine.record_transaction_detected("pay-B", &tx_hash, from, dec!(0.50000000), now);
    let record = outcome.record.expect("detection succeeds");
    assert!(record.discrepancy.is_underpayment);
    assert_eq!(record.discrepancy.underpayment_deadline, Some(now + 15 * 60 * 1000));

    let outcome = machine.update_confirmations("pay-B", 6, None, now);
    assert_eq!(outcome.record.unwrap().state, PaymentState::Confirmed);
    assert!(machine.complete_payment("pay-B", now).success);

    let summary = Reconciler::new(&machine).run(now + 20 * 60 * 1000);
    assert!(summary.underpayments.iter().any(|r| r.id == "pay-B"));
    assert!(summary
        .issues
        .iter()
        .any(|issue| issue.contains("Underpayment expired")));
}

#[test]
fn scenario_c_polygon_confirms_only_at_threshold() {
    let machine = PaymentFlowStateMachine::new(PaymentCoreConfig::for_tests());
    let now = 1_700_000_000_000i64;

    machine
        .create_payment(request("pay-C", Network::Polygon, "MATIC", dec!(25)), now)
        .expect("create succeeds");
    let tx_hash = format!("0x{}", "c".repeat(64));
    let from = format!("0x{}", "d".repeat(40));
    machine.record_transaction_detected("pay-C", &tx_hash, &from, dec!(25), now);

    assert_eq!(
        machine.update_confirmations("pay-C", 15, None, now).record.unwrap().state,
        PaymentState::Confirming
    );
    assert_eq!(
        machine.update_confirmations("pay-C", 29, None, now).record.unwrap().state,
        PaymentState::Confirming
    );
    assert_eq!(
        machine.update_confirmations("pay-C", 30, None, now).record.unwrap().state,
        PaymentState::Confirmed
    );
}

#[test]
fn scenario_d_reorg_after_confirmation_fails_the_payment() {
    let machine = PaymentFlowStateMachine::new(PaymentCoreConfig::for_tests());
    let now = 1_700_000_000_000i64;

    machine
        .create_payment(request("pay-D", Network::Ethereum, "ETH", dec!(1)), now)
        .expect("create succeeds");
    let tx_hash = format!("0x{}", "a".repeat(64));
    let from = format!("0x{}", "b".repeat(40));
    machine.record_transaction_detected("pay-D", &tx_hash, &from, dec!(1), now);
    machine.update_confirmations("pay-D", 12, None, now);
    assert_eq!(machine.get_payment("pay-D").unwrap().state, PaymentState::Confirmed);

    let outcome = machine.update_confirmations("pay-D", 3, None, now);
    let record = outcome.record.expect("reorg transition still returns a record");
    assert_eq!(record.state, PaymentState::Failed);
    assert!(record.failure_reason.unwrap().to_lowercase().contains("reorg"));
}

#[test]
fn scenario_e_expiry_sweep_leaves_completed_payments_untouched() {
    let machine = PaymentFlowStateMachine::new(PaymentCoreConfig::for_tests());
    let t = 1_700_000_000_000i64;

    machine.create_payment(request("pay-1", Network::Ethereum, "ETH", dec!(1)), t).unwrap();
    machine.create_payment(request("pay-2", Network::Ethereum, "ETH", dec!(1)), t).unwrap();
    machine.create_payment(request("pay-3", Network::Ethereum, "ETH", dec!(1)), t).unwrap();

    let tx_hash = format!("0x{}", "a".repeat(64));
    let from = format!("0x{}", "b".repeat(40));
    machine.record_transaction_detected("pay-3", &tx_hash, &from, dec!(1), t);
    machine.update_confirmations("pay-3", 12, None, t);
    machine.complete_payment("pay-3", t);

    let expired = machine.process_expired_payments(t + 31 * 60 * 1000);
    let ids: Vec<&str> = expired.iter().map(|r| r.id.as_str()).collect();

    assert_eq!(expired.len(), 2);
    assert!(ids.contains(&"pay-1"));
    assert!(ids.contains(&"pay-2"));
    assert_eq!(machine.get_payment("pay-3").unwrap().state, PaymentState::Completed);
}

#[test]
fn scenario_f_stale_version_loses_the_cas_race() {
    let machine = PaymentFlowStateMachine::new(PaymentCoreConfig::for_tests());
    let now = 1_700_000_000_000i64;

    let record = machine
        .create_payment(request("pay-F", Network::Ethereum, "ETH", dec!(1)), now)
        .expect("create succeeds");
    assert_eq!(record.version, 0);

    assert!(machine.fail_payment("pay-F", "manual fail", now).success);

    let stale_attempt = machine.transition(
        "pay-F",
        PaymentState::Expired,
        "expire",
        0,
        Default::default(),
        now,
    );
    assert!(!stale_attempt.success);
    assert!(stale_attempt.error.unwrap().contains("version mismatch"));

    let record = machine.get_payment("pay-F").unwrap();
    assert_eq!(record.state, PaymentState::Failed);
    assert_eq!(record.state_history.len(), 1);
}
