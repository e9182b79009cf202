// Integration tests for the ticket purchase scenario against the simulated network
use primitive_types::U256;
use starknet::core::types::Felt;
use std::sync::Arc;

use ticket_ops::flows::{expected_cost, OpsContext, TicketSuite};
use ticket_ops::{OpsConfig, OpsError, SimulatedNetwork, TicketSetup};

const ADMIN: u64 = 0xAD;
const BUYER: u64 = 0xB0;
const TICKET: u64 = 0x7111;
const TOKEN: u64 = 0x70C3;

fn config() -> OpsConfig {
    OpsConfig {
        ticket_address: Some(format!("{:#x}", TICKET)),
        payment_address: Some(format!("{:#x}", TOKEN)),
        poll_interval_ms: 1,
        wait_timeout_secs: 1,
        setup_wait_timeout_secs: 1,
        ..OpsConfig::default()
    }
}

fn deploy(discount_five_lots: u8, discount_ten_lots: u8) -> Arc<SimulatedNetwork> {
    let network = Arc::new(SimulatedNetwork::new());
    network.deploy_token(Felt::from(TOKEN), &[(Felt::from(BUYER), U256::exp10(18))]);
    network.deploy_ticket(
        Felt::from(TICKET),
        TicketSetup {
            owner: Felt::from(ADMIN),
            token: Felt::from(TOKEN),
            tickets_per_lot: 10,
            ticket_price: U256::exp10(15),
            discount_five_lots,
            discount_ten_lots,
        },
    );
    network
}

async fn suite(network: &Arc<SimulatedNetwork>) -> TicketSuite {
    let account = Arc::new(network.account(Felt::from(BUYER)));
    let ctx = OpsContext::new(network.clone(), account, config());
    TicketSuite::setup(ctx).await.unwrap()
}

fn buyer_balance(network: &SimulatedNetwork) -> U256 {
    network.balance_of(Felt::from(TOKEN), Felt::from(BUYER))
}

#[tokio::test]
async fn test_reads_ticket_parameters() {
    let network = deploy(5, 10);
    let suite = suite(&network).await;

    let params = suite.parameters().await.unwrap();
    assert_eq!(params.lot_size, 10);
    assert_eq!(params.unit_price, U256::exp10(15));
    assert_eq!(params.discount_five_lots, U256::from(5u64));
    assert_eq!(params.discount_ten_lots, U256::from(10u64));
}

#[tokio::test]
async fn test_contract_quote_matches_formula() {
    let network = deploy(5, 10);
    let suite = suite(&network).await;
    let params = suite.parameters().await.unwrap();

    for lots in 1..=12u64 {
        let cost = suite.verify_quote(lots).await.unwrap();
        assert_eq!(cost, expected_cost(&params, lots).unwrap());
        if lots != 5 && lots != 10 {
            assert_eq!(cost, U256::exp10(16) * U256::from(lots));
        }
    }
}

#[tokio::test]
async fn test_single_lot_purchase_debits_exact_cost() {
    let network = deploy(5, 10);
    let suite = suite(&network).await;
    let start = buyer_balance(&network);

    let receipt = suite.purchase_lots(1).await.unwrap();

    assert_eq!(receipt.cost, U256::exp10(16));
    assert_eq!(receipt.tickets, 10);
    assert_eq!(receipt.balance_before - receipt.balance_after, U256::exp10(16));
    assert_eq!(start - buyer_balance(&network), U256::exp10(16));
    assert_eq!(network.tickets_of(Felt::from(TICKET), Felt::from(BUYER)), 10);
    assert_ne!(receipt.approve_tx, receipt.purchase_tx);
}

#[tokio::test]
async fn test_five_lot_purchase_applies_discount() {
    let network = deploy(5, 10);
    let suite = suite(&network).await;

    let receipt = suite.purchase_lots(5).await.unwrap();

    let base = U256::exp10(16) * U256::from(5u64);
    let expected = base - base * U256::from(5u64) / U256::from(100u64);
    assert_eq!(receipt.cost, expected);
    assert_eq!(receipt.balance_before - receipt.balance_after, expected);
    assert_eq!(network.tickets_of(Felt::from(TICKET), Felt::from(BUYER)), 50);
}

#[tokio::test]
async fn test_ten_lot_purchase_applies_discount() {
    let network = deploy(5, 10);
    let suite = suite(&network).await;

    let receipt = suite.purchase_lots(10).await.unwrap();
    assert_eq!(receipt.cost, U256::from(90_000_000_000_000_000u64));
}

#[tokio::test]
async fn test_repeated_purchases_are_not_idempotent() {
    let network = deploy(5, 10);
    let suite = suite(&network).await;

    let first = suite.purchase_lots(2).await.unwrap();
    let second = suite.purchase_lots(2).await.unwrap();

    assert_eq!(second.balance_before, first.balance_after);
    assert_eq!(network.tickets_of(Felt::from(TICKET), Felt::from(BUYER)), 40);
}

#[tokio::test]
async fn test_purchase_without_approval_reverts_and_keeps_balance() {
    let network = deploy(5, 10);
    let suite = suite(&network).await;
    let before = suite.balance().await.unwrap();

    let err = suite.purchase_without_approval(1).await.unwrap_err();
    match err {
        OpsError::Reverted { reason, .. } => assert!(reason.contains("allowance")),
        other => panic!("expected Reverted, got {:?}", other),
    }

    assert_eq!(suite.balance().await.unwrap(), before);
    assert_eq!(network.tickets_of(Felt::from(TICKET), Felt::from(BUYER)), 0);
}

#[tokio::test]
async fn test_unconfirmed_approval_stops_before_purchase() {
    let network = deploy(5, 10);
    let suite = suite(&network).await;
    network.stall_confirmations(true);

    let err = suite.purchase_lots(1).await.unwrap_err();

    assert!(matches!(err, OpsError::ConfirmationTimeout { .. }));
    // only the approval went out
    assert_eq!(network.transactions_submitted(), 1);
    assert_eq!(network.tickets_of(Felt::from(TICKET), Felt::from(BUYER)), 0);
    assert_eq!(buyer_balance(&network), U256::exp10(18));
}

#[tokio::test]
async fn test_insufficient_balance_reverts_purchase() {
    let network = Arc::new(SimulatedNetwork::new());
    network.deploy_token(Felt::from(TOKEN), &[(Felt::from(BUYER), U256::exp10(15))]);
    network.deploy_ticket(
        Felt::from(TICKET),
        TicketSetup {
            owner: Felt::from(ADMIN),
            token: Felt::from(TOKEN),
            tickets_per_lot: 10,
            ticket_price: U256::exp10(15),
            discount_five_lots: 5,
            discount_ten_lots: 10,
        },
    );
    let suite = suite(&network).await;

    let err = suite.purchase_lots(1).await.unwrap_err();
    assert!(matches!(err, OpsError::Reverted { .. }));
    assert_eq!(buyer_balance(&network), U256::exp10(15));
}

#[tokio::test]
async fn test_missing_payment_address_fails_setup() {
    let network = deploy(5, 10);
    let account = Arc::new(network.account(Felt::from(BUYER)));
    let config = OpsConfig {
        payment_address: None,
        ..config()
    };

    let result = TicketSuite::setup(OpsContext::new(network.clone(), account, config)).await;
    match result {
        Err(OpsError::ConfigurationMissing(var)) => assert_eq!(var, "PAYMENT_ADDRESS"),
        Err(other) => panic!("expected ConfigurationMissing, got {:?}", other),
        Ok(_) => panic!("setup should fail without a payment address"),
    }
}
