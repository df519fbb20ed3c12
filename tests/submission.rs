//! Submission Integration Test
//!
//! Drives the full relayer path against the in-memory node: deposit log to
//! ERC20 proposal, vote, execute, and the idempotence check when another
//! relayer got there first.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256};
use celo_bridge_adapter::handlers::{erc20_message_handler, DepositMessage};
use celo_bridge_adapter::proposal::contract::{execute_calldata, DEPOSIT_EVENT_SIGNATURE};
use celo_bridge_adapter::testing::MockNode;
use celo_bridge_adapter::{
    CeloClient, CeloConfig, CeloTransaction, Error, ProposalStatus, ProposalWriter, RetryConfig,
    Scheme, SubmissionOutcome,
};

const TEST_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
const BRIDGE: &str = "0x62877ddcd49ad22f5edfc6ac108e9a4b5d2bd88b";
const ERC20_HANDLER: &str = "0x3167776db165d8ea0f51790ca2bbf44db5105adf";

fn config() -> CeloConfig {
    let vars = [
        ("CELO_RPC_URL", "http://localhost:8545"),
        ("CELO_CHAIN_ID", "44787"),
        ("CELO_BRIDGE_ADDRESS", BRIDGE),
        ("CELO_ERC20_HANDLER", ERC20_HANDLER),
        ("CELO_PRIVATE_KEY", TEST_KEY),
        ("CELO_TX_RETRY_LIMIT", "5"),
        ("CELO_TX_RETRY_INTERVAL_MS", "1"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    CeloConfig::from_map(&vars).unwrap()
}

fn writer(node: &MockNode, config: &CeloConfig) -> ProposalWriter<MockNode> {
    let client = CeloClient::from_config(node.clone(), config).unwrap();
    ProposalWriter::with_retry(Arc::new(client), RetryConfig::from_config(config))
}

fn deposit_message(deposit_nonce: u64) -> DepositMessage {
    DepositMessage {
        source_id: 1,
        destination_id: 2,
        deposit_nonce,
        resource_id: B256::repeat_byte(0x01),
        payload: vec![
            Bytes::from(vec![0x0d, 0xe0, 0xb6, 0xb3, 0xa7, 0x64, 0x00, 0x00]),
            Bytes::copy_from_slice(Address::repeat_byte(0x99).as_slice()),
        ],
    }
}

#[tokio::test]
async fn test_deposit_to_execution() {
    let config = config();
    let node = MockNode::new();
    let bridge = config.bridge_address().unwrap();
    let handler = config.erc20_handler().unwrap().unwrap();
    node.register_handler(B256::repeat_byte(0x01), handler);
    node.emit_deposit(bridge, 2, B256::repeat_byte(0x01), 17, 12);
    let writer = writer(&node, &config);

    let deposits = writer
        .client()
        .fetch_deposit_logs(bridge, DEPOSIT_EVENT_SIGNATURE, 0, 20)
        .await
        .unwrap();
    assert_eq!(deposits.len(), 1);

    let resolved = writer
        .client()
        .resource_id_to_handler(bridge, deposits[0].resource_id)
        .await
        .unwrap();
    assert_eq!(resolved, handler);

    let proposal =
        erc20_message_handler(&deposit_message(deposits[0].deposit_nonce), resolved, bridge)
            .unwrap();
    assert!(!writer.voted_by(&proposal, writer.client().address()).await.unwrap());

    let vote = writer.vote_proposal(&proposal).await.unwrap();
    let exec = writer.execute_proposal(&proposal).await.unwrap();
    assert!(matches!(vote, SubmissionOutcome::Submitted(_)));
    assert!(matches!(exec, SubmissionOutcome::Submitted(_)));

    let sent: Vec<CeloTransaction> = node
        .sent_transactions()
        .iter()
        .map(|raw| CeloTransaction::decode(raw).unwrap())
        .collect();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].nonce(), 0);
    assert_eq!(sent[1].nonce(), 1);
    assert_eq!(sent[1].input(), &execute_calldata(&proposal));
    for tx in &sent {
        assert_eq!(
            Scheme::eip155(44_787).recover_sender(tx).unwrap(),
            writer.client().address()
        );
    }
}

#[tokio::test]
async fn test_execute_already_executed_by_another_relayer() {
    let config = config();
    let node = MockNode::new();
    node.push_send_error("execution reverted: proposal already executed");
    node.set_proposal_status(ProposalStatus::Executed.as_u8());
    let writer = writer(&node, &config);

    let proposal = erc20_message_handler(
        &deposit_message(3),
        config.erc20_handler().unwrap().unwrap(),
        config.bridge_address().unwrap(),
    )
    .unwrap();

    let outcome = writer.execute_proposal(&proposal).await.unwrap();
    assert_eq!(
        outcome,
        SubmissionOutcome::AlreadyFinalized(ProposalStatus::Executed)
    );
    assert_eq!(node.send_attempts(), 1);
}

#[tokio::test]
async fn test_fatal_error_names_proposal() {
    let config = config();
    let node = MockNode::new();
    for _ in 0..5 {
        node.push_send_error("intrinsic gas too low");
    }
    node.set_proposal_status(ProposalStatus::Active.as_u8());
    let writer = writer(&node, &config);

    let proposal = erc20_message_handler(
        &deposit_message(8),
        config.erc20_handler().unwrap().unwrap(),
        config.bridge_address().unwrap(),
    )
    .unwrap();

    let err = writer.vote_proposal(&proposal).await.unwrap_err();
    assert!(matches!(
        err,
        Error::FatalSubmission {
            source_id: 1,
            destination_id: 2,
            deposit_nonce: 8
        }
    ));
    assert_eq!(node.send_attempts(), 5);
}

#[tokio::test]
async fn test_concurrent_writers_share_one_nonce_cursor() {
    let config = config();
    let node = MockNode::new();
    node.set_send_delay(Duration::from_millis(2));
    let writer = writer(&node, &config);
    let handler = config.erc20_handler().unwrap().unwrap();
    let bridge = config.bridge_address().unwrap();

    let tasks: Vec<_> = (0..6)
        .map(|nonce| {
            let writer = writer.clone();
            let proposal = erc20_message_handler(&deposit_message(nonce), handler, bridge).unwrap();
            tokio::spawn(async move { writer.vote_proposal(&proposal).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let mut nonces: Vec<u64> = node
        .sent_transactions()
        .iter()
        .map(|raw| CeloTransaction::decode(raw).unwrap().nonce())
        .collect();
    nonces.sort_unstable();
    assert_eq!(nonces, vec![0, 1, 2, 3, 4, 5]);
}
