//! In-memory node for tests and dry runs
//!
//! [`MockNode`] implements [`ChainBackend`] with scripted behaviour: settable
//! gas price and pending nonce, queued broadcast errors, a configurable
//! proposal status, vote records and deposit logs. Broadcasts are decoded and
//! checked against the pending nonce the way a real node would.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use alloy::sol_types::{SolCall, SolValue};
use alloy_primitives::aliases::U72;
use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use eyre::{eyre, Result};

use crate::client::backend::{ChainBackend, LogEntry};
use crate::hash::id_and_nonce;
use crate::proposal::contract::{deposit_event_topic, Bridge};
use crate::transaction::CeloTransaction;

#[derive(Default)]
struct NodeState {
    gas_price: u128,
    pending_nonce: u64,
    latest_block: u64,
    gas_price_errors: VecDeque<String>,
    nonce_errors: VecDeque<String>,
    send_errors: VecDeque<String>,
    send_attempts: usize,
    send_delay: Duration,
    sent: Vec<Vec<u8>>,
    proposal_status: u8,
    status_query_errors: usize,
    status_queries: usize,
    votes: HashSet<(U72, B256, Address)>,
    handlers: HashMap<B256, Address>,
    logs: Vec<LogEntry>,
}

/// Scriptable in-memory node. Clones share state.
#[derive(Clone, Default)]
pub struct MockNode {
    state: Arc<Mutex<NodeState>>,
}

impl MockNode {
    pub fn new() -> Self {
        let node = Self::default();
        node.state().gas_price = 1_000_000_000;
        node
    }

    fn state(&self) -> MutexGuard<'_, NodeState> {
        // a test that panicked while holding the lock has already failed
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_gas_price(&self, gas_price: u128) {
        self.state().gas_price = gas_price;
    }

    pub fn set_pending_nonce(&self, nonce: u64) {
        self.state().pending_nonce = nonce;
    }

    pub fn set_latest_block(&self, block: u64) {
        self.state().latest_block = block;
    }

    /// Raw status byte returned by `getProposal`
    pub fn set_proposal_status(&self, status: u8) {
        self.state().proposal_status = status;
    }

    /// Delay every broadcast, widening race windows in concurrency tests
    pub fn set_send_delay(&self, delay: Duration) {
        self.state().send_delay = delay;
    }

    pub fn fail_next_gas_price(&self, message: &str) {
        self.state().gas_price_errors.push_back(message.to_string());
    }

    pub fn fail_next_nonce(&self, message: &str) {
        self.state().nonce_errors.push_back(message.to_string());
    }

    /// Queue an error for the next broadcast
    pub fn push_send_error(&self, message: &str) {
        self.state().send_errors.push_back(message.to_string());
    }

    /// Fail the next `count` proposal status queries
    pub fn fail_status_queries(&self, count: usize) {
        self.state().status_query_errors = count;
    }

    pub fn record_vote(&self, source_id: u8, deposit_nonce: u64, data_hash: B256, voter: Address) {
        let key = id_and_nonce(source_id, deposit_nonce);
        self.state().votes.insert((key, data_hash, voter));
    }

    pub fn register_handler(&self, resource_id: B256, handler: Address) {
        self.state().handlers.insert(resource_id, handler);
    }

    /// Append a deposit event log
    pub fn emit_deposit(
        &self,
        bridge: Address,
        destination_id: u8,
        resource_id: B256,
        deposit_nonce: u64,
        block: u64,
    ) {
        let topics = vec![
            deposit_event_topic(),
            B256::from(U256::from(destination_id).to_be_bytes::<32>()),
            resource_id,
            B256::from(U256::from(deposit_nonce).to_be_bytes::<32>()),
        ];
        self.state().logs.push(LogEntry {
            address: bridge,
            topics,
            data: Bytes::new(),
            block_number: Some(block),
        });
    }

    /// Encoded transactions accepted so far
    pub fn sent_transactions(&self) -> Vec<Vec<u8>> {
        self.state().sent.clone()
    }

    /// Broadcast calls, accepted or not
    pub fn send_attempts(&self) -> usize {
        self.state().send_attempts
    }

    pub fn status_queries(&self) -> usize {
        self.state().status_queries
    }

    fn answer_call(&self, data: &[u8]) -> Result<Bytes> {
        let selector: [u8; 4] = data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| eyre!("calldata too short"))?;
        let mut state = self.state();

        if selector == Bridge::getProposalCall::SELECTOR {
            let call = Bridge::getProposalCall::abi_decode(data, true)?;
            state.status_queries += 1;
            if state.status_query_errors > 0 {
                state.status_query_errors -= 1;
                return Err(eyre!("status query failed: connection reset"));
            }
            let record = Bridge::BridgeProposal {
                _resourceID: B256::ZERO,
                _dataHash: call.dataHash,
                _yesVotes: Vec::new(),
                _noVotes: Vec::new(),
                _status: state.proposal_status,
                _proposedBlock: U256::from(state.latest_block),
            };
            return Ok((record,).abi_encode_params().into());
        }

        if selector == Bridge::_hasVotedOnProposalCall::SELECTOR {
            let call = Bridge::_hasVotedOnProposalCall::abi_decode(data, true)?;
            let voted = state
                .votes
                .contains(&(call.destNonce, call.dataHash, call.relayer));
            return Ok(voted.abi_encode().into());
        }

        if selector == Bridge::_resourceIDToHandlerAddressCall::SELECTOR {
            let call = Bridge::_resourceIDToHandlerAddressCall::abi_decode(data, true)?;
            let handler = state
                .handlers
                .get(&call.resourceID)
                .copied()
                .unwrap_or(Address::ZERO);
            return Ok(handler.abi_encode().into());
        }

        Err(eyre!(
            "execution reverted: unknown selector 0x{}",
            hex::encode(selector)
        ))
    }
}

#[async_trait]
impl ChainBackend for MockNode {
    async fn pending_nonce(&self, _address: Address) -> Result<u64> {
        let mut state = self.state();
        if let Some(message) = state.nonce_errors.pop_front() {
            return Err(eyre!(message));
        }
        Ok(state.pending_nonce)
    }

    async fn suggest_gas_price(&self) -> Result<u128> {
        let mut state = self.state();
        if let Some(message) = state.gas_price_errors.pop_front() {
            return Err(eyre!(message));
        }
        Ok(state.gas_price)
    }

    async fn call(&self, _to: Address, data: Bytes, _block: Option<u64>) -> Result<Bytes> {
        self.answer_call(&data)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256> {
        let delay = self.state().send_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        state.send_attempts += 1;
        if let Some(message) = state.send_errors.pop_front() {
            return Err(eyre!(message));
        }

        let tx = CeloTransaction::decode(&raw).map_err(|e| eyre!("invalid transaction: {}", e))?;
        if tx.nonce() < state.pending_nonce {
            return Err(eyre!("nonce too low"));
        }
        if tx.nonce() > state.pending_nonce {
            return Err(eyre!("nonce too high"));
        }
        state.pending_nonce += 1;
        state.sent.push(raw.to_vec());
        Ok(tx.hash())
    }

    async fn filter_logs(
        &self,
        address: Address,
        topic: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LogEntry>> {
        let state = self.state();
        Ok(state
            .logs
            .iter()
            .filter(|log| log.address == address)
            .filter(|log| log.topics.first() == Some(&topic))
            .filter(|log| {
                log.block_number
                    .is_some_and(|b| b >= from_block && b <= to_block)
            })
            .cloned()
            .collect())
    }

    async fn latest_block(&self) -> Result<u64> {
        Ok(self.state().latest_block)
    }
}
