//! Celo chain client
//!
//! Owns the relayer's signing identity and the transact options (nonce, gas
//! price, fee fields) that every outgoing transaction is built from. The
//! options live behind an async mutex: [`CeloClient::lock_and_update_opts`]
//! refreshes them from the node and hands back the guard, so concurrent
//! submissions from the same identity serialize on nonce assignment and the
//! lock is released whenever the guard goes out of scope.

pub mod backend;

use std::future::Future;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::config::{CeloConfig, DEFAULT_GAS_LIMIT, DEFAULT_GAS_PRICE};
use crate::error::{Error, Result};
use crate::hash::keccak256;
use crate::proposal::contract::{decode_resource_handler, resource_handler_calldata};
use crate::transaction::{LocalKey, TxRequest};
use crate::writers::retry::classify_error;

pub use backend::{ChainBackend, LogEntry, RpcBackend};

/// Fixed-point scale for the gas price multiplier (18 decimals)
pub const GAS_MULTIPLIER_SCALE: u128 = 1_000_000_000_000_000_000;

/// Mutable per-identity transaction options
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactOpts {
    pub from: Address,
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub value: U256,
    pub fee_currency: Option<Address>,
    pub gateway_fee_recipient: Option<Address>,
    pub gateway_fee: U256,
}

impl TransactOpts {
    pub fn new(from: Address, gas_limit: u64, gas_price: U256) -> Self {
        Self {
            from,
            nonce: 0,
            gas_price,
            gas_limit,
            value: U256::ZERO,
            fee_currency: None,
            gateway_fee_recipient: None,
            gateway_fee: U256::ZERO,
        }
    }
}

/// Gas price policy: node suggestion scaled by a multiplier, capped
#[derive(Debug, Clone, Copy)]
pub struct GasPolicy {
    pub multiplier: f64,
    pub max_gas_price: U256,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            max_gas_price: U256::from(DEFAULT_GAS_PRICE),
        }
    }
}

impl GasPolicy {
    /// Multiplier as an 18-decimal fixed-point integer. Zero means the
    /// multiplier is too small to represent.
    pub fn scaled_multiplier(multiplier: f64) -> u128 {
        // `as` saturates and maps NaN to zero
        (multiplier * GAS_MULTIPLIER_SCALE as f64).round() as u128
    }

    /// Apply the multiplier, rounding to the nearest wei, and clamp to the
    /// ceiling
    pub fn apply(&self, suggested: U256) -> U256 {
        let scale = U256::from(GAS_MULTIPLIER_SCALE);
        let multiplied = suggested
            .saturating_mul(U256::from(Self::scaled_multiplier(self.multiplier)))
            .saturating_add(scale / U256::from(2u8))
            / scale;
        multiplied.min(self.max_gas_price)
    }
}

/// Deposit event decoded from its indexed topics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositLog {
    pub destination_id: u8,
    pub resource_id: B256,
    pub deposit_nonce: u64,
    pub block_number: Option<u64>,
}

impl DepositLog {
    /// Decode topics `[signature, destination id, resource id, deposit nonce]`
    pub fn from_log(log: &LogEntry) -> Result<Self> {
        if log.topics.len() < 4 {
            return Err(Error::Abi(format!(
                "deposit log has {} topics, expected 4",
                log.topics.len()
            )));
        }
        let destination = U256::from_be_bytes(log.topics[1].0);
        let nonce = U256::from_be_bytes(log.topics[3].0);
        Ok(Self {
            destination_id: u8::try_from(destination)
                .map_err(|_| Error::Abi("destination id exceeds uint8".to_string()))?,
            resource_id: log.topics[2],
            deposit_nonce: u64::try_from(nonce)
                .map_err(|_| Error::Abi("deposit nonce exceeds uint64".to_string()))?,
            block_number: log.block_number,
        })
    }
}

/// Chain client bound to one signing identity
pub struct CeloClient<B> {
    backend: B,
    key: LocalKey,
    chain_id: u64,
    gas: GasPolicy,
    eth_compatible: bool,
    request_timeout: Duration,
    opts: Mutex<TransactOpts>,
}

impl<B: ChainBackend> CeloClient<B> {
    pub fn new(backend: B, key: LocalKey, chain_id: u64) -> Self {
        let opts = TransactOpts::new(key.address(), DEFAULT_GAS_LIMIT, U256::from(DEFAULT_GAS_PRICE));
        Self {
            backend,
            key,
            chain_id,
            gas: GasPolicy::default(),
            eth_compatible: false,
            request_timeout: Duration::from_secs(30),
            opts: Mutex::new(opts),
        }
    }

    /// Build a client from configuration
    pub fn from_config(backend: B, config: &CeloConfig) -> eyre::Result<Self> {
        let key = LocalKey::from_hex(&config.private_key)?;
        let mut opts = TransactOpts::new(key.address(), config.gas_limit, config.max_gas_price());
        opts.fee_currency = config.fee_currency()?;
        opts.gateway_fee_recipient = config.gateway_fee_recipient()?;
        opts.gateway_fee = config.gateway_fee();

        info!(
            chain_id = config.chain_id,
            address = %key.address(),
            eth_compatible = config.eth_compatible,
            "Created Celo client"
        );

        Ok(Self {
            backend,
            key,
            chain_id: config.chain_id,
            gas: GasPolicy {
                multiplier: config.gas_multiplier,
                max_gas_price: config.max_gas_price(),
            },
            eth_compatible: config.eth_compatible,
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            opts: Mutex::new(opts),
        })
    }

    pub fn with_gas_policy(mut self, gas: GasPolicy) -> Self {
        self.gas = gas;
        self
    }

    pub fn with_eth_compatible(mut self, eth_compatible: bool) -> Self {
        self.eth_compatible = eth_compatible;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Address of the signing identity
    pub fn address(&self) -> Address {
        self.key.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Snapshot of the current transact options
    pub async fn opts(&self) -> TransactOpts {
        self.opts.lock().await.clone()
    }

    /// Run a node request under the configured timeout
    async fn timed<T, F>(&self, what: &str, fut: F) -> Result<eyre::Result<T>>
    where
        F: Future<Output = eyre::Result<T>>,
    {
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .map_err(|_| Error::QueryFailure(format!("{} timed out", what)))
    }

    /// Suggested gas price scaled by the multiplier and capped
    pub async fn safe_gas_price(&self) -> Result<U256> {
        let suggested = self
            .timed("gas price query", self.backend.suggest_gas_price())
            .await?
            .map_err(|e| Error::QueryFailure(e.to_string()))?;
        let gas_price = self.gas.apply(U256::from(suggested));
        debug!(suggested = suggested, gas_price = %gas_price, "Computed gas price");
        Ok(gas_price)
    }

    /// Pending nonce of the signing identity
    pub async fn pending_nonce(&self) -> Result<u64> {
        self.timed("nonce query", self.backend.pending_nonce(self.key.address()))
            .await?
            .map_err(|e| Error::QueryFailure(e.to_string()))
    }

    /// Lock the transact options and refresh gas price and nonce
    ///
    /// The returned guard keeps other submissions from this identity waiting
    /// until it is dropped. On error the lock is released before returning.
    pub async fn lock_and_update_opts(&self) -> Result<MutexGuard<'_, TransactOpts>> {
        let mut opts = self.opts.lock().await;
        opts.gas_price = self.safe_gas_price().await?;
        opts.nonce = self.pending_nonce().await?;
        Ok(opts)
    }

    /// Build, sign and broadcast a call to `to` using `opts`
    pub async fn sign_and_send(
        &self,
        opts: &TransactOpts,
        to: Address,
        input: Bytes,
        gas_limit: u64,
    ) -> Result<B256> {
        let (fee_currency, gateway_fee_recipient, gateway_fee) = if self.eth_compatible {
            (None, None, U256::ZERO)
        } else {
            (
                opts.fee_currency,
                opts.gateway_fee_recipient,
                opts.gateway_fee,
            )
        };

        let tx = TxRequest {
            nonce: opts.nonce,
            to: Some(to),
            value: opts.value,
            gas_limit,
            gas_price: opts.gas_price,
            fee_currency,
            gateway_fee_recipient,
            gateway_fee,
            input,
            eth_compatible: self.eth_compatible,
        }
        .build()?;

        let raw = tx.raw_with_signature(&self.key, self.chain_id)?;
        let hash = self
            .timed("broadcast", self.backend.send_raw_transaction(raw.into()))
            .await?
            .map_err(|e| {
                let message = e.to_string();
                if classify_error(&message).is_transient() {
                    Error::TransientSubmission(message)
                } else {
                    Error::Broadcast(message)
                }
            })?;

        debug!(tx = %hash, nonce = opts.nonce, gas_price = %opts.gas_price, "Sent transaction");
        Ok(hash)
    }

    /// Send a call to `to` with the configured default gas limit
    ///
    /// Takes the options lock for the refresh and broadcast, like the
    /// proposal writers do, but makes a single attempt.
    pub async fn transact(&self, to: Address, input: Bytes) -> Result<B256> {
        let opts = self.lock_and_update_opts().await?;
        let gas_limit = opts.gas_limit;
        self.sign_and_send(&opts, to, input, gas_limit).await
    }

    /// Read-only contract call; `block` of `None` means latest
    pub async fn call_contract(
        &self,
        to: Address,
        data: Bytes,
        block: Option<u64>,
    ) -> Result<Bytes> {
        self.timed("contract call", self.backend.call(to, data, block))
            .await?
            .map_err(|e| Error::QueryFailure(e.to_string()))
    }

    /// Current chain head
    pub async fn latest_block(&self) -> Result<u64> {
        self.timed("block number query", self.backend.latest_block())
            .await?
            .map_err(|e| Error::QueryFailure(e.to_string()))
    }

    /// Handler contract registered on `bridge` for `resource_id`
    pub async fn resource_id_to_handler(&self, bridge: Address, resource_id: B256) -> Result<Address> {
        let out = self
            .call_contract(bridge, resource_handler_calldata(resource_id), None)
            .await?;
        decode_resource_handler(&out)
    }

    /// Deposit events emitted by `contract` between `from_block` and
    /// `to_block` inclusive. `event_signature` is the canonical signature
    /// string, e.g. `Deposit(uint8,bytes32,uint64)`.
    pub async fn fetch_deposit_logs(
        &self,
        contract: Address,
        event_signature: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<DepositLog>> {
        let topic = B256::from(keccak256(event_signature.as_bytes()));
        let logs = self
            .timed(
                "log query",
                self.backend.filter_logs(contract, topic, from_block, to_block),
            )
            .await?
            .map_err(|e| Error::QueryFailure(e.to_string()))?;

        let mut deposits = Vec::with_capacity(logs.len());
        for log in &logs {
            match DepositLog::from_log(log) {
                Ok(deposit) => deposits.push(deposit),
                Err(e) => {
                    warn!(error = %e, block = ?log.block_number, "Skipping malformed deposit log")
                }
            }
        }
        Ok(deposits)
    }

    /// Deposits from `from_block` up to the newest block with at least
    /// `confirmations` blocks on top of it. Returns the deposits and the
    /// last block scanned, or `None` when no block is confirmed yet.
    pub async fn fetch_confirmed_deposit_logs(
        &self,
        contract: Address,
        event_signature: &str,
        from_block: u64,
        confirmations: u64,
    ) -> Result<(Vec<DepositLog>, Option<u64>)> {
        let head = self.latest_block().await?;
        let to_block = match head.checked_sub(confirmations) {
            Some(to_block) if to_block >= from_block => to_block,
            _ => {
                debug!(
                    head = head,
                    from_block = from_block,
                    confirmations = confirmations,
                    "No confirmed blocks to scan"
                );
                return Ok((Vec::new(), None));
            }
        };
        let deposits = self
            .fetch_deposit_logs(contract, event_signature, from_block, to_block)
            .await?;
        Ok((deposits, Some(to_block)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::contract::DEPOSIT_EVENT_SIGNATURE;
    use crate::testing::MockNode;
    use crate::transaction::{CeloTransaction, Scheme};

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn client(node: MockNode) -> CeloClient<MockNode> {
        CeloClient::new(node, LocalKey::from_hex(TEST_KEY).unwrap(), 42_220)
    }

    #[test]
    fn test_gas_policy_multiplies_and_clamps() {
        let policy = GasPolicy {
            multiplier: 1.5,
            max_gas_price: U256::from(1_000u64),
        };
        assert_eq!(policy.apply(U256::from(100u64)), U256::from(150u64));
        assert_eq!(policy.apply(U256::from(1_000u64)), U256::from(1_000u64));

        let unit = GasPolicy {
            multiplier: 1.0,
            max_gas_price: U256::MAX,
        };
        assert_eq!(unit.apply(U256::from(123_456_789u64)), U256::from(123_456_789u64));
        // saturates instead of overflowing
        let big = GasPolicy {
            multiplier: 2.0,
            max_gas_price: U256::MAX,
        };
        assert!(big.apply(U256::MAX) <= U256::MAX);
    }

    #[test]
    fn test_gas_policy_keeps_small_multiplier_fractions() {
        let policy = GasPolicy {
            multiplier: 1.000_000_4,
            max_gas_price: U256::MAX,
        };
        assert_eq!(
            policy.apply(U256::from(1_000_000_000_000u64)),
            U256::from(1_000_000_400_000u64)
        );

        let tiny = GasPolicy {
            multiplier: 1e-7,
            max_gas_price: U256::MAX,
        };
        assert_eq!(tiny.apply(U256::from(1_000_000_000u64)), U256::from(100u64));
        assert_eq!(GasPolicy::scaled_multiplier(1e-19), 0);
    }

    #[tokio::test]
    async fn test_lock_and_update_opts_refreshes_from_node() {
        let node = MockNode::new();
        node.set_gas_price(2_000_000_000);
        node.set_pending_nonce(7);
        let client = client(node).with_gas_policy(GasPolicy {
            multiplier: 2.0,
            max_gas_price: U256::from(3_000_000_000u64),
        });

        let opts = client.lock_and_update_opts().await.unwrap();
        assert_eq!(opts.nonce, 7);
        assert_eq!(opts.gas_price, U256::from(3_000_000_000u64));
        drop(opts);

        // the lock is free again
        assert_eq!(client.opts().await.nonce, 7);
    }

    #[tokio::test]
    async fn test_lock_released_on_refresh_failure() {
        let node = MockNode::new();
        node.fail_next_gas_price("node unavailable");
        let client = client(node);

        let err = client.lock_and_update_opts().await.unwrap_err();
        assert!(matches!(err, Error::QueryFailure(_)));
        assert!(client.lock_and_update_opts().await.is_ok());
    }

    #[tokio::test]
    async fn test_sign_and_send_broadcasts_celo_layout() {
        let node = MockNode::new();
        let client = client(node);
        let opts = client.lock_and_update_opts().await.unwrap();
        let hash = client
            .sign_and_send(&opts, Address::repeat_byte(0x01), Bytes::from(vec![1, 2]), 100_000)
            .await
            .unwrap();
        drop(opts);

        let sent = client.backend().sent_transactions();
        assert_eq!(sent.len(), 1);
        let tx = CeloTransaction::decode(&sent[0]).unwrap();
        assert_eq!(tx.hash(), hash);
        assert!(!tx.is_eth_compatible());
        assert_eq!(tx.gas_limit(), 100_000);
        assert_eq!(
            Scheme::eip155(42_220).recover_sender(&tx).unwrap(),
            client.address()
        );
    }

    #[tokio::test]
    async fn test_eth_compatible_client_drops_fee_fields() {
        let node = MockNode::new();
        let client = client(node).with_eth_compatible(true);
        let mut opts = client.lock_and_update_opts().await.unwrap();
        opts.fee_currency = Some(Address::repeat_byte(0x0f));
        client
            .sign_and_send(&opts, Address::repeat_byte(0x01), Bytes::new(), 21_000)
            .await
            .unwrap();
        drop(opts);

        let tx = CeloTransaction::decode(&client.backend().sent_transactions()[0]).unwrap();
        assert!(tx.is_eth_compatible());
        assert!(tx.fee_currency().is_none());
    }

    #[tokio::test]
    async fn test_broadcast_errors_are_classified() {
        let node = MockNode::new();
        node.push_send_error("replacement transaction underpriced");
        node.push_send_error("execution reverted");
        let client = client(node);

        let opts = client.lock_and_update_opts().await.unwrap();
        let first = client
            .sign_and_send(&opts, Address::ZERO, Bytes::new(), 21_000)
            .await
            .unwrap_err();
        let second = client
            .sign_and_send(&opts, Address::ZERO, Bytes::new(), 21_000)
            .await
            .unwrap_err();
        assert!(matches!(first, Error::TransientSubmission(_)));
        assert!(matches!(second, Error::Broadcast(_)));
    }

    #[tokio::test]
    async fn test_fetch_deposit_logs_decodes_topics() {
        let node = MockNode::new();
        let bridge = Address::repeat_byte(0x0b);
        node.emit_deposit(bridge, 3, B256::repeat_byte(0x0a), 11, 100);
        node.emit_deposit(bridge, 4, B256::repeat_byte(0x0c), 12, 250);
        let client = client(node);

        let logs = client
            .fetch_deposit_logs(bridge, DEPOSIT_EVENT_SIGNATURE, 0, 200)
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].destination_id, 3);
        assert_eq!(logs[0].resource_id, B256::repeat_byte(0x0a));
        assert_eq!(logs[0].deposit_nonce, 11);
        assert_eq!(logs[0].block_number, Some(100));
    }

    #[tokio::test]
    async fn test_resource_handler_lookup() {
        let node = MockNode::new();
        let bridge = Address::repeat_byte(0x0b);
        node.register_handler(B256::repeat_byte(0x01), Address::repeat_byte(0x0e));
        let client = client(node);

        let handler = client
            .resource_id_to_handler(bridge, B256::repeat_byte(0x01))
            .await
            .unwrap();
        assert_eq!(handler, Address::repeat_byte(0x0e));
        let missing = client
            .resource_id_to_handler(bridge, B256::repeat_byte(0x02))
            .await
            .unwrap();
        assert_eq!(missing, Address::ZERO);
    }

    #[tokio::test]
    async fn test_transact_uses_configured_gas_limit() {
        let node = MockNode::new();
        node.set_pending_nonce(4);
        let client = client(node);

        let hash = client
            .transact(Address::repeat_byte(0x02), Bytes::from(vec![0xab]))
            .await
            .unwrap();
        let tx = CeloTransaction::decode(&client.backend().sent_transactions()[0]).unwrap();
        assert_eq!(tx.hash(), hash);
        assert_eq!(tx.gas_limit(), DEFAULT_GAS_LIMIT);
        assert_eq!(tx.nonce(), 4);
    }

    #[tokio::test]
    async fn test_confirmed_deposits_respect_confirmations() {
        let node = MockNode::new();
        let bridge = Address::repeat_byte(0x0b);
        node.emit_deposit(bridge, 1, B256::repeat_byte(0x0a), 1, 5);
        node.emit_deposit(bridge, 1, B256::repeat_byte(0x0a), 2, 15);
        node.set_latest_block(20);
        let client = client(node.clone());

        let (deposits, last) = client
            .fetch_confirmed_deposit_logs(bridge, DEPOSIT_EVENT_SIGNATURE, 0, 10)
            .await
            .unwrap();
        assert_eq!(last, Some(10));
        assert_eq!(deposits.len(), 1);
        assert_eq!(deposits[0].deposit_nonce, 1);

        let (deposits, last) = client
            .fetch_confirmed_deposit_logs(bridge, DEPOSIT_EVENT_SIGNATURE, 11, 10)
            .await
            .unwrap();
        assert!(deposits.is_empty());
        assert_eq!(last, None);

        node.set_latest_block(3);
        let (_, last) = client
            .fetch_confirmed_deposit_logs(bridge, DEPOSIT_EVENT_SIGNATURE, 0, 10)
            .await
            .unwrap();
        assert_eq!(last, None);
    }

    #[tokio::test]
    async fn test_latest_block() {
        let node = MockNode::new();
        node.set_latest_block(1_234);
        assert_eq!(client(node).latest_block().await.unwrap(), 1_234);
    }

    #[tokio::test]
    async fn test_request_timeout_is_query_failure() {
        let node = MockNode::new();
        node.set_send_delay(Duration::from_millis(50));
        let client = client(node).with_request_timeout(Duration::from_millis(5));
        let opts = client.lock_and_update_opts().await.unwrap();
        let err = client
            .sign_and_send(&opts, Address::ZERO, Bytes::new(), 21_000)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QueryFailure(_)));
    }

    #[test]
    fn test_deposit_log_requires_topics() {
        let log = LogEntry {
            address: Address::ZERO,
            topics: vec![B256::ZERO],
            data: Bytes::new(),
            block_number: None,
        };
        assert!(DepositLog::from_log(&log).is_err());
    }
}
