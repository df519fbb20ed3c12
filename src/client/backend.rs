//! Remote node interface
//!
//! [`ChainBackend`] is the narrow set of JSON-RPC calls the adapter consumes.
//! [`RpcBackend`] implements it over an alloy HTTP provider; tests use the
//! in-memory node in [`crate::testing`].

use alloy::{
    eips::BlockId,
    primitives::{Address, Bytes, B256},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::{Filter, TransactionRequest},
    transports::http::{Client, Http},
};
use async_trait::async_trait;
use eyre::{eyre, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Log record returned by [`ChainBackend::filter_logs`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
}

/// Node calls consumed by the chain client
#[async_trait]
pub trait ChainBackend: Send + Sync {
    /// Nonce for the next transaction of `address`, counting pending ones
    async fn pending_nonce(&self, address: Address) -> Result<u64>;

    /// Gas price the node suggests for timely inclusion
    async fn suggest_gas_price(&self) -> Result<u128>;

    /// Execute a read-only call; `block` of `None` means latest
    async fn call(&self, to: Address, data: Bytes, block: Option<u64>) -> Result<Bytes>;

    /// Broadcast a signed, encoded transaction and return its hash
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256>;

    /// Logs emitted by `address` with `topic` as topic 0, in `[from, to]`
    async fn filter_logs(
        &self,
        address: Address,
        topic: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LogEntry>>;

    /// Current chain head
    async fn latest_block(&self) -> Result<u64>;
}

/// JSON-RPC backend over HTTP
pub struct RpcBackend {
    provider: RootProvider<Http<Client>>,
    rpc_url: String,
}

impl RpcBackend {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let provider = ProviderBuilder::new().on_http(
            rpc_url
                .parse()
                .map_err(|e| eyre!("Invalid RPC URL: {}", e))?,
        );

        info!(rpc_url = %rpc_url, "Created Celo RPC backend");

        Ok(Self {
            provider,
            rpc_url: rpc_url.to_string(),
        })
    }

    /// Connect to the first URL whose node answers a chain id query.
    /// Returns the backend and the reported chain id.
    pub async fn connect_first(urls: &[String]) -> Result<(Self, u64)> {
        if urls.is_empty() {
            return Err(eyre!("At least one RPC URL is required"));
        }
        let mut last_error = None;
        for url in urls {
            let backend = match Self::new(url) {
                Ok(backend) => backend,
                Err(e) => {
                    warn!(rpc_url = %url, error = %e, "Skipping invalid RPC URL");
                    last_error = Some(e);
                    continue;
                }
            };
            match backend.chain_id().await {
                Ok(chain_id) => return Ok((backend, chain_id)),
                Err(e) => {
                    warn!(rpc_url = %url, error = %e, "RPC endpoint unavailable, trying next");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| eyre!("No RPC endpoint available")))
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Chain id reported by the node
    pub async fn chain_id(&self) -> Result<u64> {
        Ok(self.provider.get_chain_id().await?)
    }
}

#[async_trait]
impl ChainBackend for RpcBackend {
    async fn pending_nonce(&self, address: Address) -> Result<u64> {
        let nonce = self
            .provider
            .get_transaction_count(address)
            .pending()
            .await?;
        Ok(nonce)
    }

    async fn suggest_gas_price(&self) -> Result<u128> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn call(&self, to: Address, data: Bytes, block: Option<u64>) -> Result<Bytes> {
        let request = TransactionRequest::default().to(to).input(data.into());
        let block = block.map(BlockId::number).unwrap_or_else(BlockId::latest);
        let out = self.provider.call(&request).block(block).await?;
        Ok(out)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256> {
        let pending = self.provider.send_raw_transaction(&raw).await?;
        let hash = *pending.tx_hash();
        debug!(tx = %hash, "Broadcast raw transaction");
        Ok(hash)
    }

    async fn filter_logs(
        &self,
        address: Address,
        topic: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LogEntry>> {
        let filter = Filter::new()
            .address(address)
            .event_signature(topic)
            .from_block(from_block)
            .to_block(to_block);

        let logs = self.provider.get_logs(&filter).await?;
        Ok(logs
            .into_iter()
            .map(|log| LogEntry {
                address: log.address(),
                topics: log.topics().to_vec(),
                data: log.data().data.clone(),
                block_number: log.block_number,
            })
            .collect())
    }

    async fn latest_block(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?)
    }
}
