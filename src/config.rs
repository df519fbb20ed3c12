//! Adapter configuration
//!
//! All settings come from `CELO_*` environment variables, optionally seeded
//! from a `.env` file. The resulting [`CeloConfig`] is passed explicitly to
//! constructors; nothing here is process-global.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use alloy_primitives::{Address, U256};
use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use url::Url;

use crate::client::GasPolicy;
use crate::transaction::LocalKey;

/// Gas limit used when none is configured
pub const DEFAULT_GAS_LIMIT: u64 = 6_721_975;

/// Gas price ceiling used when none is configured (20 gwei)
pub const DEFAULT_GAS_PRICE: u128 = 20_000_000_000;

/// Celo chain configuration
#[derive(Clone, Deserialize)]
pub struct CeloConfig {
    pub rpc_url: String,
    /// Additional RPC URLs (tried in order when the primary fails)
    #[serde(default)]
    pub rpc_fallback_urls: Vec<String>,
    pub chain_id: u64,
    pub bridge_address: String,
    #[serde(default)]
    pub erc20_handler: Option<String>,
    pub private_key: String,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default = "default_max_gas_price")]
    pub max_gas_price: u128,
    #[serde(default = "default_gas_multiplier")]
    pub gas_multiplier: f64,
    #[serde(default)]
    pub start_block: u64,
    #[serde(default = "default_block_confirmations")]
    pub block_confirmations: u64,
    /// Encode transactions in the 9-field Ethereum layout
    #[serde(default)]
    pub eth_compatible: bool,
    #[serde(default)]
    pub fee_currency: Option<String>,
    #[serde(default)]
    pub gateway_fee_recipient: Option<String>,
    #[serde(default)]
    pub gateway_fee: u128,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

/// Custom Debug that redacts private_key to prevent accidental log leakage.
impl fmt::Debug for CeloConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CeloConfig")
            .field("rpc_url", &self.rpc_url)
            .field("rpc_fallback_urls", &self.rpc_fallback_urls)
            .field("chain_id", &self.chain_id)
            .field("bridge_address", &self.bridge_address)
            .field("erc20_handler", &self.erc20_handler)
            .field("private_key", &"<redacted>")
            .field("gas_limit", &self.gas_limit)
            .field("max_gas_price", &self.max_gas_price)
            .field("gas_multiplier", &self.gas_multiplier)
            .field("start_block", &self.start_block)
            .field("block_confirmations", &self.block_confirmations)
            .field("eth_compatible", &self.eth_compatible)
            .field("fee_currency", &self.fee_currency)
            .field("gateway_fee_recipient", &self.gateway_fee_recipient)
            .field("gateway_fee", &self.gateway_fee)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_interval_ms", &self.retry_interval_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

fn default_gas_limit() -> u64 {
    DEFAULT_GAS_LIMIT
}

fn default_max_gas_price() -> u128 {
    DEFAULT_GAS_PRICE
}

fn default_gas_multiplier() -> f64 {
    1.0
}

fn default_block_confirmations() -> u64 {
    10
}

fn default_retry_attempts() -> u32 {
    10
}

fn default_retry_interval() -> u64 {
    2000
}

fn default_request_timeout() -> u64 {
    30_000
}

/// Split a comma-separated URL list, dropping empty entries
pub fn parse_rpc_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl CeloConfig {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env")
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from a key/value map using the same variable names as the
    /// environment
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| eyre!("{} environment variable is required", key))
        };
        fn parsed<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T>
        where
            T::Err: fmt::Display,
        {
            match value {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|e| eyre!("{} is invalid: {}", key, e)),
                None => Ok(default),
            }
        }

        let rpc_urls = parse_rpc_urls(&required("CELO_RPC_URL")?);
        if rpc_urls.is_empty() {
            return Err(eyre!("CELO_RPC_URL cannot be empty"));
        }

        let bridge_address = lookup("CELO_BRIDGE_ADDRESS")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| eyre!("must provide bridge address (CELO_BRIDGE_ADDRESS)"))?;

        let config = CeloConfig {
            rpc_url: rpc_urls[0].clone(),
            rpc_fallback_urls: rpc_urls[1..].to_vec(),
            chain_id: required("CELO_CHAIN_ID")?
                .trim()
                .parse()
                .wrap_err("CELO_CHAIN_ID must be a valid u64")?,
            bridge_address,
            erc20_handler: lookup("CELO_ERC20_HANDLER"),
            private_key: required("CELO_PRIVATE_KEY")?,
            gas_limit: parsed("CELO_GAS_LIMIT", lookup("CELO_GAS_LIMIT"), default_gas_limit())?,
            max_gas_price: parsed(
                "CELO_MAX_GAS_PRICE",
                lookup("CELO_MAX_GAS_PRICE"),
                default_max_gas_price(),
            )?,
            gas_multiplier: parsed(
                "CELO_GAS_MULTIPLIER",
                lookup("CELO_GAS_MULTIPLIER"),
                default_gas_multiplier(),
            )?,
            start_block: parsed("CELO_START_BLOCK", lookup("CELO_START_BLOCK"), 0)?,
            block_confirmations: parsed(
                "CELO_BLOCK_CONFIRMATIONS",
                lookup("CELO_BLOCK_CONFIRMATIONS"),
                default_block_confirmations(),
            )?,
            eth_compatible: parsed("CELO_ETH_COMPATIBLE", lookup("CELO_ETH_COMPATIBLE"), false)?,
            fee_currency: lookup("CELO_FEE_CURRENCY"),
            gateway_fee_recipient: lookup("CELO_GATEWAY_FEE_RECIPIENT"),
            gateway_fee: parsed("CELO_GATEWAY_FEE", lookup("CELO_GATEWAY_FEE"), 0)?,
            retry_attempts: parsed(
                "CELO_TX_RETRY_LIMIT",
                lookup("CELO_TX_RETRY_LIMIT"),
                default_retry_attempts(),
            )?,
            retry_interval_ms: parsed(
                "CELO_TX_RETRY_INTERVAL_MS",
                lookup("CELO_TX_RETRY_INTERVAL_MS"),
                default_retry_interval(),
            )?,
            request_timeout_ms: parsed(
                "CELO_RPC_TIMEOUT_MS",
                lookup("CELO_RPC_TIMEOUT_MS"),
                default_request_timeout(),
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// All RPC URLs: primary followed by fallbacks.
    pub fn all_rpc_urls(&self) -> Vec<String> {
        let mut urls = vec![self.rpc_url.clone()];
        urls.extend(self.rpc_fallback_urls.iter().cloned());
        urls
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for rpc_url in self.all_rpc_urls() {
            let parsed = Url::parse(&rpc_url)
                .wrap_err_with(|| format!("Invalid RPC URL: {}", rpc_url))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(eyre!("RPC URL must be http(s): {}", rpc_url));
            }
        }

        self.bridge_address()?;
        self.erc20_handler()?;
        self.fee_currency()?;
        self.gateway_fee_recipient()?;

        LocalKey::from_hex(&self.private_key).map_err(|e| eyre!("private_key: {}", e))?;

        if !self.gas_multiplier.is_finite() || self.gas_multiplier <= 0.0 {
            return Err(eyre!("gas_multiplier must be a positive number"));
        }
        if GasPolicy::scaled_multiplier(self.gas_multiplier) == 0 {
            return Err(eyre!(
                "gas_multiplier {} is too small, it would price every transaction at zero",
                self.gas_multiplier
            ));
        }

        if self.gas_limit == 0 {
            return Err(eyre!("gas_limit must be non-zero"));
        }

        if self.retry_attempts == 0 {
            return Err(eyre!("retry_attempts must be at least 1"));
        }

        if self.eth_compatible
            && (self.fee_currency.is_some()
                || self.gateway_fee_recipient.is_some()
                || self.gateway_fee != 0)
        {
            return Err(eyre!(
                "eth_compatible cannot be combined with fee_currency, gateway_fee_recipient or gateway_fee"
            ));
        }

        Ok(())
    }

    pub fn bridge_address(&self) -> Result<Address> {
        parse_address("bridge_address", &self.bridge_address)
    }

    pub fn erc20_handler(&self) -> Result<Option<Address>> {
        parse_optional_address("erc20_handler", &self.erc20_handler)
    }

    pub fn fee_currency(&self) -> Result<Option<Address>> {
        parse_optional_address("fee_currency", &self.fee_currency)
    }

    pub fn gateway_fee_recipient(&self) -> Result<Option<Address>> {
        parse_optional_address("gateway_fee_recipient", &self.gateway_fee_recipient)
    }

    pub fn gateway_fee(&self) -> U256 {
        U256::from(self.gateway_fee)
    }

    pub fn max_gas_price(&self) -> U256 {
        U256::from(self.max_gas_price)
    }
}

fn parse_address(name: &str, value: &str) -> Result<Address> {
    let trimmed = value.trim();
    if trimmed.len() != 42 || !trimmed.starts_with("0x") {
        return Err(eyre!(
            "{} must be a valid hex address (42 chars with 0x prefix)",
            name
        ));
    }
    Address::from_str(trimmed).map_err(|e| eyre!("{} is not a valid address: {}", name, e))
}

fn parse_optional_address(name: &str, value: &Option<String>) -> Result<Option<Address>> {
    value.as_deref().map(|v| parse_address(name, v)).transpose()
}
