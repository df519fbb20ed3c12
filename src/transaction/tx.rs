//! Celo transaction data model and RLP codec
//!
//! A Celo transaction extends the legacy Ethereum layout with three fee
//! fields placed between the gas limit and the recipient:
//!
//! ```text
//! extended (12): [nonce, gasPrice, gas, feeCurrency, gatewayFeeRecipient, gatewayFee, to, value, input, v, r, s]
//! eth-compat (9): [nonce, gasPrice, gas,                                            to, value, input, v, r, s]
//! ```
//!
//! Which layout is written depends only on the transaction's compatibility
//! flag; which layout is read depends only on the number of list elements.
//!
//! ## Caching and aliasing
//!
//! The transaction hash and the recovered sender are computed once and cached
//! per instance. Signing never mutates an existing instance: [`CeloTransaction::with_signature_values`]
//! and [`CeloTransaction::with_signature`] return a fresh value with empty
//! caches, so holders of the unsigned transaction keep seeing the unsigned
//! hash and the latest signed instance always carries its own signature.

use std::sync::{Mutex, OnceLock};

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rlp::{BufMut, Decodable, Encodable, Header, EMPTY_STRING_CODE};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::hash::keccak256;
use crate::transaction::keys::LocalKey;
use crate::transaction::signer::{sign_tx, Scheme};

/// Number of list elements in an Ethereum-compatible encoding
pub const ETH_COMPATIBLE_FIELDS: usize = 9;
/// Number of list elements in a full Celo encoding
pub const CELO_FIELDS: usize = 12;

/// Recovered sender together with the scheme that recovered it
#[derive(Debug, Clone, Copy)]
pub(crate) struct SenderCache {
    pub scheme: Scheme,
    pub from: Address,
}

/// Transaction fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct TxData {
    nonce: u64,
    gas_price: U256,
    gas_limit: u64,
    /// `None` pays fees in the native currency
    fee_currency: Option<Address>,
    /// `None` means no gateway fee is paid
    gateway_fee_recipient: Option<Address>,
    gateway_fee: U256,
    /// `None` means contract creation
    to: Option<Address>,
    value: U256,
    input: Bytes,
    v: U256,
    r: U256,
    s: U256,
    eth_compatible: bool,
}

/// Parameters for building an unsigned transaction
///
/// Amount fields default to zero, addresses to `None`.
#[derive(Debug, Clone, Default)]
pub struct TxRequest {
    pub nonce: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub gas_limit: u64,
    pub gas_price: U256,
    pub fee_currency: Option<Address>,
    pub gateway_fee_recipient: Option<Address>,
    pub gateway_fee: U256,
    pub input: Bytes,
    pub eth_compatible: bool,
}

impl TxRequest {
    /// Build the unsigned transaction, rejecting Celo-only fee fields in
    /// compatibility mode.
    pub fn build(self) -> Result<CeloTransaction> {
        let tx = CeloTransaction::from_data(TxData {
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            fee_currency: self.fee_currency,
            gateway_fee_recipient: self.gateway_fee_recipient,
            gateway_fee: self.gateway_fee,
            to: self.to,
            value: self.value,
            input: self.input,
            eth_compatible: self.eth_compatible,
            ..Default::default()
        });
        tx.check_compatibility()?;
        Ok(tx)
    }
}

/// A Celo transaction, signed or unsigned
pub struct CeloTransaction {
    data: TxData,
    hash: OnceLock<B256>,
    from: Mutex<Option<SenderCache>>,
}

impl CeloTransaction {
    /// Create an unsigned transaction in the full Celo layout
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        nonce: u64,
        to: Address,
        value: U256,
        gas_limit: u64,
        gas_price: U256,
        fee_currency: Option<Address>,
        gateway_fee_recipient: Option<Address>,
        gateway_fee: U256,
        input: impl Into<Bytes>,
    ) -> Self {
        Self::from_data(TxData {
            nonce,
            gas_price,
            gas_limit,
            fee_currency,
            gateway_fee_recipient,
            gateway_fee,
            to: Some(to),
            value,
            input: input.into(),
            ..Default::default()
        })
    }

    /// Create an unsigned transaction in the Ethereum-compatible layout
    pub fn new_eth_compatible(
        nonce: u64,
        to: Address,
        value: U256,
        gas_limit: u64,
        gas_price: U256,
        input: impl Into<Bytes>,
    ) -> Self {
        Self::from_data(TxData {
            nonce,
            gas_price,
            gas_limit,
            to: Some(to),
            value,
            input: input.into(),
            eth_compatible: true,
            ..Default::default()
        })
    }

    fn from_data(data: TxData) -> Self {
        Self {
            data,
            hash: OnceLock::new(),
            from: Mutex::new(None),
        }
    }

    pub fn nonce(&self) -> u64 {
        self.data.nonce
    }

    pub fn gas_price(&self) -> U256 {
        self.data.gas_price
    }

    pub fn gas_limit(&self) -> u64 {
        self.data.gas_limit
    }

    pub fn fee_currency(&self) -> Option<Address> {
        self.data.fee_currency
    }

    pub fn gateway_fee_recipient(&self) -> Option<Address> {
        self.data.gateway_fee_recipient
    }

    pub fn gateway_fee(&self) -> U256 {
        self.data.gateway_fee
    }

    /// Recipient, `None` for contract creation
    pub fn to(&self) -> Option<Address> {
        self.data.to
    }

    pub fn value(&self) -> U256 {
        self.data.value
    }

    pub fn input(&self) -> &Bytes {
        &self.data.input
    }

    pub fn is_eth_compatible(&self) -> bool {
        self.data.eth_compatible
    }

    /// Raw signature values as `(v, r, s)`
    pub fn raw_signature_values(&self) -> (U256, U256, U256) {
        (self.data.v, self.data.r, self.data.s)
    }

    /// Whether the signature binds a chain id (EIP-155)
    pub fn is_protected(&self) -> bool {
        is_protected_v(&self.data.v)
    }

    /// Chain id encoded in `v`, zero for unprotected signatures
    pub fn chain_id(&self) -> U256 {
        derive_chain_id(&self.data.v)
    }

    /// Return an unsigned copy carrying a new nonce and gas price, ready to
    /// be signed again
    pub fn repriced(&self, nonce: u64, gas_price: U256) -> Self {
        Self::from_data(TxData {
            nonce,
            gas_price,
            v: U256::ZERO,
            r: U256::ZERO,
            s: U256::ZERO,
            ..self.data.clone()
        })
    }

    /// Return a copy carrying the given signature values
    pub fn with_signature_values(&self, r: U256, s: U256, v: U256) -> Self {
        Self::from_data(TxData {
            r,
            s,
            v,
            ..self.data.clone()
        })
    }

    /// Attach a 65-byte `[R || S || recovery id]` signature produced over
    /// `scheme.signing_hash(self)`.
    pub fn with_signature(&self, scheme: &Scheme, sig: &[u8; 65]) -> Result<Self> {
        let (r, s, v) = scheme.signature_values(sig)?;
        Ok(self.with_signature_values(r, s, v))
    }

    /// Sign with EIP-155 for `chain_id` and return the wire encoding
    pub fn raw_with_signature(&self, key: &LocalKey, chain_id: u64) -> Result<Vec<u8>> {
        let signed = sign_tx(self, &Scheme::eip155(chain_id), key)?;
        signed.encode()
    }

    /// Fail if compatibility mode is set together with any Celo-only field
    pub fn check_compatibility(&self) -> Result<()> {
        if self.data.eth_compatible
            && (self.data.fee_currency.is_some()
                || self.data.gateway_fee_recipient.is_some()
                || !self.data.gateway_fee.is_zero())
        {
            return Err(Error::IncompatibleFields);
        }
        Ok(())
    }

    /// Transaction hash: keccak256 of the signed encoding (cached)
    pub fn hash(&self) -> B256 {
        *self
            .hash
            .get_or_init(|| B256::from(keccak256(&self.rlp_list(Suffix::Signature))))
    }

    /// Wire encoding in the layout selected by the compatibility flag
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.check_compatibility()?;
        Ok(self.rlp_list(Suffix::Signature))
    }

    /// Length of the wire encoding in bytes
    pub fn encoded_len(&self) -> usize {
        let payload_length = self.rlp_payload(Suffix::Signature).len();
        Header {
            list: true,
            payload_length,
        }
        .length()
            + payload_length
    }

    /// Decode a transaction, selecting the layout from the element count
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut buf = bytes;
        let header = Header::decode(&mut buf)?;
        if !header.list {
            return Err(Error::MalformedEncoding(
                "transaction is not an RLP list".to_string(),
            ));
        }
        if buf.len() != header.payload_length {
            return Err(Error::MalformedEncoding(format!(
                "list payload is {} bytes but {} remain",
                header.payload_length,
                buf.len()
            )));
        }

        let fields = count_items(buf)?;
        let eth_compatible = match fields {
            ETH_COMPATIBLE_FIELDS => true,
            CELO_FIELDS => false,
            n => {
                return Err(Error::MalformedEncoding(format!(
                    "expected {} or {} fields, got {}",
                    ETH_COMPATIBLE_FIELDS, CELO_FIELDS, n
                )))
            }
        };

        let mut data = TxData {
            eth_compatible,
            ..Default::default()
        };
        data.nonce = u64::decode(&mut buf)?;
        data.gas_price = U256::decode(&mut buf)?;
        data.gas_limit = u64::decode(&mut buf)?;
        if !eth_compatible {
            data.fee_currency = decode_optional_address(&mut buf)?;
            data.gateway_fee_recipient = decode_optional_address(&mut buf)?;
            data.gateway_fee = U256::decode(&mut buf)?;
        }
        data.to = decode_optional_address(&mut buf)?;
        data.value = U256::decode(&mut buf)?;
        data.input = Bytes::decode(&mut buf)?;
        data.v = U256::decode(&mut buf)?;
        data.r = U256::decode(&mut buf)?;
        data.s = U256::decode(&mut buf)?;

        Ok(Self::from_data(data))
    }

    pub(crate) fn cached_sender(&self, scheme: &Scheme) -> Option<Address> {
        let cache = self.from.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .as_ref()
            .filter(|c| c.scheme.equals(scheme))
            .map(|c| c.from)
    }

    pub(crate) fn store_sender(&self, scheme: Scheme, from: Address) {
        let mut cache = self.from.lock().unwrap_or_else(|e| e.into_inner());
        *cache = Some(SenderCache { scheme, from });
    }

    /// RLP list payload in this transaction's layout followed by `suffix`
    pub(crate) fn rlp_payload(&self, suffix: Suffix) -> Vec<u8> {
        let d = &self.data;
        let mut out = Vec::with_capacity(128 + d.input.len());
        d.nonce.encode(&mut out);
        d.gas_price.encode(&mut out);
        d.gas_limit.encode(&mut out);
        if !d.eth_compatible {
            encode_optional_address(&d.fee_currency, &mut out);
            encode_optional_address(&d.gateway_fee_recipient, &mut out);
            d.gateway_fee.encode(&mut out);
        }
        encode_optional_address(&d.to, &mut out);
        d.value.encode(&mut out);
        d.input.encode(&mut out);
        match suffix {
            Suffix::Signature => {
                d.v.encode(&mut out);
                d.r.encode(&mut out);
                d.s.encode(&mut out);
            }
            Suffix::ChainId(chain_id) => {
                chain_id.encode(&mut out);
                0u8.encode(&mut out);
                0u8.encode(&mut out);
            }
            Suffix::Unsigned => {}
        }
        out
    }

    pub(crate) fn rlp_list(&self, suffix: Suffix) -> Vec<u8> {
        let payload = self.rlp_payload(suffix);
        let mut out = Vec::with_capacity(payload.len() + 9);
        Header {
            list: true,
            payload_length: payload.len(),
        }
        .encode(&mut out);
        out.extend_from_slice(&payload);
        out
    }
}

/// Trailing list elements after the common fields
#[derive(Debug, Clone, Copy)]
pub(crate) enum Suffix {
    /// `v, r, s`: the wire and hash encoding
    Signature,
    /// `chainId, 0, 0`: the EIP-155 signing preimage
    ChainId(u64),
    /// Nothing: the pre-EIP-155 signing preimage
    Unsigned,
}

impl Clone for CeloTransaction {
    fn clone(&self) -> Self {
        let cloned = Self::from_data(self.data.clone());
        if let Some(hash) = self.hash.get() {
            let _ = cloned.hash.set(*hash);
        }
        if let Some(cache) = *self.from.lock().unwrap_or_else(|e| e.into_inner()) {
            cloned.store_sender(cache.scheme, cache.from);
        }
        cloned
    }
}

impl PartialEq for CeloTransaction {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for CeloTransaction {}

impl std::fmt::Debug for CeloTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CeloTransaction")
            .field("nonce", &self.data.nonce)
            .field("gas_price", &self.data.gas_price)
            .field("gas_limit", &self.data.gas_limit)
            .field("fee_currency", &self.data.fee_currency)
            .field("gateway_fee_recipient", &self.data.gateway_fee_recipient)
            .field("gateway_fee", &self.data.gateway_fee)
            .field("to", &self.data.to)
            .field("value", &self.data.value)
            .field("input", &self.data.input)
            .field("v", &self.data.v)
            .field("r", &self.data.r)
            .field("s", &self.data.s)
            .field("eth_compatible", &self.data.eth_compatible)
            .finish()
    }
}

/// JSON view, field names follow the node's RPC representation
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TxJson<'a> {
    nonce: u64,
    gas_price: U256,
    gas: u64,
    fee_currency: Option<Address>,
    gateway_fee_recipient: Option<Address>,
    gateway_fee: U256,
    to: Option<Address>,
    value: U256,
    input: &'a Bytes,
    v: U256,
    r: U256,
    s: U256,
    hash: B256,
    eth_compatible: bool,
}

impl Serialize for CeloTransaction {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let d = &self.data;
        TxJson {
            nonce: d.nonce,
            gas_price: d.gas_price,
            gas: d.gas_limit,
            fee_currency: d.fee_currency,
            gateway_fee_recipient: d.gateway_fee_recipient,
            gateway_fee: d.gateway_fee,
            to: d.to,
            value: d.value,
            input: &d.input,
            v: d.v,
            r: d.r,
            s: d.s,
            hash: self.hash(),
            eth_compatible: d.eth_compatible,
        }
        .serialize(serializer)
    }
}

/// `v` of 27 or 28 is a pre-EIP-155 signature
pub(crate) fn is_protected_v(v: &U256) -> bool {
    if v.bit_len() <= 8 {
        let v = v.to::<u64>();
        return v != 27 && v != 28;
    }
    true
}

/// Derive the chain id from a signature's `v` value
///
/// Returns zero for unprotected (`27`/`28`) signatures, `(v - 35) / 2`
/// otherwise.
pub fn derive_chain_id(v: &U256) -> U256 {
    if v.bit_len() <= 64 {
        let v = v.to::<u64>();
        if v == 27 || v == 28 {
            return U256::ZERO;
        }
        return U256::from(v.saturating_sub(35) / 2);
    }
    (*v - U256::from(35)) / U256::from(2)
}

fn encode_optional_address(addr: &Option<Address>, out: &mut dyn BufMut) {
    match addr {
        Some(a) => a.encode(out),
        None => out.put_u8(EMPTY_STRING_CODE),
    }
}

fn decode_optional_address(buf: &mut &[u8]) -> Result<Option<Address>> {
    match buf.first() {
        Some(&EMPTY_STRING_CODE) => {
            *buf = &buf[1..];
            Ok(None)
        }
        Some(_) => Ok(Some(Address::decode(buf)?)),
        None => Err(Error::MalformedEncoding(
            "unexpected end of transaction list".to_string(),
        )),
    }
}

/// Count the top-level items of an RLP list payload
fn count_items(mut payload: &[u8]) -> Result<usize> {
    let mut count = 0;
    while !payload.is_empty() {
        let item = Header::decode(&mut payload)?;
        if payload.len() < item.payload_length {
            return Err(Error::MalformedEncoding(
                "truncated list element".to_string(),
            ));
        }
        payload = &payload[item.payload_length..];
        count += 1;
    }
    Ok(count)
}
