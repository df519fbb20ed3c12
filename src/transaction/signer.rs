//! Transaction signature schemes
//!
//! Three interchangeable schemes share one capability set: compute the hash
//! to sign, turn a raw signature into `(r, s, v)`, and recover the sender.
//!
//! - **Frontier**: signs over the unsigned field list, `v = 27 + recovery id`
//! - **Homestead**: same hash and `v`, but rejects high-S signatures
//! - **EIP-155**: appends `(chainId, 0, 0)` to the signed list and encodes
//!   the chain id into `v = recovery id + 35 + 2 * chainId`

use alloy_primitives::{Address, B256, U256};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::hash::keccak256;
use crate::transaction::keys::LocalKey;
use crate::transaction::tx::{CeloTransaction, Suffix};

/// secp256k1 group order `n`
const SECP256K1_N: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe,
    0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36, 0x41, 0x41,
];

/// Signature scheme used to sign and recover transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "scheme", rename_all = "lowercase")]
pub enum Scheme {
    Frontier,
    Homestead,
    Eip155 { chain_id: u64 },
}

impl Scheme {
    /// EIP-155 scheme bound to `chain_id`
    pub fn eip155(chain_id: u64) -> Self {
        Scheme::Eip155 { chain_id }
    }

    /// Pick the scheme a chain enforces from its activated forks
    pub fn for_forks(chain_id: u64, eip155: bool, homestead: bool) -> Self {
        match (eip155, homestead) {
            (true, _) => Scheme::eip155(chain_id),
            (false, true) => Scheme::Homestead,
            (false, false) => Scheme::Frontier,
        }
    }

    /// Chain id the scheme protects against replay on, if any
    pub fn chain_id(&self) -> Option<u64> {
        match self {
            Scheme::Eip155 { chain_id } => Some(*chain_id),
            _ => None,
        }
    }

    /// Whether two schemes sign and recover identically
    pub fn equals(&self, other: &Scheme) -> bool {
        self == other
    }

    /// Hash to be signed. It does not uniquely identify the transaction.
    pub fn signing_hash(&self, tx: &CeloTransaction) -> B256 {
        let preimage = match self {
            Scheme::Frontier | Scheme::Homestead => tx.rlp_list(Suffix::Unsigned),
            Scheme::Eip155 { chain_id } => tx.rlp_list(Suffix::ChainId(*chain_id)),
        };
        B256::from(keccak256(&preimage))
    }

    /// Split a `[R || S || V]` signature (V being the recovery id 0 or 1)
    /// into the `(r, s, v)` values stored on the transaction.
    pub fn signature_values(&self, sig: &[u8; 65]) -> Result<(U256, U256, U256)> {
        let recovery_id = sig[64];
        if recovery_id > 1 {
            return Err(Error::InvalidSignature);
        }
        let r = U256::from_be_slice(&sig[..32]);
        let s = U256::from_be_slice(&sig[32..64]);
        let v = match self {
            Scheme::Eip155 { chain_id } if *chain_id != 0 => {
                U256::from(recovery_id) + U256::from(35u64) + U256::from(*chain_id) * U256::from(2u64)
            }
            _ => U256::from(recovery_id + 27),
        };
        Ok((r, s, v))
    }

    /// Recover the sender address from the transaction's signature
    pub fn recover_sender(&self, tx: &CeloTransaction) -> Result<Address> {
        let (v, r, s) = tx.raw_signature_values();
        match self {
            Scheme::Frontier => recover_plain(self.signing_hash(tx), r, s, v, false),
            Scheme::Homestead => recover_plain(self.signing_hash(tx), r, s, v, true),
            Scheme::Eip155 { chain_id } => {
                if !tx.is_protected() {
                    return Scheme::Homestead.recover_sender(tx);
                }
                let got = tx.chain_id();
                if got != U256::from(*chain_id) {
                    return Err(Error::ChainIdMismatch {
                        expected: *chain_id,
                        got,
                    });
                }
                // Fold v back to the 27/28 form
                let offset = U256::from(*chain_id) * U256::from(2u64) + U256::from(8u64);
                let v = v.checked_sub(offset).ok_or(Error::InvalidSignature)?;
                recover_plain(self.signing_hash(tx), r, s, v, true)
            }
        }
    }
}

/// Sign `tx` with `key` under `scheme`, returning a new signed transaction
pub fn sign_tx(tx: &CeloTransaction, scheme: &Scheme, key: &LocalKey) -> Result<CeloTransaction> {
    let hash = scheme.signing_hash(tx);
    let sig = key.sign_hash(&hash)?;
    tx.with_signature(scheme, &sig)
}

/// Sender of `tx` under `scheme`
///
/// The address is cached on the transaction together with the scheme that
/// recovered it; a lookup with a different scheme recomputes and replaces
/// the cached entry.
pub fn sender(scheme: &Scheme, tx: &CeloTransaction) -> Result<Address> {
    if let Some(from) = tx.cached_sender(scheme) {
        return Ok(from);
    }
    let from = scheme.recover_sender(tx)?;
    tx.store_sender(*scheme, from);
    Ok(from)
}

/// Check that `r` and `s` are valid curve scalars and the recovery id is a
/// parity bit. `homestead` additionally requires `s <= n / 2`.
pub fn validate_signature_values(recovery_id: u8, r: &U256, s: &U256, homestead: bool) -> bool {
    if r.is_zero() || s.is_zero() {
        return false;
    }
    let n = U256::from_be_bytes(SECP256K1_N);
    let half_n = n >> 1;
    if homestead && *s > half_n {
        return false;
    }
    *r < n && *s < n && recovery_id <= 1
}

fn recover_plain(sighash: B256, r: U256, s: U256, v: U256, homestead: bool) -> Result<Address> {
    if v.bit_len() > 8 {
        return Err(Error::InvalidSignature);
    }
    let mut recovery_id = v
        .to::<u8>()
        .checked_sub(27)
        .ok_or(Error::InvalidSignature)?;
    if !validate_signature_values(recovery_id, &r, &s, homestead) {
        return Err(Error::InvalidSignature);
    }

    let mut raw = [0u8; 64];
    raw[..32].copy_from_slice(&r.to_be_bytes::<32>());
    raw[32..].copy_from_slice(&s.to_be_bytes::<32>());
    let mut signature = Signature::from_slice(&raw).map_err(|_| Error::InvalidSignature)?;

    // Frontier accepts high-S; recover through the equivalent low-S form
    if let Some(normalized) = signature.normalize_s() {
        signature = normalized;
        recovery_id ^= 1;
    }

    let recovery_id = RecoveryId::from_byte(recovery_id).ok_or(Error::InvalidSignature)?;
    let key = VerifyingKey::recover_from_prehash(sighash.as_slice(), &signature, recovery_id)
        .map_err(|e| {
            debug!(error = %e, "Public key recovery failed");
            Error::InvalidSignature
        })?;

    Ok(Address::from_public_key(&key))
}
