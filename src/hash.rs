//! Hash computation for proposals and transactions
//!
//! Provides the keccak-256 digest used for transaction hashes plus the bridge contract's proposal key derivations.

use alloy_primitives::aliases::U72;
use alloy_primitives::{Address, B256};
use tiny_keccak::{Hasher, Keccak};

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Compute the proposal data hash (matches Bridge.sol `keccak256(abi.encodePacked(handler, data))`)
///
/// The bridge keys every proposal on `(originChainID, depositNonce, dataHash)`,
/// so this must be byte-for-byte what the contract hashes.
pub fn compute_data_hash(handler: &Address, data: &[u8]) -> B256 {
    let mut packed = Vec::with_capacity(20 + data.len());
    packed.extend_from_slice(handler.as_slice());
    packed.extend_from_slice(data);
    B256::from(keccak256(&packed))
}

/// Pack a source chain id and deposit nonce into the bridge's `uint72` vote key
///
/// The contract derives the key as `(uint72(depositNonce) << 8) | uint72(chainID)`:
/// the big-endian nonce bytes followed by the single source id byte, read as
/// one integer.
pub fn id_and_nonce(source_id: u8, deposit_nonce: u64) -> U72 {
    (U72::from(deposit_nonce) << 8) | U72::from(source_id)
}

/// Convert bytes to hex string with 0x prefix
pub fn bytes32_to_hex(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}
