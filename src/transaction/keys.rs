//! Local secp256k1 signing key

use std::fmt;

use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use alloy_primitives::{Address, B256};

use crate::error::{Error, Result};

/// Relayer key held in memory
///
/// Wraps alloy's `PrivateKeySigner`. Signs 32-byte digests and exposes the
/// derived account address. The key material never appears in `Debug`
/// output.
#[derive(Clone)]
pub struct LocalKey {
    signer: PrivateKeySigner,
}

impl LocalKey {
    /// Parse a hex-encoded private key, with or without `0x` prefix
    pub fn from_hex(private_key: &str) -> Result<Self> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .map_err(|e| Error::InvalidKey(format!("{}", e)))?;
        Ok(Self { signer })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(Error::InvalidKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let signer =
            PrivateKeySigner::from_slice(bytes).map_err(|e| Error::InvalidKey(e.to_string()))?;
        Ok(Self { signer })
    }

    /// Account address controlled by this key
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign a digest, returning `[R || S || recovery id]`
    pub fn sign_hash(&self, hash: &B256) -> Result<[u8; 65]> {
        let signature = self
            .signer
            .sign_hash_sync(hash)
            .map_err(|_| Error::InvalidSignature)?;
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&signature.r().to_be_bytes::<32>());
        out[32..64].copy_from_slice(&signature.s().to_be_bytes::<32>());
        out[64] = signature.recid().to_byte();
        Ok(out)
    }
}

impl fmt::Debug for LocalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalKey")
            .field("address", &self.address())
            .field("key", &"<redacted>")
            .finish()
    }
}
