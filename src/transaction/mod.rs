//! Celo transaction codec and signing
//!
//! - [`tx`]: the transaction value type with its two RLP layouts
//! - [`signer`]: Frontier, Homestead and EIP-155 signature schemes
//! - [`keys`]: in-memory relayer key

pub mod keys;
pub mod signer;
pub mod tx;

pub use keys::LocalKey;
pub use signer::{sender, sign_tx, Scheme};
pub use tx::{derive_chain_id, CeloTransaction, TxRequest};
