//! Celo Bridge Adapter: Celo chain support for the bridge relayer
//!
//! This crate provides what a relayer needs to act on a Celo destination chain:
//!
//! - **Transaction Codec** - Celo transactions in the 12-field extended layout
//!   and the 9-field Ethereum-compatible layout
//! - **Signature Schemes** - Frontier, Homestead and EIP-155 signing and
//!   sender recovery
//! - **Proposals** - Bridge proposal model and the contract call layouts for
//!   status lookups, votes and executions
//! - **Submission** - Nonce-serialized, retrying vote and execute submission
//! - **Testing Module** - In-memory node for exercising the submission engine
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! celo-bridge-adapter = { path = "../celo-bridge-adapter" }
//! ```
//!
//! ## Features
//!
//! - `testing` - Enable the in-memory node for downstream engine tests

pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod hash;
pub mod proposal;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transaction;
pub mod writers;

// Re-export commonly used items at the crate root
pub use client::{CeloClient, ChainBackend, DepositLog, GasPolicy, RpcBackend, TransactOpts};
pub use config::CeloConfig;
pub use error::{Error, Result};
pub use hash::{bytes32_to_hex, compute_data_hash, id_and_nonce, keccak256};
pub use proposal::{Proposal, ProposalStatus, STATUS_QUERY_FAILED};
pub use transaction::{derive_chain_id, sender, sign_tx, CeloTransaction, LocalKey, Scheme, TxRequest};
pub use writers::{ProposalWriter, RetryConfig, SubmissionOutcome};
