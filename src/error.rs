//! Error taxonomy for the Celo chain adapter
//!
//! Encoding and signature errors indicate corrupted data or a programming bug
//! and abort a submission immediately. Node errors are classified by the
//! submission engine and retried; only an exhausted retry budget is surfaced
//! to the caller as [`Error::FatalSubmission`].

use alloy_primitives::U256;
use thiserror::Error;

/// Result alias used throughout the adapter
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The RLP input does not decode to a 9- or 12-field transaction list
    #[error("Malformed transaction encoding: {0}")]
    MalformedEncoding(String),

    /// An Ethereum-compatible transaction carries Celo-only fee fields
    #[error("Ethereum-compatible transaction must not set feeCurrency, gatewayFeeRecipient or gatewayFee")]
    IncompatibleFields,

    #[error("Invalid transaction signature")]
    InvalidSignature,

    #[error("Invalid chain id for signer: expected {expected}, got {got}")]
    ChainIdMismatch { expected: u64, got: U256 },

    /// Nonce too low or replacement underpriced; safe to retry immediately
    #[error("Transient submission error: {0}")]
    TransientSubmission(String),

    /// The node rejected the transaction for a reason other than nonce/price
    #[error("Transaction rejected by node: {0}")]
    Broadcast(String),

    /// Retry budget exhausted without the proposal reaching the wanted state
    #[error(
        "Submission of transaction failed: source {source_id} dest {destination_id} deposit nonce {deposit_nonce}"
    )]
    FatalSubmission {
        source_id: u8,
        destination_id: u8,
        deposit_nonce: u64,
    },

    /// The node could not answer a read (RPC failure, not an on-chain revert)
    #[error("Node query failed: {0}")]
    QueryFailure(String),

    /// Contract return data did not match the expected ABI layout
    #[error("Failed to decode contract return data: {0}")]
    Abi(String),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),
}

impl Error {
    /// Whether the error comes from encoding or signing and must abort the
    /// current action without retrying.
    pub fn aborts_submission(&self) -> bool {
        matches!(
            self,
            Error::MalformedEncoding(_)
                | Error::IncompatibleFields
                | Error::InvalidSignature
                | Error::ChainIdMismatch { .. }
                | Error::InvalidKey(_)
        )
    }

    /// Whether a broadcast can be retried straight away with a fresh nonce
    /// and gas price.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransientSubmission(_))
    }

    /// Errors raised while reading chain state rather than writing to it
    pub fn is_query_failure(&self) -> bool {
        matches!(self, Error::QueryFailure(_) | Error::Abi(_))
    }
}

impl From<alloy_rlp::Error> for Error {
    fn from(e: alloy_rlp::Error) -> Self {
        Error::MalformedEncoding(e.to_string())
    }
}

impl From<alloy::sol_types::Error> for Error {
    fn from(e: alloy::sol_types::Error) -> Self {
        Error::Abi(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_error_names_proposal() {
        let err = Error::FatalSubmission {
            source_id: 1,
            destination_id: 2,
            deposit_nonce: 42,
        };
        let msg = err.to_string();
        assert!(msg.contains("source 1"));
        assert!(msg.contains("dest 2"));
        assert!(msg.contains("deposit nonce 42"));
    }

    #[test]
    fn test_error_policy() {
        assert!(Error::InvalidSignature.aborts_submission());
        assert!(Error::IncompatibleFields.aborts_submission());
        assert!(!Error::Broadcast("boom".into()).aborts_submission());
        assert!(Error::TransientSubmission("nonce too low".into()).is_retryable());
        assert!(!Error::QueryFailure("timeout".into()).is_retryable());
        assert!(Error::Abi("short".into()).is_query_failure());
    }
}
