//! Bridge proposals
//!
//! A [`Proposal`] is the relayer's view of a cross-chain action awaiting
//! votes on the destination chain's bridge contract. The contract keys it by
//! `(source id, deposit nonce, data hash)`.

pub mod contract;

use std::fmt;

use alloy_primitives::{Address, Bytes, B256};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::hash::compute_data_hash;

/// Returned by status lookups that could not reach the chain. It is never a
/// valid on-chain status and [`ProposalStatus::try_from`] rejects it.
pub const STATUS_QUERY_FAILED: u8 = 99;

/// On-chain proposal state, mirroring the bridge contract's enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum ProposalStatus {
    Inactive = 0,
    Active = 1,
    Passed = 2,
    Executed = 3,
    Cancelled = 4,
}

impl ProposalStatus {
    /// No further execution can happen on chain
    pub fn is_finalized(&self) -> bool {
        matches!(
            self,
            ProposalStatus::Passed | ProposalStatus::Executed | ProposalStatus::Cancelled
        )
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for ProposalStatus {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ProposalStatus::Inactive),
            1 => Ok(ProposalStatus::Active),
            2 => Ok(ProposalStatus::Passed),
            3 => Ok(ProposalStatus::Executed),
            4 => Ok(ProposalStatus::Cancelled),
            STATUS_QUERY_FAILED => Err(Error::QueryFailure(
                "proposal status query failed".to_string(),
            )),
            other => Err(Error::Abi(format!("unknown proposal status {}", other))),
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProposalStatus::Inactive => "inactive",
            ProposalStatus::Active => "active",
            ProposalStatus::Passed => "passed",
            ProposalStatus::Executed => "executed",
            ProposalStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A cross-chain action awaiting consensus on the destination bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub source_id: u8,
    pub destination_id: u8,
    pub deposit_nonce: u64,
    pub resource_id: B256,
    pub data: Bytes,
    pub handler_address: Address,
    pub bridge_address: Address,
}

impl Proposal {
    /// `keccak256(handler || data)`, the hash the bridge stores for this proposal
    pub fn data_hash(&self) -> B256 {
        compute_data_hash(&self.handler_address, &self.data)
    }
}
