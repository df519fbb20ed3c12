//! Bridge contract call layouts
//!
//! Uses alloy's sol! macro to generate the fixed ABI shapes the relayer needs:
//! proposal lookups, vote checks, the two state-changing calls and the
//! resource handler mapping. Helpers below build calldata and decode return
//! data so callers never touch the generated types directly.

#![allow(clippy::too_many_arguments)]

use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};
use alloy_primitives::{Address, Bytes, B256, U256};

use crate::error::Result;
use crate::hash::id_and_nonce;
use crate::proposal::{Proposal, ProposalStatus};

/// Gas budget for `voteProposal`
pub const VOTE_GAS_LIMIT: u64 = 1_000_000;

/// Gas budget for `executeProposal`
pub const EXECUTE_GAS_LIMIT: u64 = 2_000_000;

/// Canonical signature of the bridge's deposit event
pub const DEPOSIT_EVENT_SIGNATURE: &str = "Deposit(uint8,bytes32,uint64)";

sol! {
    /// Relayer-facing subset of the bridge contract
    contract Bridge {
        struct BridgeProposal {
            bytes32 _resourceID;
            bytes32 _dataHash;
            address[] _yesVotes;
            address[] _noVotes;
            uint8 _status;
            uint256 _proposedBlock;
        }

        /// Emitted on the source chain when a user deposits
        event Deposit(uint8 indexed destinationChainID, bytes32 indexed resourceID, uint64 indexed depositNonce);

        function getProposal(uint8 originChainID, uint64 depositNonce, bytes32 dataHash) external view returns (BridgeProposal memory);

        function _hasVotedOnProposal(uint72 destNonce, bytes32 dataHash, address relayer) external view returns (bool);

        function _resourceIDToHandlerAddress(bytes32 resourceID) external view returns (address);

        function voteProposal(uint8 chainID, uint64 depositNonce, bytes32 resourceID, bytes32 dataHash) external;

        /// The trailing six arguments belong to a verification extension the
        /// relayer does not use; they are always sent empty.
        function executeProposal(
            uint8 chainID,
            uint64 depositNonce,
            bytes data,
            bytes32 resourceID,
            bytes signatureHeader,
            bytes aggregatePublicKey,
            bytes32 hashedMessage,
            bytes32 rootHash,
            bytes key,
            bytes nodes
        ) external;
    }
}

/// Decoded `getProposal` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalRecord {
    pub resource_id: B256,
    pub data_hash: B256,
    pub yes_votes: Vec<Address>,
    pub no_votes: Vec<Address>,
    /// Raw status byte; see [`ProposalRecord::status`]
    pub status: u8,
    pub proposed_block: U256,
}

impl ProposalRecord {
    /// Map the raw status byte onto [`ProposalStatus`]. Unknown bytes are an
    /// error, never a status.
    pub fn status(&self) -> Result<ProposalStatus> {
        ProposalStatus::try_from(self.status)
    }
}

pub fn get_proposal_calldata(source_id: u8, deposit_nonce: u64, data_hash: B256) -> Bytes {
    Bridge::getProposalCall {
        originChainID: source_id,
        depositNonce: deposit_nonce,
        dataHash: data_hash,
    }
    .abi_encode()
    .into()
}

pub fn decode_proposal(data: &[u8]) -> Result<ProposalRecord> {
    let ret = Bridge::getProposalCall::abi_decode_returns(data, true)?;
    let p = ret._0;
    Ok(ProposalRecord {
        resource_id: p._resourceID,
        data_hash: p._dataHash,
        yes_votes: p._yesVotes,
        no_votes: p._noVotes,
        status: p._status,
        proposed_block: p._proposedBlock,
    })
}

pub fn has_voted_calldata(
    source_id: u8,
    deposit_nonce: u64,
    data_hash: B256,
    voter: Address,
) -> Bytes {
    Bridge::_hasVotedOnProposalCall {
        destNonce: id_and_nonce(source_id, deposit_nonce),
        dataHash: data_hash,
        relayer: voter,
    }
    .abi_encode()
    .into()
}

pub fn decode_has_voted(data: &[u8]) -> Result<bool> {
    Ok(Bridge::_hasVotedOnProposalCall::abi_decode_returns(data, true)?._0)
}

pub fn resource_handler_calldata(resource_id: B256) -> Bytes {
    Bridge::_resourceIDToHandlerAddressCall {
        resourceID: resource_id,
    }
    .abi_encode()
    .into()
}

pub fn decode_resource_handler(data: &[u8]) -> Result<Address> {
    Ok(Bridge::_resourceIDToHandlerAddressCall::abi_decode_returns(data, true)?._0)
}

pub fn vote_calldata(proposal: &Proposal) -> Bytes {
    Bridge::voteProposalCall {
        chainID: proposal.source_id,
        depositNonce: proposal.deposit_nonce,
        resourceID: proposal.resource_id,
        dataHash: proposal.data_hash(),
    }
    .abi_encode()
    .into()
}

pub fn execute_calldata(proposal: &Proposal) -> Bytes {
    Bridge::executeProposalCall {
        chainID: proposal.source_id,
        depositNonce: proposal.deposit_nonce,
        data: proposal.data.clone(),
        resourceID: proposal.resource_id,
        signatureHeader: Bytes::new(),
        aggregatePublicKey: Bytes::new(),
        hashedMessage: B256::ZERO,
        rootHash: B256::ZERO,
        key: Bytes::new(),
        nodes: Bytes::new(),
    }
    .abi_encode()
    .into()
}

/// Topic 0 of the deposit event
pub fn deposit_event_topic() -> B256 {
    Bridge::Deposit::SIGNATURE_HASH
}
