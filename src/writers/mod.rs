//! Proposal submission
//!
//! [`ProposalWriter`] votes on and executes bridge proposals. Each action
//! runs a bounded retry loop:
//!
//! 1. Lock the identity's transact options and refresh gas price and nonce
//! 2. Build, sign and broadcast; the lock is released right after
//! 3. On success, return the transaction hash without waiting for inclusion
//! 4. On nonce or pricing conflicts, sleep and retry
//! 5. On any other failure, sleep and check whether another relayer already
//!    finalized the proposal
//!
//! Running out of attempts yields [`Error::FatalSubmission`].

pub mod retry;

use std::sync::Arc;

use alloy_primitives::{Address, B256};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::client::{CeloClient, ChainBackend};
use crate::error::{Error, Result};
use crate::proposal::contract::{
    decode_has_voted, decode_proposal, execute_calldata, get_proposal_calldata,
    has_voted_calldata, vote_calldata, EXECUTE_GAS_LIMIT, VOTE_GAS_LIMIT,
};
use crate::proposal::{Proposal, ProposalStatus};

pub use retry::RetryConfig;

/// How a successful vote or execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SubmissionOutcome {
    /// Our transaction was accepted by the node
    Submitted(B256),
    /// The proposal was already in a final state on chain
    AlreadyFinalized(ProposalStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Vote,
    Execute,
}

impl Action {
    fn gas_limit(&self) -> u64 {
        match self {
            Action::Vote => VOTE_GAS_LIMIT,
            Action::Execute => EXECUTE_GAS_LIMIT,
        }
    }

    /// Status that makes further submissions pointless
    fn is_complete(&self, status: ProposalStatus) -> bool {
        match self {
            Action::Vote => status == ProposalStatus::Passed,
            Action::Execute => status.is_finalized(),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Action::Vote => "vote",
            Action::Execute => "execution",
        }
    }
}

/// Submits votes and executions for one signing identity
pub struct ProposalWriter<B> {
    client: Arc<CeloClient<B>>,
    retry: RetryConfig,
}

impl<B> Clone for ProposalWriter<B> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            retry: self.retry.clone(),
        }
    }
}

impl<B: ChainBackend> ProposalWriter<B> {
    pub fn new(client: Arc<CeloClient<B>>) -> Self {
        Self::with_retry(client, RetryConfig::default())
    }

    pub fn with_retry(client: Arc<CeloClient<B>>, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    pub fn client(&self) -> &CeloClient<B> {
        &self.client
    }

    /// Cast this identity's vote for `proposal`
    pub async fn vote_proposal(&self, proposal: &Proposal) -> Result<SubmissionOutcome> {
        self.submit(proposal, Action::Vote).await
    }

    /// Execute a passed proposal
    pub async fn execute_proposal(&self, proposal: &Proposal) -> Result<SubmissionOutcome> {
        self.submit(proposal, Action::Execute).await
    }

    /// Current on-chain status of `proposal`
    ///
    /// Node failures and unknown status bytes are errors; they are never
    /// reported as a status.
    pub async fn proposal_status(&self, proposal: &Proposal) -> Result<ProposalStatus> {
        let calldata = get_proposal_calldata(
            proposal.source_id,
            proposal.deposit_nonce,
            proposal.data_hash(),
        );
        let out = self
            .client
            .call_contract(proposal.bridge_address, calldata, None)
            .await?;
        let record = decode_proposal(&out)?;
        debug!(
            source = proposal.source_id,
            nonce = proposal.deposit_nonce,
            status = record.status,
            yes_votes = record.yes_votes.len(),
            "Fetched proposal"
        );
        record.status()
    }

    /// Whether `voter` has voted on `proposal`
    pub async fn voted_by(&self, proposal: &Proposal, voter: Address) -> Result<bool> {
        let calldata = has_voted_calldata(
            proposal.source_id,
            proposal.deposit_nonce,
            proposal.data_hash(),
            voter,
        );
        let out = self
            .client
            .call_contract(proposal.bridge_address, calldata, None)
            .await?;
        decode_has_voted(&out)
    }

    async fn submit(&self, proposal: &Proposal, action: Action) -> Result<SubmissionOutcome> {
        let calldata = match action {
            Action::Vote => vote_calldata(proposal),
            Action::Execute => execute_calldata(proposal),
        };

        for attempt in 1..=self.retry.max_attempts {
            let sent = {
                let opts = match self.client.lock_and_update_opts().await {
                    Ok(opts) => opts,
                    Err(e) => {
                        error!(error = %e, attempt = attempt, "Failed to update tx opts");
                        if self.retry.should_retry(attempt) {
                            tokio::time::sleep(self.retry.interval).await;
                        }
                        continue;
                    }
                };
                self.client
                    .sign_and_send(
                        &opts,
                        proposal.bridge_address,
                        calldata.clone(),
                        action.gas_limit(),
                    )
                    .await
            };

            let err = match sent {
                Ok(hash) => {
                    info!(
                        source = proposal.source_id,
                        dest = proposal.destination_id,
                        nonce = proposal.deposit_nonce,
                        tx = %hash,
                        "Submitted proposal {}",
                        action.as_str()
                    );
                    return Ok(SubmissionOutcome::Submitted(hash));
                }
                Err(e) => e,
            };

            if err.aborts_submission() {
                error!(
                    error = %err,
                    source = proposal.source_id,
                    nonce = proposal.deposit_nonce,
                    "Cannot build proposal {} transaction",
                    action.as_str()
                );
                return Err(err);
            }

            if err.is_retryable() {
                warn!(error = %err, attempt = attempt, "Nonce too low, will retry");
                if self.retry.should_retry(attempt) {
                    tokio::time::sleep(self.retry.interval).await;
                }
                continue;
            }

            warn!(
                error = %err,
                attempt = attempt,
                "Proposal {} failed, proposal may already be complete",
                action.as_str()
            );
            tokio::time::sleep(self.retry.interval).await;

            match self.proposal_status(proposal).await {
                Ok(status) if action.is_complete(status) => {
                    info!(
                        source = proposal.source_id,
                        dest = proposal.destination_id,
                        nonce = proposal.deposit_nonce,
                        status = %status,
                        "Proposal finalized on chain"
                    );
                    return Ok(SubmissionOutcome::AlreadyFinalized(status));
                }
                Ok(status) => {
                    debug!(status = %status, "Proposal not finalized, retrying");
                }
                Err(e) => {
                    error!(
                        error = %e,
                        source = proposal.source_id,
                        nonce = proposal.deposit_nonce,
                        "Error getting proposal status"
                    );
                }
            }
        }

        error!(
            source = proposal.source_id,
            dest = proposal.destination_id,
            nonce = proposal.deposit_nonce,
            "Submission of {} transaction failed",
            action.as_str()
        );
        Err(Error::FatalSubmission {
            source_id: proposal.source_id,
            destination_id: proposal.destination_id,
            deposit_nonce: proposal.deposit_nonce,
        })
    }
}
