//! Deposit message handlers
//!
//! Turn a decoded deposit message into the [`Proposal`] the destination
//! bridge expects. The handler address is folded into the proposal's data
//! hash, so each asset type packs its payload the way its handler contract
//! reads it.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::proposal::Proposal;

/// A deposit observed on the source chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositMessage {
    pub source_id: u8,
    pub destination_id: u8,
    pub deposit_nonce: u64,
    pub resource_id: B256,
    /// Handler-specific payload values, in deposit record order
    pub payload: Vec<Bytes>,
}

/// Build a fungible transfer proposal
///
/// The payload must be `[amount, recipient]` with the amount as big-endian
/// bytes. The proposal data is `amount (uint256) || len(recipient) (uint256)
/// || recipient`.
pub fn erc20_message_handler(
    message: &DepositMessage,
    handler_address: Address,
    bridge_address: Address,
) -> Result<Proposal> {
    let [amount, recipient] = message.payload.as_slice() else {
        return Err(Error::MalformedEncoding(format!(
            "malformed payload: expected 2 values, got {}",
            message.payload.len()
        )));
    };
    if amount.len() > 32 {
        return Err(Error::MalformedEncoding(format!(
            "amount is {} bytes, exceeds uint256",
            amount.len()
        )));
    }

    let mut data = Vec::with_capacity(64 + recipient.len());
    data.extend_from_slice(&U256::from_be_slice(amount).to_be_bytes::<32>());
    data.extend_from_slice(&U256::from(recipient.len()).to_be_bytes::<32>());
    data.extend_from_slice(recipient);

    Ok(Proposal {
        source_id: message.source_id,
        destination_id: message.destination_id,
        deposit_nonce: message.deposit_nonce,
        resource_id: message.resource_id,
        data: data.into(),
        handler_address,
        bridge_address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(payload: Vec<Bytes>) -> DepositMessage {
        DepositMessage {
            source_id: 1,
            destination_id: 2,
            deposit_nonce: 3,
            resource_id: B256::repeat_byte(0x04),
            payload,
        }
    }

    #[test]
    fn test_erc20_packing() {
        let recipient = Address::repeat_byte(0xee);
        let msg = message(vec![
            Bytes::from(vec![0x01, 0x00]),
            Bytes::copy_from_slice(recipient.as_slice()),
        ]);
        let proposal =
            erc20_message_handler(&msg, Address::repeat_byte(0x0a), Address::repeat_byte(0x0b))
                .unwrap();

        assert_eq!(proposal.data.len(), 64 + 20);
        assert_eq!(&proposal.data[30..32], &[0x01, 0x00]);
        assert!(proposal.data[..30].iter().all(|b| *b == 0));
        assert_eq!(proposal.data[63], 20);
        assert_eq!(&proposal.data[64..], recipient.as_slice());
        assert_eq!(proposal.deposit_nonce, 3);
        assert_eq!(proposal.handler_address, Address::repeat_byte(0x0a));
    }

    #[test]
    fn test_erc20_rejects_wrong_arity() {
        let handler = Address::ZERO;
        assert!(erc20_message_handler(&message(vec![]), handler, handler).is_err());
        assert!(
            erc20_message_handler(&message(vec![Bytes::new()]), handler, handler).is_err()
        );
        assert!(erc20_message_handler(
            &message(vec![Bytes::new(), Bytes::new(), Bytes::new()]),
            handler,
            handler
        )
        .is_err());
    }

    #[test]
    fn test_erc20_rejects_oversized_amount() {
        let msg = message(vec![Bytes::from(vec![1u8; 33]), Bytes::new()]);
        assert!(erc20_message_handler(&msg, Address::ZERO, Address::ZERO).is_err());
    }
}
