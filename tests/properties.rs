//! Property-Based Codec and Signing Tests
//!
//! Checks the codec and the EIP-155 scheme over generated transactions and
//! chain ids rather than fixed examples.

use alloy_primitives::{Address, Bytes, U256};
use celo_bridge_adapter::{
    derive_chain_id, sender, sign_tx, CeloTransaction, LocalKey, Scheme, TxRequest,
};
use proptest::prelude::*;

const TEST_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

fn any_u256() -> impl Strategy<Value = U256> {
    prop_oneof![
        any::<u64>().prop_map(|n| U256::from(n)),
        any::<[u8; 32]>().prop_map(|b| U256::from_be_bytes(b)),
    ]
}

fn any_address() -> impl Strategy<Value = Address> {
    any::<[u8; 20]>().prop_map(|b| Address::from(b))
}

prop_compose! {
    fn any_request()(
        nonce in any::<u64>(),
        to in proptest::option::of(any_address()),
        value in any_u256(),
        gas_limit in any::<u64>(),
        gas_price in any_u256(),
        fee_currency in proptest::option::of(any_address()),
        gateway_fee_recipient in proptest::option::of(any_address()),
        gateway_fee in any_u256(),
        input in prop::collection::vec(any::<u8>(), 0..256),
        eth_compatible in any::<bool>(),
    ) -> TxRequest {
        // compatibility mode cannot carry the Celo fee fields
        let (fee_currency, gateway_fee_recipient, gateway_fee) = if eth_compatible {
            (None, None, U256::ZERO)
        } else {
            (fee_currency, gateway_fee_recipient, gateway_fee)
        };
        TxRequest {
            nonce,
            to,
            value,
            gas_limit,
            gas_price,
            fee_currency,
            gateway_fee_recipient,
            gateway_fee,
            input: Bytes::from(input),
            eth_compatible,
        }
    }
}

proptest! {
    /// Property: decode(encode(tx)) == tx for either layout, signature
    /// values included
    #[test]
    fn prop_encode_decode_roundtrip(
        request in any_request(),
        v in any_u256(),
        r in any_u256(),
        s in any_u256(),
    ) {
        let tx = request.build().unwrap().with_signature_values(r, s, v);
        let encoded = tx.encode().unwrap();
        let decoded = CeloTransaction::decode(&encoded).unwrap();

        prop_assert_eq!(decoded.is_eth_compatible(), tx.is_eth_compatible());
        prop_assert_eq!(decoded.hash(), tx.hash());
        prop_assert_eq!(decoded.encoded_len(), encoded.len());
        prop_assert_eq!(decoded, tx);
    }

    /// Property: arbitrary input never panics the decoder
    #[test]
    fn prop_decode_arbitrary_bytes(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = CeloTransaction::decode(&bytes);
    }

    /// Property: the chain id folded into v by EIP-155 is recovered exactly
    #[test]
    fn prop_chain_id_derivation(chain_id in 1u64..(1u64 << 32), recovery_id in 0u8..=1) {
        let mut sig = [0x11u8; 65];
        sig[64] = recovery_id;
        let (_, _, v) = Scheme::eip155(chain_id).signature_values(&sig).unwrap();
        prop_assert_eq!(derive_chain_id(&v), U256::from(chain_id));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: sign, encode, decode and recover yields the signer for
    /// any chain id, and a different chain id is rejected
    #[test]
    fn prop_eip155_sign_recover(request in any_request(), chain_id in 1u64..(1u64 << 32)) {
        let key = LocalKey::from_hex(TEST_KEY).unwrap();
        let scheme = Scheme::eip155(chain_id);
        let signed = sign_tx(&request.build().unwrap(), &scheme, &key).unwrap();

        let decoded = CeloTransaction::decode(&signed.encode().unwrap()).unwrap();
        prop_assert_eq!(decoded.chain_id(), U256::from(chain_id));
        prop_assert_eq!(sender(&scheme, &decoded).unwrap(), key.address());
        prop_assert!(Scheme::eip155(chain_id + 1).recover_sender(&decoded).is_err());
    }
}
