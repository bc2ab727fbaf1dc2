//! End-to-end tests for the claim pipeline of the RelayHub protocol.
//!
//! A relay signs and broadcasts a transaction; a reporter later splits the
//! broadcast bytes into the unsigned core and the detached signature; the
//! hub must recover exactly the relay from those two pieces. These tests
//! walk that path across module boundaries, plus the typed relay request a
//! legal `relayCall` carries, and persistence of the resulting state.

use alloy_primitives::{Address, Bytes, TxKind, U256};
use alloy_sol_types::SolCall;

use relayhub_protocol::config::HubConfig;
use relayhub_protocol::crypto::keys::RelayKeypair;
use relayhub_protocol::crypto::signatures::{recover_signer, Signature, SignatureError};
use relayhub_protocol::storage::{EventRecord, HubDb, HubEvent, HubState, Relay, RelayState};
use relayhub_protocol::transaction::abi::IRelayHub;
use relayhub_protocol::transaction::{
    relay_request_domain, sign_relay_request, verify_relay_request_signature, CallData, CodecError,
    RawTransaction, RelayData, RelayRequest, RelayRequestInput, SignedTransaction,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn transfer(nonce: u64, to: Address, value: u64) -> RawTransaction {
    RawTransaction {
        nonce,
        gas_price: U256::from(1_000_000_000u64),
        gas_limit: 21_000,
        to: TxKind::Call(to),
        value: U256::from(value),
        data: Bytes::new(),
    }
}

fn relay_request(sender: Address, relay: Address) -> RelayRequest {
    RelayRequest {
        callData: CallData {
            target: Address::repeat_byte(0x18),
            gasLimit: U256::from(1_000_000u64),
            gasPrice: U256::from(1_000_000_000u64),
            encodedFunction: Bytes::from_static(&[0x12, 0x34, 0x56, 0x78]),
        },
        relayData: RelayData {
            senderAccount: sender,
            senderNonce: U256::ZERO,
            relayAddress: relay,
            pctRelayFee: U256::from(10u64),
            gasSponsor: Address::repeat_byte(0x33),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Broadcast envelope -> claim parts -> decode -> recover.
#[test]
fn broadcast_bytes_recover_to_relay() {
    let relay = RelayKeypair::generate();
    let envelope = transfer(3, Address::repeat_byte(0x99), 1_000)
        .sign(&relay)
        .expect("signing");
    let broadcast = envelope.encode();

    let received = SignedTransaction::decode(&broadcast).expect("decode envelope");
    assert_eq!(received, envelope);

    let (core, sig) = received.to_claim_parts();
    let decoded = RawTransaction::decode(&core).expect("decode core");
    let signature = Signature::from_bytes(&sig).expect("parse signature");

    assert_eq!(decoded.recover_signer(&signature).unwrap(), relay.address());
    assert_eq!(
        recover_signer(decoded.signing_hash(), &signature).unwrap(),
        relay.address()
    );
}

/// A reporter who hands in the signed envelope where the core is expected
/// gets a decode error, not a wrong signer.
#[test]
fn envelope_is_not_a_core() {
    let relay = RelayKeypair::generate();
    let broadcast = transfer(0, Address::repeat_byte(1), 1).sign(&relay).unwrap().encode();
    assert!(matches!(
        RawTransaction::decode(&broadcast),
        Err(CodecError::Malformed(_))
    ));
}

/// A rebroadcast at a higher gas price is the same transaction for the
/// purposes of a repeated-nonce proof; a changed value is not.
#[test]
fn rebroadcast_does_not_conflict() {
    let a = transfer(5, Address::repeat_byte(2), 10);
    let mut bumped = a.clone();
    bumped.gas_price = a.gas_price * U256::from(2u64);
    assert!(!a.conflicts_with(&bumped));
    assert_ne!(a.encode_core(), bumped.encode_core());

    let mut other_value = a.clone();
    other_value.value = U256::from(11u64);
    assert!(a.conflicts_with(&other_value));
}

/// Signatures over the core are bound to it: moving one to another core
/// recovers someone else.
#[test]
fn signature_does_not_transfer_between_cores() {
    let relay = RelayKeypair::generate();
    let (_, sig) = transfer(1, Address::repeat_byte(3), 1).sign(&relay).unwrap().to_claim_parts();
    let other = transfer(1, Address::repeat_byte(3), 2);
    let signature = Signature::from_bytes(&sig).unwrap();
    assert_ne!(other.recover_signer(&signature), Ok(relay.address()));
}

#[test]
fn truncated_signature_rejected() {
    let relay = RelayKeypair::generate();
    let (_, sig) = transfer(1, Address::ZERO, 0).sign(&relay).unwrap().to_claim_parts();
    assert_eq!(
        Signature::from_bytes(&sig[..64]),
        Err(SignatureError::InvalidLength(64))
    );
}

/// The relayCall a relay broadcasts embeds a typed request whose signature
/// survives ABI encoding and decoding.
#[test]
fn relay_call_payload_carries_verifiable_request() {
    let config = HubConfig::default();
    let domain = relay_request_domain(config.chain_id, config.hub_address);
    let sender = RelayKeypair::generate();
    let relay = RelayKeypair::generate();

    let request = relay_request(sender.address(), relay.address());
    let signature = sign_relay_request(&request, &domain, &sender).unwrap();
    let call = IRelayHub::relayCallCall {
        relayRequest: request,
        signature: Bytes::copy_from_slice(&signature.to_bytes()),
        approvalData: Bytes::new(),
    };

    let tx = RawTransaction {
        nonce: 0,
        gas_price: U256::from(1u64),
        gas_limit: 500_000,
        to: TxKind::Call(config.hub_address),
        value: U256::ZERO,
        data: Bytes::from(call.abi_encode()),
    };
    let (core, _) = tx.sign(&relay).unwrap().to_claim_parts();
    let decoded = RawTransaction::decode(&core).unwrap();
    assert_eq!(decoded.selector(), Some(IRelayHub::relayCallCall::SELECTOR));

    let args = IRelayHub::relayCallCall::abi_decode(&decoded.data, true).unwrap();
    assert!(verify_relay_request_signature(
        &args.relayRequest,
        &args.signature,
        &domain
    ));
}

/// Wire requests with non-canonical numbers never reach the hasher.
#[test]
fn wire_request_must_be_canonical() {
    let sender = RelayKeypair::generate();
    let request = relay_request(sender.address(), Address::repeat_byte(2));
    let mut input = RelayRequestInput::from(&request);
    assert_eq!(RelayRequest::try_from(input.clone()).unwrap(), request);

    input.gas_limit = "01000000".to_string();
    assert!(RelayRequest::try_from(input).is_err());
}

/// State written after a penalization-shaped change comes back intact.
#[test]
fn hub_state_persists_across_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let relay = Address::repeat_byte(0x0a);
    let reporter = Address::repeat_byte(0x0b);

    let mut state = HubState::new();
    state.relays.insert(
        relay,
        Relay {
            owner: Address::repeat_byte(0x0c),
            stake: U256::ZERO,
            unstake_delay: 604_800,
            removal_time: 1_700_000_000,
            state: RelayState::Removed,
            ..Default::default()
        },
    );
    state.account_mut(reporter).balance = U256::from(500u64);
    state.total_burned = U256::from(500u64);
    state.event_count = 1;

    let record = EventRecord {
        sequence: 0,
        timestamp: 1_700_000_000,
        event: HubEvent::Penalized {
            relay,
            sender: reporter,
            amount: U256::from(500u64),
        },
    };

    {
        let db = HubDb::open(dir.path()).expect("open");
        db.commit(&state, std::slice::from_ref(&record)).expect("commit");
        db.flush().expect("flush");
    }

    let db = HubDb::open(dir.path()).expect("reopen");
    let restored = db.load_snapshot().unwrap().expect("snapshot present");
    assert_eq!(restored, state);
    assert_eq!(restored.total_value(), U256::from(1000u64));
    assert_eq!(db.events_since(0, 10).unwrap(), vec![record]);
}
