//! # Typed Relay Requests
//!
//! A sender authorizes a relay by signing a [`RelayRequest`] as EIP-712
//! typed data under the hub's domain. This module owns both sides of that
//! exchange:
//!
//! - [`RelayRequestInput`], the JSON wire form, where every numeric field is
//!   a decimal string and must be canonical before it is allowed anywhere
//!   near a hash;
//! - [`verify_relay_request_signature`], which recomputes the typed-data
//!   digest and checks the recovered signer against `senderAccount`.
//!
//! ## Canonical decimals
//!
//! `"0"` or `[1-9][0-9]*`, fitting in 256 bits. Hex, leading zeros, signs,
//! whitespace and the empty string are all refused. Two spellings of the same
//! number must never reach the hasher as different requests.

use std::borrow::Cow;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{Eip712Domain, SolStruct};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::abi::{CallData, RelayData, RelayRequest};
use crate::config::{EIP712_DOMAIN_NAME, EIP712_DOMAIN_VERSION};
use crate::crypto::keys::RelayKeypair;
use crate::crypto::signatures::{recover_signer, Signature, SignatureError};

/// Errors raised while turning a wire request into a typed one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("field `{field}` is not a canonical decimal integer: {value:?}")]
    InvalidFieldEncoding { field: &'static str, value: String },
}

/// Wire form of a relay request, as submitted by clients over JSON.
///
/// Addresses and calldata use their usual hex encodings; every integer is a
/// canonical decimal string. The hub address is not part of the payload,
/// it enters the digest through the signing domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequestInput {
    pub sender: Address,
    pub sender_nonce: String,
    pub target: Address,
    pub encoded_function: Bytes,
    pub relay_fee: String,
    pub gas_price: String,
    pub gas_limit: String,
    pub gas_sponsor: Address,
    pub relay_address: Address,
}

impl TryFrom<RelayRequestInput> for RelayRequest {
    type Error = RequestError;

    fn try_from(input: RelayRequestInput) -> Result<Self, Self::Error> {
        Ok(RelayRequest {
            callData: CallData {
                target: input.target,
                gasLimit: parse_canonical_decimal("gasLimit", &input.gas_limit)?,
                gasPrice: parse_canonical_decimal("gasPrice", &input.gas_price)?,
                encodedFunction: input.encoded_function,
            },
            relayData: RelayData {
                senderAccount: input.sender,
                senderNonce: parse_canonical_decimal("senderNonce", &input.sender_nonce)?,
                relayAddress: input.relay_address,
                pctRelayFee: parse_canonical_decimal("relayFee", &input.relay_fee)?,
                gasSponsor: input.gas_sponsor,
            },
        })
    }
}

impl From<&RelayRequest> for RelayRequestInput {
    fn from(request: &RelayRequest) -> Self {
        Self {
            sender: request.relayData.senderAccount,
            sender_nonce: request.relayData.senderNonce.to_string(),
            target: request.callData.target,
            encoded_function: request.callData.encodedFunction.clone(),
            relay_fee: request.relayData.pctRelayFee.to_string(),
            gas_price: request.callData.gasPrice.to_string(),
            gas_limit: request.callData.gasLimit.to_string(),
            gas_sponsor: request.relayData.gasSponsor,
            relay_address: request.relayData.relayAddress,
        }
    }
}

/// Parse a canonical base-10 integer into a `U256`.
pub fn parse_canonical_decimal(field: &'static str, value: &str) -> Result<U256, RequestError> {
    let invalid = || RequestError::InvalidFieldEncoding {
        field,
        value: value.to_string(),
    };

    let bytes = value.as_bytes();
    let canonical = match bytes {
        [] => false,
        [b'0'] => true,
        [b'1'..=b'9', rest @ ..] => rest.iter().all(u8::is_ascii_digit),
        _ => false,
    };
    if !canonical {
        return Err(invalid());
    }
    U256::from_str_radix(value, 10).map_err(|_| invalid())
}

/// The EIP-712 domain a hub signs requests under.
pub fn relay_request_domain(chain_id: u64, hub_address: Address) -> Eip712Domain {
    Eip712Domain::new(
        Some(Cow::Borrowed(EIP712_DOMAIN_NAME)),
        Some(Cow::Borrowed(EIP712_DOMAIN_VERSION)),
        Some(U256::from(chain_id)),
        Some(hub_address),
        None,
    )
}

/// The typed-data digest the sender signs.
pub fn relay_request_hash(request: &RelayRequest, domain: &Eip712Domain) -> B256 {
    request.eip712_signing_hash(domain)
}

/// Sign a request on behalf of its sender.
pub fn sign_relay_request(
    request: &RelayRequest,
    domain: &Eip712Domain,
    keypair: &RelayKeypair,
) -> Result<Signature, SignatureError> {
    keypair.sign_hash(relay_request_hash(request, domain))
}

/// Recover the address that signed `request` under `domain`.
pub fn recover_request_signer(
    request: &RelayRequest,
    signature: &[u8],
    domain: &Eip712Domain,
) -> Result<Address, SignatureError> {
    let signature = Signature::from_bytes(signature)?;
    recover_signer(relay_request_hash(request, domain), &signature)
}

/// Whether `signature` is the request sender's signature over `request`.
///
/// Malformed signatures verify as `false`; they are not an error here because
/// the penalization engine only needs a yes or no.
pub fn verify_relay_request_signature(
    request: &RelayRequest,
    signature: &[u8],
    domain: &Eip712Domain,
) -> bool {
    match recover_request_signer(request, signature, domain) {
        Ok(signer) => signer == request.relayData.senderAccount,
        Err(_) => false,
    }
}
