//! # Raw Transaction Codec
//!
//! Decodes and re-encodes the canonical RLP form of a legacy ledger
//! transaction. Penalization claims are built from these bytes, so the codec
//! is strict: non-canonical integers, wrong field counts, and trailing
//! garbage are all rejected rather than "helpfully" repaired.
//!
//! ## Layout
//!
//! ```text
//! core   = rlp([nonce, gasPrice, gasLimit, to, value, data])
//! signed = rlp([nonce, gasPrice, gasLimit, to, value, data, v, r, s])
//! hash   = keccak256(core)            <- what the relay signed
//! ```
//!
//! `to` is a 20-byte address, or the empty string for contract creation.

use alloy_primitives::{Address, Bytes, TxKind, B256, U256};
use alloy_rlp::{Decodable, RlpDecodable, RlpEncodable};
use thiserror::Error;

use crate::config::SELECTOR_LENGTH;
use crate::crypto::keys::RelayKeypair;
use crate::crypto::signatures::{recover_signer, Signature, SignatureError};
use crate::crypto::keccak256;

/// Errors produced while decoding transaction bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed transaction encoding: {0}")]
    Malformed(#[from] alloy_rlp::Error),

    #[error("{0} trailing bytes after transaction")]
    TrailingBytes(usize),

    #[error("unsupported recovery value {0} in signed envelope")]
    UnsupportedRecoveryValue(u64),
}

// ---------------------------------------------------------------------------
// RawTransaction
// ---------------------------------------------------------------------------

/// The six signable fields of a legacy transaction.
///
/// Built from bytes when a claim arrives and dropped once the claim has been
/// judged. Never stored.
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct RawTransaction {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub to: TxKind,
    pub value: U256,
    pub data: Bytes,
}

impl RawTransaction {
    /// Decode the six-field core encoding. The whole input must be consumed.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut buf = bytes;
        let tx = <Self as Decodable>::decode(&mut buf)?;
        if !buf.is_empty() {
            return Err(CodecError::TrailingBytes(buf.len()));
        }
        Ok(tx)
    }

    /// Canonical encoding of the six signable fields, signature excluded.
    pub fn encode_core(&self) -> Vec<u8> {
        alloy_rlp::encode(self)
    }

    /// The digest a relay signs when it broadcasts this transaction.
    pub fn signing_hash(&self) -> B256 {
        keccak256(self.encode_core())
    }

    /// Recover the address that produced `signature` over this transaction.
    pub fn recover_signer(&self, signature: &Signature) -> Result<Address, SignatureError> {
        recover_signer(self.signing_hash(), signature)
    }

    /// Sign this transaction with `keypair`.
    pub fn sign(&self, keypair: &RelayKeypair) -> Result<SignedTransaction, SignatureError> {
        let signature = keypair.sign_hash(self.signing_hash())?;
        Ok(SignedTransaction {
            tx: self.clone(),
            signature,
        })
    }

    /// Destination address, `None` for contract creation.
    pub fn destination(&self) -> Option<Address> {
        self.to.to().copied()
    }

    /// The 4-byte call selector, if `data` is long enough to carry one.
    pub fn selector(&self) -> Option<[u8; SELECTOR_LENGTH]> {
        self.data
            .get(..SELECTOR_LENGTH)
            .and_then(|s| s.try_into().ok())
    }

    /// Whether two transactions describe different operations.
    ///
    /// Only `gasLimit`, `to`, `value` and `data` count. `nonce` is what the
    /// caller is comparing *on*, and `gasPrice` is the one field a relay may
    /// legitimately change when it rebroadcasts a stuck transaction.
    pub fn conflicts_with(&self, other: &RawTransaction) -> bool {
        self.gas_limit != other.gas_limit
            || self.to != other.to
            || self.value != other.value
            || self.data != other.data
    }
}

// ---------------------------------------------------------------------------
// SignedTransaction
// ---------------------------------------------------------------------------

#[derive(RlpEncodable, RlpDecodable)]
struct SignedFields {
    nonce: u64,
    gas_price: U256,
    gas_limit: u64,
    to: TxKind,
    value: U256,
    data: Bytes,
    v: u64,
    r: U256,
    s: U256,
}

/// A transaction exactly as a relay broadcasts it: core fields plus
/// signature, in one nine-item RLP list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub tx: RawTransaction,
    pub signature: Signature,
}

impl SignedTransaction {
    /// Decode a broadcast transaction. The whole input must be consumed.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut buf = bytes;
        let fields = <SignedFields as Decodable>::decode(&mut buf)?;
        if !buf.is_empty() {
            return Err(CodecError::TrailingBytes(buf.len()));
        }

        let v = u8::try_from(fields.v)
            .map_err(|_| CodecError::UnsupportedRecoveryValue(fields.v))?;

        Ok(Self {
            tx: RawTransaction {
                nonce: fields.nonce,
                gas_price: fields.gas_price,
                gas_limit: fields.gas_limit,
                to: fields.to,
                value: fields.value,
                data: fields.data,
            },
            signature: Signature::new(B256::from(fields.r), B256::from(fields.s), v),
        })
    }

    /// Encode to the nine-field broadcast form.
    pub fn encode(&self) -> Vec<u8> {
        let fields = SignedFields {
            nonce: self.tx.nonce,
            gas_price: self.tx.gas_price,
            gas_limit: self.tx.gas_limit,
            to: self.tx.to,
            value: self.tx.value,
            data: self.tx.data.clone(),
            v: u64::from(self.signature.v),
            r: U256::from_be_bytes(self.signature.r.0),
            s: U256::from_be_bytes(self.signature.s.0),
        };
        alloy_rlp::encode(&fields)
    }

    /// Ledger transaction hash: keccak256 of the broadcast encoding.
    pub fn hash(&self) -> B256 {
        keccak256(self.encode())
    }

    /// Recover the sender of this transaction.
    pub fn recover_signer(&self) -> Result<Address, SignatureError> {
        self.tx.recover_signer(&self.signature)
    }

    /// Split into the `(core bytes, signature bytes)` pair a penalization
    /// claim carries.
    pub fn to_claim_parts(&self) -> (Vec<u8>, Vec<u8>) {
        (self.tx.encode_core(), self.signature.to_bytes().to_vec())
    }
}
