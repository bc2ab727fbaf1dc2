//! # Hashing Utilities
//!
//! Keccak-256 is the only hash the ledger speaks. Transaction signing
//! hashes, typed-data digests, ABI selectors and account addresses are all
//! derived from it, so the wrappers here are deliberately thin.

use alloy_primitives::{Address, B256};
use k256::ecdsa::VerifyingKey;

use crate::config::ADDRESS_LENGTH;

/// Compute the Keccak-256 digest of `data`.
///
/// # Example
///
/// ```
/// use relayhub_protocol::crypto::keccak256;
///
/// let digest = keccak256(b"");
/// assert_eq!(
///     hex::encode(digest),
///     "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
/// );
/// ```
pub fn keccak256(data: impl AsRef<[u8]>) -> B256 {
    alloy_primitives::keccak256(data)
}

/// Derive the ledger address of a secp256k1 public key.
///
/// The address is the last 20 bytes of `keccak256(X || Y)`, where `X || Y`
/// is the uncompressed point without its `0x04` tag byte.
pub fn public_key_to_address(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&digest[digest.len() - ADDRESS_LENGTH..])
}
