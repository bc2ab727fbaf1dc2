//! # Key Management
//!
//! secp256k1 keypairs for relay operators, reporters, and test fixtures.
//!
//! The hub itself never needs a private key: it only recovers signers. This
//! type exists for the other side of the protocol (the node's `init`
//! command, tooling that signs raw transactions, and every test that needs
//! a relay to misbehave on purpose).
//!
//! Key bytes are never logged. `RelayKeypair` does not implement `Debug`
//! output of the secret, nor `Serialize`; export is explicit via
//! [`RelayKeypair::secret_key_bytes`].

use alloy_primitives::{Address, B256};
use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;

use super::hash::public_key_to_address;
use super::signatures::{Signature, SignatureError};

/// Errors that can occur while loading key material.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid secret key bytes: zero or not below the curve order")]
    InvalidSecretKey,

    #[error("invalid hex encoding for secret key")]
    InvalidHex,
}

/// A secp256k1 signing key together with its derived ledger address.
#[derive(Clone)]
pub struct RelayKeypair {
    signing_key: SigningKey,
    address: Address,
}

impl RelayKeypair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    /// Load a keypair from a raw 32-byte secret scalar.
    pub fn from_bytes(secret: &[u8; 32]) -> Result<Self, KeyError> {
        let signing_key =
            SigningKey::from_bytes(secret.into()).map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_signing_key(signing_key))
    }

    /// Load a keypair from a hex-encoded secret (with or without `0x`).
    pub fn from_hex(secret_hex: &str) -> Result<Self, KeyError> {
        let trimmed = secret_hex.trim();
        let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(stripped).map_err(|_| KeyError::InvalidHex)?;
        let secret: [u8; 32] = bytes.try_into().map_err(|_| KeyError::InvalidSecretKey)?;
        Self::from_bytes(&secret)
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = public_key_to_address(signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    /// The ledger address controlled by this key.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Export the raw secret scalar. Handle with care.
    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes().into()
    }

    /// Sign a 32-byte digest, returning a low-`s` signature with `v ∈ {27, 28}`.
    pub fn sign_hash(&self, hash: B256) -> Result<Signature, SignatureError> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(hash.as_slice())
            .map_err(|_| SignatureError::SigningFailed)?;
        Ok(Signature::from_k256(&signature, recovery_id))
    }
}

impl fmt::Debug for RelayKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayKeypair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
