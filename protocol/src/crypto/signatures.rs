//! # Signatures & Signer Recovery
//!
//! The hub never sees public keys. Every claim it judges arrives as a
//! message hash plus a detached `(r, s, v)` signature, and the only question
//! it asks is "which address produced this?". This module answers it.
//!
//! ## Wire format
//!
//! ```text
//! [ r : 32 bytes BE ][ s : 32 bytes BE ][ v : 1 byte, 27 or 28 ]
//! ```
//!
//! ## Malleability
//!
//! The ledger's native `ecrecover` accepts high-`s` signatures. `k256`
//! refuses them, so a high-`s` signature is first folded onto its low-`s`
//! twin (`s' = n - s`, parity flipped). Both recover the same key, which
//! keeps recovery here bit-compatible with what the ledger itself reports
//! as the sender of a broadcast transaction.

use alloy_primitives::{Address, B256};
use k256::ecdsa::{RecoveryId, Signature as K256Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::hash::public_key_to_address;
use crate::config::{SIGNATURE_LENGTH, SIGNATURE_SCALAR_LENGTH, SIGNATURE_V_EVEN, SIGNATURE_V_ODD};

/// Errors during signature parsing, recovery, or production.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature length: expected {SIGNATURE_LENGTH} bytes, got {0}")]
    InvalidLength(usize),

    #[error("invalid recovery byte {0}: expected 27 or 28")]
    InvalidRecoveryByte(u8),

    #[error("signature does not recover to a valid public key")]
    InvalidSignature,

    #[error("signing failed")]
    SigningFailed,
}

/// A detached recoverable ECDSA signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub r: B256,
    pub s: B256,
    pub v: u8,
}

impl Signature {
    /// Build a signature from its components without validating them.
    /// Validation happens at recovery time.
    pub fn new(r: B256, s: B256, v: u8) -> Self {
        Self { r, s, v }
    }

    /// Parse the 65-byte `r || s || v` wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(SignatureError::InvalidLength(bytes.len()));
        }
        let r = B256::from_slice(&bytes[..SIGNATURE_SCALAR_LENGTH]);
        let s = B256::from_slice(&bytes[SIGNATURE_SCALAR_LENGTH..2 * SIGNATURE_SCALAR_LENGTH]);
        let v = bytes[2 * SIGNATURE_SCALAR_LENGTH];
        Ok(Self { r, s, v })
    }

    /// Serialize to the 65-byte `r || s || v` wire form.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        let mut out = [0u8; SIGNATURE_LENGTH];
        out[..SIGNATURE_SCALAR_LENGTH].copy_from_slice(self.r.as_slice());
        out[SIGNATURE_SCALAR_LENGTH..2 * SIGNATURE_SCALAR_LENGTH].copy_from_slice(self.s.as_slice());
        out[2 * SIGNATURE_SCALAR_LENGTH] = self.v;
        out
    }

    /// Whether `R.y` is odd, decoded from `v`.
    pub fn y_parity(&self) -> Result<bool, SignatureError> {
        match self.v {
            SIGNATURE_V_EVEN => Ok(false),
            SIGNATURE_V_ODD => Ok(true),
            other => Err(SignatureError::InvalidRecoveryByte(other)),
        }
    }

    /// Build from a `k256` signature and its recovery id.
    pub(crate) fn from_k256(signature: &K256Signature, recovery_id: RecoveryId) -> Self {
        let bytes = signature.to_bytes();
        Self {
            r: B256::from_slice(&bytes[..SIGNATURE_SCALAR_LENGTH]),
            s: B256::from_slice(&bytes[SIGNATURE_SCALAR_LENGTH..]),
            v: if recovery_id.is_y_odd() {
                SIGNATURE_V_ODD
            } else {
                SIGNATURE_V_EVEN
            },
        }
    }
}

/// Recover the address that signed `hash`.
///
/// Fails with [`SignatureError::InvalidRecoveryByte`] when `v` is not 27 or
/// 28, and with [`SignatureError::InvalidSignature`] when `r`/`s` are zero,
/// not below the curve order, or do not name a point on the curve.
pub fn recover_signer(hash: B256, signature: &Signature) -> Result<Address, SignatureError> {
    let y_odd = signature.y_parity()?;

    let parsed = K256Signature::from_scalars(signature.r.0, signature.s.0)
        .map_err(|_| SignatureError::InvalidSignature)?;
    let (parsed, y_odd) = match parsed.normalize_s() {
        Some(low_s) => (low_s, !y_odd),
        None => (parsed, y_odd),
    };

    let recovery_id = RecoveryId::new(y_odd, false);
    let key = VerifyingKey::recover_from_prehash(hash.as_slice(), &parsed, recovery_id)
        .map_err(|_| SignatureError::InvalidSignature)?;
    Ok(public_key_to_address(&key))
}
