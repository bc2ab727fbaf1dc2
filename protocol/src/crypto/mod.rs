//! # Cryptographic Primitives
//!
//! Everything the penalization engine needs to turn bytes into a proven
//! signer lives here:
//!
//! - **Keccak-256** for transaction signing hashes and address derivation.
//! - **secp256k1 ECDSA** public-key recovery from `(r, s, v)` signatures.
//! - **Relay keypairs** for tooling and tests that need to produce
//!   signatures the hub will accept.
//!
//! Nothing here is hand-rolled. Hashing comes from `alloy-primitives`, curve
//! arithmetic from `k256`; this module only pins down the exact byte layout
//! the ledger expects on either side of those calls.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{keccak256, public_key_to_address};
pub use keys::RelayKeypair;
pub use signatures::{recover_signer, Signature, SignatureError};
