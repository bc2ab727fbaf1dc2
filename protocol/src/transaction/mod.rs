//! # Transaction Module
//!
//! Everything the hub needs to read what a relay put on the ledger.
//!
//! ## Architecture
//!
//! ```text
//! codec.rs          RLP codec for legacy transactions and their signed envelopes
//! abi.rs            Solidity ABI of the hub entry points and the typed relay request
//! relay_request.rs  Canonical wire form and EIP-712 verification of relay requests
//! ```
//!
//! ## Lifecycle of a penalization claim
//!
//! 1. A relay signs and broadcasts a transaction ([`SignedTransaction`]).
//! 2. A reporter splits it into the six-field core and the detached
//!    signature ([`SignedTransaction::to_claim_parts`]).
//! 3. The hub decodes the core ([`RawTransaction::decode`]), recomputes the
//!    signing hash and recovers the relay.
//! 4. If the call targets the hub, its selector and arguments are decoded
//!    against [`abi::IRelayHub`] to decide whether it was legal.

pub mod abi;
pub mod codec;
pub mod relay_request;

pub use abi::{CallData, IRelayHub, RelayData, RelayRequest};
pub use codec::{CodecError, RawTransaction, SignedTransaction};
pub use relay_request::{
    parse_canonical_decimal, recover_request_signer, relay_request_domain, relay_request_hash,
    sign_relay_request, verify_relay_request_signature, RelayRequestInput, RequestError,
};
