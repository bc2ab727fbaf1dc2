// Copyright (c) 2026 RelayHub Contributors. MIT License.
// See LICENSE for details.

//! # RelayHub Protocol Core Library
//!
//! Shared building blocks of a relay hub: the ledger where relay operators
//! bond stake to forward meta-transactions, and where anyone can prove that
//! a relay misbehaved and collect half of its bond.
//!
//! Everything here is pure data and pure functions. The state machine that
//! mutates the ledger lives in `relayhub-contracts`; the server that exposes
//! it lives in `relayhub-node`.
//!
//! ## Architecture
//!
//! - **crypto**: Keccak-256, secp256k1 keys, signature parsing and signer
//!   recovery.
//! - **transaction**: RLP codec for legacy transactions, the hub's ABI, and
//!   EIP-712 relay requests.
//! - **storage**: Hub state, events, and sled persistence.
//! - **config**: Protocol constants and hub configuration.
//!
//! ## Ground rules
//!
//! 1. Nothing here panics on untrusted bytes.
//! 2. Every encoding that feeds a hash is canonical. Two spellings of one
//!    value are rejected, never normalized.
//! 3. Signatures are judged by the address they recover to, nothing else.

pub mod config;
pub mod crypto;
pub mod storage;
pub mod transaction;
