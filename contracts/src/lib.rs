//! # RelayHub Contracts
//!
//! Ledger logic of the relay hub. Relay operators bond stake here to be
//! allowed to forward meta-transactions; anyone who catches a bonded relay
//! misbehaving can prove it here and take half of the bond.
//!
//! - **Relay Hub**: staking lifecycle, registration, sponsor deposits,
//!   forwarding of signed relay requests, and the event feed.
//! - **Penalizer**: repeated-nonce and illegal-transaction fraud proofs and
//!   the reward/burn split.
//! - **Dispatch**: executes signed raw ledger transactions against the hub
//!   with the sender recovered from the signature.
//!
//! ## Design Principles
//!
//! 1. All value arithmetic is checked. Overflow is an error, never a wrap.
//! 2. State transitions are explicit enum variants, not boolean flags.
//! 3. A rejected operation changes nothing, not even partially.
//! 4. Operations are serialized; the first of two racing claims wins.

pub mod dispatch;
pub mod penalizer;
pub mod relay_hub;

pub use dispatch::{execute_raw_transaction, DispatchOutcome};
pub use relay_hub::{CallContext, HubError, Receipt, RelayHub};
