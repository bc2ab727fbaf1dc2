//! # Storage Module
//!
//! The hub's ledger state, the events it emits, and the sled database that
//! keeps both across restarts.
//!
//! ## Architecture
//!
//! ```text
//! state.rs   HubState: relays, accounts, sponsor deposits, sender nonces
//! events.rs  HubEvent and its sequenced EventRecord
//! db.rs      sled persistence with named trees
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! hub operation -> HubState (working copy) -> commit -> HubDb (state + events)
//!                                                 \
//!                                                  -> broadcast to subscribers
//! ```
//!
//! Snapshots and event rows are JSON. The values are small, alloy's
//! primitives serialize as hex strings there, and the API layer exposes the
//! same encoding.

pub mod db;
pub mod events;
pub mod state;

pub use db::{DbError, HubDb};
pub use events::{EventRecord, HubEvent};
pub use state::{Account, HubState, Relay, RelayState};
