//! # Hub Events
//!
//! Notifications emitted by committed hub operations. A rejected operation
//! emits nothing. Each event gets a sequence number from the hub state so
//! subscribers can resume with `events?since=N` after a disconnect.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// A single observable state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "PascalCase")]
pub enum HubEvent {
    Staked {
        relay: Address,
        stake: U256,
        unstake_delay: u64,
    },
    RelayAdded {
        relay: Address,
        owner: Address,
        transaction_fee: U256,
        stake: U256,
        unstake_delay: u64,
        url: String,
    },
    RelayRemoved {
        relay: Address,
        unstake_time: u64,
    },
    Unstaked {
        relay: Address,
        stake: U256,
    },
    /// `sender` is the reporter, `amount` its reward.
    Penalized {
        relay: Address,
        sender: Address,
        amount: U256,
    },
    Deposited {
        sponsor: Address,
        from: Address,
        amount: U256,
    },
    TransactionRelayed {
        relay: Address,
        from: Address,
        to: Address,
        selector: String,
        sender_nonce: U256,
    },
}

impl HubEvent {
    /// Event name as it appears in the `event` tag.
    pub fn name(&self) -> &'static str {
        match self {
            HubEvent::Staked { .. } => "Staked",
            HubEvent::RelayAdded { .. } => "RelayAdded",
            HubEvent::RelayRemoved { .. } => "RelayRemoved",
            HubEvent::Unstaked { .. } => "Unstaked",
            HubEvent::Penalized { .. } => "Penalized",
            HubEvent::Deposited { .. } => "Deposited",
            HubEvent::TransactionRelayed { .. } => "TransactionRelayed",
        }
    }

    /// The relay the event concerns, if any.
    pub fn relay(&self) -> Option<Address> {
        match self {
            HubEvent::Staked { relay, .. }
            | HubEvent::RelayAdded { relay, .. }
            | HubEvent::RelayRemoved { relay, .. }
            | HubEvent::Unstaked { relay, .. }
            | HubEvent::Penalized { relay, .. }
            | HubEvent::TransactionRelayed { relay, .. } => Some(*relay),
            HubEvent::Deposited { .. } => None,
        }
    }
}

/// An event with its position in the hub's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: u64,
    /// Ledger time of the operation that emitted it.
    pub timestamp: u64,
    #[serde(flatten)]
    pub event: HubEvent,
}
