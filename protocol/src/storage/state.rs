//! # Hub State
//!
//! The complete ledger view the hub mutates: relay registry entries, plain
//! account balances and nonces, sponsor deposits, per-sender relay-request
//! nonces, and the running total of burned stake.
//!
//! Every operation in the hub takes the state, validates against it, then
//! applies its effects. The type is plain data so a snapshot can be cloned,
//! serialized, and swapped in one piece.
//!
//! ## Relay lifecycle
//!
//! ```text
//! Unstaked --stake--> Staked --registerRelay--> Registered
//!                       |                           |
//!                       +----removeRelayByOwner-----+--> Removed --unstake--> Unstaked
//! ```
//!
//! Penalization takes any stake-holding relay through `Removed` and back to
//! `Unstaked` in one step, its whole stake paid out or burned.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

/// Position of a relay in its staking lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelayState {
    #[default]
    Unstaked,
    Staked,
    Registered,
    Removed,
}

impl RelayState {
    /// Whether a relay in this state may still be holding a bond.
    pub fn is_bonded(&self) -> bool {
        matches!(self, Self::Staked | Self::Registered | Self::Removed)
    }
}

impl std::fmt::Display for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayState::Unstaked => write!(f, "Unstaked"),
            RelayState::Staked => write!(f, "Staked"),
            RelayState::Registered => write!(f, "Registered"),
            RelayState::Removed => write!(f, "Removed"),
        }
    }
}

/// One bonded relay operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relay {
    /// Account that staked for the relay and controls its lifecycle.
    pub owner: Address,
    pub stake: U256,
    /// Seconds between removal and the earliest unstake.
    pub unstake_delay: u64,
    /// Earliest unstake timestamp. Zero while the relay is active.
    pub removal_time: u64,
    pub state: RelayState,
    /// Fee advertised at the last registration.
    pub transaction_fee: U256,
    pub url: String,
}

impl Relay {
    /// A relay can be penalized only while it still holds a bond.
    pub fn holds_stake(&self) -> bool {
        self.state.is_bonded() && !self.stake.is_zero()
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// A plain ledger account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub balance: U256,
    /// Next expected raw-transaction nonce.
    pub nonce: u64,
}

impl Account {
    pub fn with_balance(balance: U256) -> Self {
        Self { balance, nonce: 0 }
    }
}

// ---------------------------------------------------------------------------
// HubState
// ---------------------------------------------------------------------------

/// Everything the hub owns, as one serializable value.
///
/// Ordered maps keep the JSON snapshot byte-stable for identical states.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubState {
    pub relays: BTreeMap<Address, Relay>,
    pub accounts: BTreeMap<Address, Account>,
    /// Sponsor deposits held by the hub, credited via `depositFor`.
    pub deposits: BTreeMap<Address, U256>,
    /// Next expected `senderNonce` per relay-request sender.
    pub sender_nonces: BTreeMap<Address, U256>,
    /// Stake destroyed by penalizations so far.
    pub total_burned: U256,
    /// Number of events emitted so far; the next event gets this sequence.
    pub event_count: u64,
}

impl HubState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relay(&self, address: &Address) -> Option<&Relay> {
        self.relays.get(address)
    }

    /// The relay's state, `Unstaked` when the hub has never seen it.
    pub fn relay_state(&self, address: &Address) -> RelayState {
        self.relays
            .get(address)
            .map(|relay| relay.state)
            .unwrap_or_default()
    }

    pub fn account(&self, address: &Address) -> Account {
        self.accounts.get(address).cloned().unwrap_or_default()
    }

    /// Mutable account entry, created empty on first touch.
    pub fn account_mut(&mut self, address: Address) -> &mut Account {
        self.accounts.entry(address).or_default()
    }

    pub fn balance_of(&self, address: &Address) -> U256 {
        self.accounts
            .get(address)
            .map(|account| account.balance)
            .unwrap_or_default()
    }

    pub fn deposit_of(&self, address: &Address) -> U256 {
        self.deposits.get(address).copied().unwrap_or_default()
    }

    pub fn sender_nonce(&self, sender: &Address) -> U256 {
        self.sender_nonces.get(sender).copied().unwrap_or_default()
    }

    pub fn registered_relay_count(&self) -> usize {
        self.relays
            .values()
            .filter(|relay| relay.state == RelayState::Registered)
            .count()
    }

    /// Sum of all value the hub is accountable for: balances, deposits,
    /// stakes and burned stake. Constant across every hub operation except
    /// genesis credits.
    pub fn total_value(&self) -> U256 {
        let balances = self.accounts.values().map(|a| a.balance);
        let deposits = self.deposits.values().copied();
        let stakes = self.relays.values().map(|r| r.stake);
        balances
            .chain(deposits)
            .chain(stakes)
            .fold(self.total_burned, |acc, v| acc.saturating_add(v))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_relay_is_unstaked() {
        let state = HubState::new();
        assert_eq!(state.relay_state(&Address::repeat_byte(1)), RelayState::Unstaked);
        assert!(state.relay(&Address::repeat_byte(1)).is_none());
    }

    #[test]
    fn holds_stake_requires_bond_and_value() {
        let mut relay = Relay {
            stake: U256::from(5u64),
            state: RelayState::Staked,
            ..Default::default()
        };
        assert!(relay.holds_stake());

        relay.state = RelayState::Removed;
        assert!(relay.holds_stake());

        relay.stake = U256::ZERO;
        assert!(!relay.holds_stake());

        relay.stake = U256::from(5u64);
        relay.state = RelayState::Unstaked;
        assert!(!relay.holds_stake());
    }

    #[test]
    fn account_mut_creates_entry() {
        let mut state = HubState::new();
        let who = Address::repeat_byte(7);
        assert_eq!(state.balance_of(&who), U256::ZERO);
        state.account_mut(who).balance = U256::from(42u64);
        assert_eq!(state.balance_of(&who), U256::from(42u64));
        assert_eq!(state.account(&who).nonce, 0);
    }

    #[test]
    fn registered_count_ignores_other_states() {
        let mut state = HubState::new();
        for (i, s) in [RelayState::Staked, RelayState::Registered, RelayState::Registered, RelayState::Removed]
            .into_iter()
            .enumerate()
        {
            state.relays.insert(
                Address::repeat_byte(i as u8 + 1),
                Relay {
                    state: s,
                    ..Default::default()
                },
            );
        }
        assert_eq!(state.registered_relay_count(), 2);
    }

    #[test]
    fn total_value_sums_every_bucket() {
        let mut state = HubState::new();
        state.account_mut(Address::repeat_byte(1)).balance = U256::from(10u64);
        state.deposits.insert(Address::repeat_byte(2), U256::from(20u64));
        state.relays.insert(
            Address::repeat_byte(3),
            Relay {
                stake: U256::from(30u64),
                state: RelayState::Staked,
                ..Default::default()
            },
        );
        state.total_burned = U256::from(40u64);
        assert_eq!(state.total_value(), U256::from(100u64));
    }

    #[test]
    fn snapshot_json_roundtrip() {
        let mut state = HubState::new();
        state.account_mut(Address::repeat_byte(9)).balance = U256::from(1u64);
        state.relays.insert(
            Address::repeat_byte(8),
            Relay {
                owner: Address::repeat_byte(9),
                stake: U256::from(2u64),
                unstake_delay: 3600,
                state: RelayState::Registered,
                url: "https://relay.example".into(),
                ..Default::default()
            },
        );
        state.sender_nonces.insert(Address::repeat_byte(5), U256::from(3u64));
        let json = serde_json::to_vec(&state).unwrap();
        let restored: HubState = serde_json::from_slice(&json).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn state_display() {
        assert_eq!(RelayState::Registered.to_string(), "Registered");
        assert_eq!(RelayState::default().to_string(), "Unstaked");
    }
}
