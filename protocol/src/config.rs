//! # Protocol Configuration & Constants
//!
//! Every protocol-level number lives here: signature widths, the typed-data
//! domain, and the economic floors a relay has to clear before it can serve
//! traffic. Per-deployment knobs are grouped in [`HubConfig`], which the node
//! loads from JSON and the contracts crate consumes directly.
//!
//! Changing a constant in the first half of this file changes what every
//! previously signed request or transaction hashes to. Don't.

use alloy_primitives::{address, Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full version string of the relay protocol implemented by this crate.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Signature Parameters
// ---------------------------------------------------------------------------

/// Detached signatures are `r (32) || s (32) || v (1)`.
pub const SIGNATURE_LENGTH: usize = 65;

/// Width of each ECDSA scalar (`r` and `s`) in bytes.
pub const SIGNATURE_SCALAR_LENGTH: usize = 32;

/// Recovery byte for an even `R.y`. Pre-EIP-155 legacy transactions and
/// `eth_signTypedData` both use the 27/28 convention.
pub const SIGNATURE_V_EVEN: u8 = 27;

/// Recovery byte for an odd `R.y`.
pub const SIGNATURE_V_ODD: u8 = 28;

/// Length of an account address (last 20 bytes of keccak256(pubkey)).
pub const ADDRESS_LENGTH: usize = 20;

/// Length of an ABI function selector.
pub const SELECTOR_LENGTH: usize = 4;

// ---------------------------------------------------------------------------
// Typed-Data Domain
// ---------------------------------------------------------------------------

/// EIP-712 domain name for relay requests. Wallets display this string when
/// asking the sender to sign, so it stays byte-identical to what deployed
/// clients already produce.
pub const EIP712_DOMAIN_NAME: &str = "GSN Relayed Transaction";

/// EIP-712 domain version. Bump together with any change to the
/// `RelayRequest` type layout.
pub const EIP712_DOMAIN_VERSION: &str = "1";

// ---------------------------------------------------------------------------
// Economic Defaults
// ---------------------------------------------------------------------------

/// One ether in wei.
pub const ONE_ETHER: u128 = 1_000_000_000_000_000_000;

/// One week in seconds.
pub const ONE_WEEK_SECS: u64 = 7 * 24 * 60 * 60;

/// Default minimum stake a relay needs before it may register.
pub const DEFAULT_MINIMUM_STAKE: u128 = ONE_ETHER;

/// Default minimum cooldown between `removeRelayByOwner` and `unstake`.
/// Long enough for reporters to notice and prove misbehavior that happened
/// right before the owner pulled the relay.
pub const DEFAULT_MINIMUM_UNSTAKE_DELAY: u64 = ONE_WEEK_SECS;

/// Default chain id for local devnets.
pub const DEFAULT_CHAIN_ID: u64 = 1337;

/// Default address of the hub on a fresh devnet ledger.
pub const DEFAULT_HUB_ADDRESS: Address = address!("254dffcd3277c0b1660f6d42efbb754edababc2b");

// ---------------------------------------------------------------------------
// HubConfig
// ---------------------------------------------------------------------------

/// Errors found while validating a [`HubConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("hub address must not be the zero address")]
    ZeroHubAddress,

    #[error("chain id must be non-zero")]
    ZeroChainId,

    #[error("minimum unstake delay must be non-zero")]
    ZeroUnstakeDelay,

    #[error("duplicate genesis allocation for {0}")]
    DuplicateGenesisAccount(Address),
}

/// An initial ledger balance credited when the hub state is first created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAllocation {
    pub address: Address,
    pub balance: U256,
}

/// Deployment parameters for a single hub instance.
///
/// `chain_id` and `hub_address` together form the typed-data domain, so
/// a relay request signed for one hub can never be replayed on another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Chain id bound into every relay-request signature.
    pub chain_id: u64,
    /// The hub's own ledger address. Relay transactions sent here with a
    /// permitted selector are legal; everything else is penalizable.
    pub hub_address: Address,
    /// Stake required for `registerRelay`.
    pub minimum_stake: U256,
    /// Floor on the `unstakeDelay` accepted by `stake`.
    pub minimum_unstake_delay: u64,
    /// Balances seeded into an empty ledger.
    pub genesis_balances: Vec<GenesisAllocation>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            hub_address: DEFAULT_HUB_ADDRESS,
            minimum_stake: U256::from(DEFAULT_MINIMUM_STAKE),
            minimum_unstake_delay: DEFAULT_MINIMUM_UNSTAKE_DELAY,
            genesis_balances: Vec::new(),
        }
    }
}

impl HubConfig {
    /// Parse a config from its JSON representation. Missing fields take
    /// their defaults; call [`validate`](Self::validate) afterwards.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check the invariants the hub relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hub_address == Address::ZERO {
            return Err(ConfigError::ZeroHubAddress);
        }
        if self.chain_id == 0 {
            return Err(ConfigError::ZeroChainId);
        }
        if self.minimum_unstake_delay == 0 {
            return Err(ConfigError::ZeroUnstakeDelay);
        }

        let mut seen = std::collections::HashSet::new();
        for allocation in &self.genesis_balances {
            if !seen.insert(allocation.address) {
                return Err(ConfigError::DuplicateGenesisAccount(allocation.address));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(HubConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_signature_layout() {
        assert_eq!(SIGNATURE_LENGTH, 2 * SIGNATURE_SCALAR_LENGTH + 1);
        assert_eq!(SIGNATURE_V_ODD, SIGNATURE_V_EVEN + 1);
    }

    #[test]
    fn test_zero_hub_address_rejected() {
        let config = HubConfig {
            hub_address: Address::ZERO,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroHubAddress));
    }

    #[test]
    fn test_zero_delay_rejected() {
        let config = HubConfig {
            minimum_unstake_delay: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroUnstakeDelay));
    }

    #[test]
    fn test_duplicate_genesis_rejected() {
        let account = Address::repeat_byte(0x11);
        let config = HubConfig {
            genesis_balances: vec![
                GenesisAllocation {
                    address: account,
                    balance: U256::from(1u64),
                },
                GenesisAllocation {
                    address: account,
                    balance: U256::from(2u64),
                },
            ],
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateGenesisAccount(account))
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = HubConfig::from_json(r#"{ "chain_id": 5 }"#).unwrap();
        assert_eq!(config.chain_id, 5);
        assert_eq!(config.hub_address, DEFAULT_HUB_ADDRESS);
        assert_eq!(config.minimum_unstake_delay, ONE_WEEK_SECS);
    }
}
