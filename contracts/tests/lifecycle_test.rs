//! Integration tests for the relay lifecycle.
//!
//! Walks relays through `Unstaked -> Staked -> Registered -> Removed ->
//! Unstaked`, checks that every out-of-order step is refused without side
//! effects, and exercises the hub under concurrent callers and across a
//! database reopen.

use std::sync::{Arc, Barrier};
use std::thread;

use alloy_primitives::{Address, Bytes, TxKind, U256};

use relayhub_contracts::{CallContext, HubError, Receipt, RelayHub};
use relayhub_protocol::config::{GenesisAllocation, HubConfig, ONE_ETHER, ONE_WEEK_SECS};
use relayhub_protocol::crypto::keys::RelayKeypair;
use relayhub_protocol::storage::{HubDb, HubEvent, RelayState};
use relayhub_protocol::transaction::RawTransaction;

fn ether(n: u64) -> U256 {
    U256::from(n as u128 * ONE_ETHER)
}

fn owner() -> Address {
    Address::repeat_byte(0x0a)
}

fn config() -> HubConfig {
    HubConfig {
        genesis_balances: vec![
            GenesisAllocation {
                address: owner(),
                balance: ether(100),
            },
            GenesisAllocation {
                address: Address::repeat_byte(0x0c),
                balance: ether(100),
            },
        ],
        ..Default::default()
    }
}

fn at(sender: Address, timestamp: u64) -> CallContext {
    CallContext::new(sender, timestamp)
}

/// Run `op`, expect it to fail, and check that it changed nothing.
fn refuse(hub: &RelayHub, op: impl FnOnce(&RelayHub) -> Result<Receipt, HubError>) {
    let before = hub.snapshot();
    assert!(op(hub).is_err());
    assert_eq!(hub.snapshot(), before);
}

// ---------------------------------------------------------------------------
// Lifecycle Tests
// ---------------------------------------------------------------------------

#[test]
fn full_lifecycle_happy_path() {
    let hub = RelayHub::new(config()).unwrap();
    let relay = Address::repeat_byte(0x0b);

    // 1. Stake
    assert_eq!(hub.relay_state(&relay), RelayState::Unstaked);
    hub.stake(&at(owner(), 10), relay, ONE_WEEK_SECS, ether(1)).unwrap();
    assert_eq!(hub.relay_state(&relay), RelayState::Staked);

    // 2. Register
    hub.register_relay(&at(relay, 11), U256::from(10u64), "url.com".into())
        .unwrap();
    assert_eq!(hub.relay_state(&relay), RelayState::Registered);

    // 3. Remove
    hub.remove_relay_by_owner(&at(owner(), 12), relay).unwrap();
    assert_eq!(hub.relay_state(&relay), RelayState::Removed);

    // 4. Unstake
    hub.unstake(&at(owner(), 12 + ONE_WEEK_SECS), relay).unwrap();
    assert_eq!(hub.relay_state(&relay), RelayState::Unstaked);
    assert_eq!(hub.account(&owner()).balance, ether(100));

    let names: Vec<_> = hub
        .events_since(0, 100)
        .unwrap()
        .into_iter()
        .map(|record| record.event.name())
        .collect();
    assert_eq!(names, ["Staked", "RelayAdded", "RelayRemoved", "Unstaked"]);
}

#[test]
fn out_of_order_steps_are_refused_without_side_effects() {
    let hub = RelayHub::new(config()).unwrap();
    let relay = Address::repeat_byte(0x0b);

    // Nothing but stake is possible for an unknown relay.
    refuse(&hub, |h| h.register_relay(&at(relay, 1), U256::ZERO, String::new()));
    refuse(&hub, |h| h.remove_relay_by_owner(&at(owner(), 1), relay));
    refuse(&hub, |h| h.unstake(&at(owner(), 1), relay));

    hub.stake(&at(owner(), 2), relay, ONE_WEEK_SECS, ether(1)).unwrap();

    // Staked: cannot unstake yet, others cannot remove.
    refuse(&hub, |h| h.unstake(&at(owner(), 3), relay));
    refuse(&hub, |h| h.remove_relay_by_owner(&at(Address::repeat_byte(0x0c), 3), relay));

    hub.remove_relay_by_owner(&at(owner(), 4), relay).unwrap();

    // Removed: no top-up, no re-registration, no second removal, no early exit.
    refuse(&hub, |h| h.stake(&at(owner(), 5), relay, ONE_WEEK_SECS, ether(1)));
    refuse(&hub, |h| h.register_relay(&at(relay, 5), U256::ZERO, String::new()));
    refuse(&hub, |h| h.remove_relay_by_owner(&at(owner(), 5), relay));
    refuse(&hub, |h| h.unstake(&at(owner(), 4 + ONE_WEEK_SECS - 1), relay));
    refuse(&hub, |h| h.unstake(&at(Address::repeat_byte(0x0c), 4 + ONE_WEEK_SECS), relay));
}

#[test]
fn unstake_delay_starts_at_removal() {
    let hub = RelayHub::new(config()).unwrap();
    let relay = Address::repeat_byte(0x0b);
    hub.stake(&at(owner(), 0), relay, 2 * ONE_WEEK_SECS, ether(1)).unwrap();

    let receipt = hub.remove_relay_by_owner(&at(owner(), 500), relay).unwrap();
    assert_eq!(
        receipt.events[0].event,
        HubEvent::RelayRemoved {
            relay,
            unstake_time: 500 + 2 * ONE_WEEK_SECS
        }
    );

    let err = hub.unstake(&at(owner(), 500 + ONE_WEEK_SECS), relay).unwrap_err();
    assert!(matches!(err, HubError::UnstakeTooEarly { .. }));
    hub.unstake(&at(owner(), 500 + 2 * ONE_WEEK_SECS), relay).unwrap();
}

#[test]
fn unstaked_relay_can_change_owner() {
    let hub = RelayHub::new(config()).unwrap();
    let relay = Address::repeat_byte(0x0b);
    let second_owner = Address::repeat_byte(0x0c);

    hub.stake(&at(owner(), 0), relay, ONE_WEEK_SECS, ether(1)).unwrap();
    hub.remove_relay_by_owner(&at(owner(), 1), relay).unwrap();
    hub.unstake(&at(owner(), 1 + ONE_WEEK_SECS), relay).unwrap();

    hub.stake(&at(second_owner, 2 + ONE_WEEK_SECS), relay, ONE_WEEK_SECS, ether(2))
        .unwrap();
    let entry = hub.relay(&relay).unwrap();
    assert_eq!(entry.owner, second_owner);
    assert_eq!(entry.stake, ether(2));
    assert_eq!(entry.removal_time, 0);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn racing_reporters_only_one_wins() {
    let hub = Arc::new(RelayHub::new(config()).unwrap());
    let relay = RelayKeypair::generate();
    hub.stake(&at(owner(), 0), relay.address(), ONE_WEEK_SECS, ether(1))
        .unwrap();

    let (data, signature) = RawTransaction {
        nonce: 0,
        gas_price: U256::from(1u64),
        gas_limit: 21_000,
        to: TxKind::Call(Address::repeat_byte(0x77)),
        value: U256::from(1u64),
        data: Bytes::new(),
    }
    .sign(&relay)
    .unwrap()
    .to_claim_parts();

    const REPORTERS: usize = 8;
    let barrier = Arc::new(Barrier::new(REPORTERS));
    let handles: Vec<_> = (0..REPORTERS)
        .map(|i| {
            let hub = Arc::clone(&hub);
            let barrier = Arc::clone(&barrier);
            let data = data.clone();
            let signature = signature.clone();
            thread::spawn(move || {
                barrier.wait();
                let reporter = Address::repeat_byte(0x40 + i as u8);
                hub.penalize_illegal_transaction(&at(reporter, 1), &data, &signature)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, HubError::UnstakedRelay(_))));

    let state = hub.snapshot();
    assert_eq!(state.total_burned, ether(1) / U256::from(2u64));
    let paid: U256 = (0..REPORTERS)
        .map(|i| state.balance_of(&Address::repeat_byte(0x40 + i as u8)))
        .fold(U256::ZERO, |acc, b| acc + b);
    assert_eq!(paid, ether(1) / U256::from(2u64));
}

#[test]
fn concurrent_stakes_are_serialized() {
    let hub = Arc::new(RelayHub::new(config()).unwrap());
    let relay = Address::repeat_byte(0x0b);
    hub.stake(&at(owner(), 0), relay, ONE_WEEK_SECS, U256::ZERO).unwrap();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let hub = Arc::clone(&hub);
            thread::spawn(move || {
                hub.stake(&at(owner(), 1), relay, ONE_WEEK_SECS, ether(1))
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(hub.relay(&relay).unwrap().stake, ether(10));
    assert_eq!(hub.account(&owner()).balance, ether(90));

    let sequences: Vec<_> = hub
        .events_since(0, 100)
        .unwrap()
        .iter()
        .map(|record| record.sequence)
        .collect();
    assert_eq!(sequences, (0..11).collect::<Vec<u64>>());
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn hub_resumes_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let relay = Address::repeat_byte(0x0b);

    {
        let db = Arc::new(HubDb::open(dir.path()).unwrap());
        let hub = RelayHub::open(config(), db).unwrap();
        hub.stake(&at(owner(), 1), relay, ONE_WEEK_SECS, ether(1)).unwrap();
        hub.register_relay(&at(relay, 2), U256::from(7u64), "https://r".into())
            .unwrap();
        // A rejected call leaves nothing behind on disk either.
        assert!(hub.unstake(&at(owner(), 3), relay).is_err());
    }

    let db = Arc::new(HubDb::open(dir.path()).unwrap());
    let hub = RelayHub::open(config(), db).unwrap();
    let entry = hub.relay(&relay).unwrap();
    assert_eq!(entry.state, RelayState::Registered);
    assert_eq!(entry.url, "https://r");
    assert_eq!(hub.events_since(0, 10).unwrap().len(), 2);

    // Sequences continue where they stopped.
    let receipt = hub.remove_relay_by_owner(&at(owner(), 4), relay).unwrap();
    assert_eq!(receipt.events[0].sequence, 2);
}

#[test]
fn database_is_bound_to_one_hub() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = Arc::new(HubDb::open(dir.path()).unwrap());
    RelayHub::open(config(), Arc::clone(&db)).unwrap();

    let other = HubConfig {
        hub_address: Address::repeat_byte(0x99),
        ..config()
    };
    let err = RelayHub::open(other, db).err().expect("mismatch");
    assert!(matches!(err, HubError::Storage(_)));
}

#[tokio::test]
async fn subscribers_see_committed_events_only() {
    let hub = RelayHub::new(config()).unwrap();
    let relay = Address::repeat_byte(0x0b);
    let mut rx = hub.subscribe();

    assert!(hub.stake(&at(owner(), 0), relay, 1, ether(1)).is_err());
    hub.stake(&at(owner(), 0), relay, ONE_WEEK_SECS, ether(1)).unwrap();

    let record = rx.recv().await.unwrap();
    assert_eq!(record.sequence, 0);
    assert_eq!(record.event.name(), "Staked");
    assert!(rx.try_recv().is_err());
}

#[test]
fn invalid_config_rejected() {
    let err = RelayHub::new(HubConfig {
        chain_id: 0,
        ..Default::default()
    })
    .err()
    .expect("invalid");
    assert!(matches!(err, HubError::Config(_)));
}
