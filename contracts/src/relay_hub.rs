//! # Relay Hub Contract
//!
//! The ledger-resident registry of relay operators. A relay's owner bonds
//! stake for it, the relay advertises itself, and later the owner removes
//! it and withdraws the stake once the unstake delay has passed:
//!
//! 1. **Stake**: the owner moves value from its balance into the relay's
//!    bond (`Unstaked -> Staked`, or top-up while staked or registered).
//! 2. **Register**: the relay itself announces its fee and URL
//!    (`Staked -> Registered`; re-registering refreshes the announcement).
//! 3. **Remove**: the owner starts the cooldown (`-> Removed`).
//! 4. **Unstake**: after the cooldown the bond returns to the owner
//!    (`Removed -> Unstaked`).
//!
//! The hub also forwards signed relay requests (`relayCall`), holds sponsor
//! deposits, and hosts the penalization engine (see [`crate::penalizer`]).
//!
//! ## Atomicity
//!
//! Every operation runs against a private copy of the state under the hub
//! lock. Validation failures return before the copy is published, so a
//! rejected call leaves balances, stakes and registry entries untouched.
//! Successful calls persist the new snapshot and its events in one sled
//! transaction, swap the copy in, flush, then notify subscribers, all
//! before the lock is released. Operations are therefore totally ordered:
//! when two reporters race to penalize one relay, whichever takes the lock
//! first wins and the other sees `UnstakedRelay`.
//!
//! A hub without a database keeps only its latest [`MEMORY_LOG_CAPACITY`]
//! events in memory.

use std::collections::VecDeque;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use alloy_sol_types::Eip712Domain;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use relayhub_protocol::config::{ConfigError, HubConfig};
use relayhub_protocol::crypto::signatures::SignatureError;
use relayhub_protocol::storage::{
    Account, DbError, EventRecord, HubDb, HubEvent, HubState, Relay, RelayState,
};
use relayhub_protocol::transaction::{
    recover_request_signer, relay_request_domain, CodecError, RelayRequest, RequestError,
};

/// Capacity of the live event channel. Slow subscribers past this many
/// events observe `Lagged` and can catch up from the persisted log.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Events kept by a hub without a database; older ones are dropped first.
pub const MEMORY_LOG_CAPACITY: usize = 4096;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Every reason the hub can reject an operation.
#[derive(Debug, Error)]
pub enum HubError {
    /// Input bytes do not decode to the expected structure.
    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),

    /// A relay-request field is not in canonical form.
    #[error(transparent)]
    InvalidFieldEncoding(#[from] RequestError),

    /// A signature does not recover to any address.
    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    /// The two transactions of a repeated-nonce proof have different signers.
    #[error("different signer: {first} vs {second}")]
    DifferentSigner { first: Address, second: Address },

    /// The two transactions of a repeated-nonce proof have different nonces.
    #[error("different nonce: {first} vs {second}")]
    DifferentNonce { first: u64, second: u64 },

    /// The two transactions agree on gas limit, destination, value and data.
    #[error("transactions are identical apart from gas price")]
    IdenticalTransaction,

    /// The accused transaction is something a relay is allowed to send.
    #[error("transaction is a legal relay transaction")]
    LegalRelayTransaction,

    /// The accused relay holds no stake.
    #[error("relay {0} holds no stake")]
    UnstakedRelay(Address),

    /// The caller is not allowed to perform this operation.
    #[error("unauthorized: caller {caller} is not {expected}")]
    Unauthorized { caller: Address, expected: Address },

    /// The relay is not in a state that allows this operation.
    #[error("invalid state transition: relay is {current}, expected {expected}")]
    InvalidState { current: String, expected: String },

    #[error("unstake delay {requested}s is below the minimum of {minimum}s")]
    DelayTooShort { requested: u64, minimum: u64 },

    #[error("stake {stake} is below the minimum of {minimum}")]
    InsufficientStake { stake: U256, minimum: U256 },

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: U256, available: U256 },

    #[error("cannot unstake before {removal_time} (now {now})")]
    UnstakeTooEarly { now: u64, removal_time: u64 },

    /// A relay's own key cannot stake for it.
    #[error("relay cannot stake for itself")]
    SelfStake,

    #[error("nonce mismatch: expected {expected}, got {actual}")]
    NonceMismatch { expected: U256, actual: U256 },

    /// A relay request was signed by someone other than its sender.
    #[error("relay request signed by {recovered}, not sender {sender}")]
    RequestSignerMismatch { sender: Address, recovered: Address },

    #[error("relay {0} is not registered")]
    RelayNotRegistered(Address),

    /// The call is well-formed but the hub does not serve it.
    #[error("unsupported call: {0}")]
    UnsupportedCall(String),

    #[error("arithmetic overflow")]
    Overflow,

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

impl From<CodecError> for HubError {
    fn from(err: CodecError) -> Self {
        HubError::MalformedEncoding(err.to_string())
    }
}

impl From<alloy_sol_types::Error> for HubError {
    fn from(err: alloy_sol_types::Error) -> Self {
        HubError::MalformedEncoding(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Who is calling and when, as the ledger sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub sender: Address,
    /// Ledger time in seconds.
    pub timestamp: u64,
}

impl CallContext {
    pub fn new(sender: Address, timestamp: u64) -> Self {
        Self { sender, timestamp }
    }
}

/// Result of a committed operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub events: Vec<EventRecord>,
}

impl Receipt {
    pub fn contains(&self, name: &str) -> bool {
        self.events.iter().any(|record| record.event.name() == name)
    }
}

/// Working copy handed to an operation body.
pub(crate) struct Txn<'a> {
    pub(crate) state: &'a mut HubState,
    pub(crate) now: u64,
    events: Vec<HubEvent>,
}

impl Txn<'_> {
    pub(crate) fn emit(&mut self, event: HubEvent) {
        self.events.push(event);
    }

    /// Move `amount` out of `from`'s balance.
    pub(crate) fn debit(&mut self, from: Address, amount: U256) -> Result<(), HubError> {
        let account = self.state.account_mut(from);
        account.balance = account.balance.checked_sub(amount).ok_or(
            HubError::InsufficientBalance {
                requested: amount,
                available: account.balance,
            },
        )?;
        Ok(())
    }

    pub(crate) fn credit(&mut self, to: Address, amount: U256) -> Result<(), HubError> {
        let account = self.state.account_mut(to);
        account.balance = account.balance.checked_add(amount).ok_or(HubError::Overflow)?;
        Ok(())
    }
}

struct Inner {
    state: HubState,
    /// Most recent events of a hub without a database.
    log: VecDeque<EventRecord>,
}

// ---------------------------------------------------------------------------
// RelayHub
// ---------------------------------------------------------------------------

/// The relay hub: registry, deposits, forwarding and penalization.
pub struct RelayHub {
    config: HubConfig,
    domain: Eip712Domain,
    inner: Mutex<Inner>,
    db: Option<Arc<HubDb>>,
    events: broadcast::Sender<EventRecord>,
}

impl RelayHub {
    /// An in-memory hub seeded with the configured genesis balances.
    pub fn new(config: HubConfig) -> Result<Self, HubError> {
        config.validate()?;
        let state = genesis_state(&config)?;
        Ok(Self::assemble(config, state, None))
    }

    /// A hub backed by `db`. Resumes from the stored snapshot when there is
    /// one, otherwise writes the genesis state first.
    pub fn open(config: HubConfig, db: Arc<HubDb>) -> Result<Self, HubError> {
        config.validate()?;
        db.bind_hub(config.hub_address)?;

        let state = match db.load_snapshot()? {
            Some(state) => {
                info!(
                    relays = state.relays.len(),
                    events = state.event_count,
                    "resumed hub state from database"
                );
                state
            }
            None => {
                let state = genesis_state(&config)?;
                db.commit(&state, &[])?;
                db.flush()?;
                info!(
                    accounts = state.accounts.len(),
                    "initialized hub state from genesis"
                );
                state
            }
        };
        Ok(Self::assemble(config, state, Some(db)))
    }

    fn assemble(config: HubConfig, state: HubState, db: Option<Arc<HubDb>>) -> Self {
        let domain = relay_request_domain(config.chain_id, config.hub_address);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            domain,
            inner: Mutex::new(Inner {
                state,
                log: VecDeque::new(),
            }),
            db,
            events,
        }
    }

    // -- Accessors ----------------------------------------------------------

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn address(&self) -> Address {
        self.config.hub_address
    }

    /// The EIP-712 domain relay requests must be signed under.
    pub fn domain(&self) -> &Eip712Domain {
        &self.domain
    }

    pub fn relay(&self, address: &Address) -> Option<Relay> {
        self.inner.lock().state.relay(address).cloned()
    }

    pub fn relay_state(&self, address: &Address) -> RelayState {
        self.inner.lock().state.relay_state(address)
    }

    pub fn account(&self, address: &Address) -> Account {
        self.inner.lock().state.account(address)
    }

    /// Sponsor deposit held for `target`.
    pub fn balance_of(&self, target: &Address) -> U256 {
        self.inner.lock().state.deposit_of(target)
    }

    /// Next `senderNonce` the hub expects from `sender`.
    pub fn get_nonce(&self, sender: &Address) -> U256 {
        self.inner.lock().state.sender_nonce(sender)
    }

    /// A consistent copy of the whole state.
    pub fn snapshot(&self) -> HubState {
        self.inner.lock().state.clone()
    }

    /// Live feed of committed events.
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.events.subscribe()
    }

    /// Committed events with `sequence >= since`, oldest first.
    pub fn events_since(&self, since: u64, limit: usize) -> Result<Vec<EventRecord>, HubError> {
        if let Some(db) = &self.db {
            return Ok(db.events_since(since, limit)?);
        }
        let inner = self.inner.lock();
        Ok(inner
            .log
            .iter()
            .filter(|record| record.sequence >= since)
            .take(limit)
            .cloned()
            .collect())
    }

    // -- Execution ----------------------------------------------------------

    /// Run `body` against a copy of the state and publish the copy only if
    /// it succeeds and persists.
    pub(crate) fn execute<T>(
        &self,
        operation: &'static str,
        ctx: &CallContext,
        body: impl FnOnce(&mut Txn<'_>) -> Result<T, HubError>,
    ) -> Result<(T, Receipt), HubError> {
        let mut inner = self.inner.lock();
        let mut working = inner.state.clone();

        let mut txn = Txn {
            state: &mut working,
            now: ctx.timestamp,
            events: Vec::new(),
        };
        let output = match body(&mut txn) {
            Ok(output) => output,
            Err(err) => {
                debug!(operation, caller = %ctx.sender, error = %err, "rejected hub operation");
                return Err(err);
            }
        };
        let emitted = std::mem::take(&mut txn.events);

        let mut records = Vec::with_capacity(emitted.len());
        for event in emitted {
            let sequence = working.event_count;
            working.event_count = sequence.checked_add(1).ok_or(HubError::Overflow)?;
            records.push(EventRecord {
                sequence,
                timestamp: ctx.timestamp,
                event,
            });
        }

        match &self.db {
            Some(db) => db.commit(&working, &records)?,
            None => {
                inner.log.extend(records.iter().cloned());
                let excess = inner.log.len().saturating_sub(MEMORY_LOG_CAPACITY);
                inner.log.drain(..excess);
            }
        }
        inner.state = working;

        // The commit already stands; a failed flush only delays durability.
        if let Some(db) = &self.db {
            if let Err(err) = db.flush() {
                warn!(operation, error = %err, "committed hub operation not flushed to disk");
            }
        }

        for record in &records {
            // No subscribers is fine.
            let _ = self.events.send(record.clone());
        }
        Ok((output, Receipt { events: records }))
    }

    // -- Registry -----------------------------------------------------------

    /// Bond `amount` from the caller's balance to `relay`.
    ///
    /// The caller becomes the owner of an unstaked relay; for a staked or
    /// registered relay only the existing owner may add stake. The unstake
    /// delay never shrinks.
    pub fn stake(
        &self,
        ctx: &CallContext,
        relay: Address,
        unstake_delay: u64,
        amount: U256,
    ) -> Result<Receipt, HubError> {
        let minimum = self.config.minimum_unstake_delay;
        let (_, receipt) = self.execute("stake", ctx, |txn| {
            if relay == ctx.sender {
                return Err(HubError::SelfStake);
            }
            if unstake_delay < minimum {
                return Err(HubError::DelayTooShort {
                    requested: unstake_delay,
                    minimum,
                });
            }

            let current = txn.state.relay(&relay).cloned().unwrap_or_default();
            let mut next = match current.state {
                RelayState::Unstaked => Relay {
                    owner: ctx.sender,
                    state: RelayState::Staked,
                    ..Default::default()
                },
                RelayState::Staked | RelayState::Registered => {
                    if current.owner != ctx.sender {
                        return Err(HubError::Unauthorized {
                            caller: ctx.sender,
                            expected: current.owner,
                        });
                    }
                    current
                }
                RelayState::Removed => {
                    return Err(HubError::InvalidState {
                        current: RelayState::Removed.to_string(),
                        expected: "Unstaked, Staked or Registered".into(),
                    })
                }
            };

            txn.debit(ctx.sender, amount)?;
            next.stake = next.stake.checked_add(amount).ok_or(HubError::Overflow)?;
            next.unstake_delay = next.unstake_delay.max(unstake_delay);

            txn.emit(HubEvent::Staked {
                relay,
                stake: next.stake,
                unstake_delay: next.unstake_delay,
            });
            txn.state.relays.insert(relay, next);
            Ok(())
        })?;

        info!(%relay, owner = %ctx.sender, %amount, "relay staked");
        Ok(receipt)
    }

    /// The calling relay announces itself with a fee and URL.
    pub fn register_relay(
        &self,
        ctx: &CallContext,
        transaction_fee: U256,
        url: String,
    ) -> Result<Receipt, HubError> {
        let minimum = self.config.minimum_stake;
        let relay = ctx.sender;
        let (_, receipt) = self.execute("registerRelay", ctx, |txn| {
            let Some(entry) = txn.state.relays.get_mut(&relay) else {
                return Err(HubError::InvalidState {
                    current: RelayState::Unstaked.to_string(),
                    expected: "Staked or Registered".into(),
                });
            };
            if !matches!(entry.state, RelayState::Staked | RelayState::Registered) {
                return Err(HubError::InvalidState {
                    current: entry.state.to_string(),
                    expected: "Staked or Registered".into(),
                });
            }
            if entry.stake < minimum {
                return Err(HubError::InsufficientStake {
                    stake: entry.stake,
                    minimum,
                });
            }

            entry.state = RelayState::Registered;
            entry.transaction_fee = transaction_fee;
            entry.url = url;

            let event = HubEvent::RelayAdded {
                relay,
                owner: entry.owner,
                transaction_fee,
                stake: entry.stake,
                unstake_delay: entry.unstake_delay,
                url: entry.url.clone(),
            };
            txn.emit(event);
            Ok(())
        })?;

        info!(%relay, %transaction_fee, "relay registered");
        Ok(receipt)
    }

    /// The owner takes `relay` out of service and starts its unstake delay.
    pub fn remove_relay_by_owner(
        &self,
        ctx: &CallContext,
        relay: Address,
    ) -> Result<Receipt, HubError> {
        let (unstake_time, receipt) = self.execute("removeRelayByOwner", ctx, |txn| {
            let entry = owned_relay(txn.state, &relay, ctx.sender)?;
            if !matches!(entry.state, RelayState::Staked | RelayState::Registered) {
                return Err(HubError::InvalidState {
                    current: entry.state.to_string(),
                    expected: "Staked or Registered".into(),
                });
            }

            let unstake_time = txn
                .now
                .checked_add(entry.unstake_delay)
                .ok_or(HubError::Overflow)?;
            entry.state = RelayState::Removed;
            entry.removal_time = unstake_time;

            txn.emit(HubEvent::RelayRemoved {
                relay,
                unstake_time,
            });
            Ok(unstake_time)
        })?;

        info!(%relay, unstake_time, "relay removed by owner");
        Ok(receipt)
    }

    /// Return a removed relay's remaining stake to its owner.
    pub fn unstake(&self, ctx: &CallContext, relay: Address) -> Result<Receipt, HubError> {
        let (amount, receipt) = self.execute("unstake", ctx, |txn| {
            let now = txn.now;
            let entry = owned_relay(txn.state, &relay, ctx.sender)?;
            if entry.state != RelayState::Removed {
                return Err(HubError::InvalidState {
                    current: entry.state.to_string(),
                    expected: RelayState::Removed.to_string(),
                });
            }
            if now < entry.removal_time {
                return Err(HubError::UnstakeTooEarly {
                    now,
                    removal_time: entry.removal_time,
                });
            }

            let amount = entry.stake;
            let owner = entry.owner;
            entry.stake = U256::ZERO;
            entry.state = RelayState::Unstaked;

            txn.credit(owner, amount)?;
            txn.emit(HubEvent::Unstaked {
                relay,
                stake: amount,
            });
            Ok(amount)
        })?;

        info!(%relay, %amount, "relay unstaked");
        Ok(receipt)
    }

    // -- Deposits & forwarding ---------------------------------------------

    /// Move `amount` from the caller's balance into `target`'s sponsor deposit.
    pub fn deposit_for(
        &self,
        ctx: &CallContext,
        target: Address,
        amount: U256,
    ) -> Result<Receipt, HubError> {
        let (_, receipt) = self.execute("depositFor", ctx, |txn| {
            txn.debit(ctx.sender, amount)?;
            let deposit = txn.state.deposits.entry(target).or_default();
            *deposit = deposit.checked_add(amount).ok_or(HubError::Overflow)?;
            txn.emit(HubEvent::Deposited {
                sponsor: target,
                from: ctx.sender,
                amount,
            });
            Ok(())
        })?;

        debug!(sponsor = %target, from = %ctx.sender, %amount, "deposit credited");
        Ok(receipt)
    }

    /// Forward a sender-signed request through the calling relay.
    ///
    /// The caller must be the request's registered relay, the request must
    /// be signed by its sender under this hub's domain, and its nonce must be
    /// the next one expected for that sender. `approval_data` is accepted for
    /// call compatibility; no approval policy is applied.
    pub fn relay_call(
        &self,
        ctx: &CallContext,
        request: &RelayRequest,
        signature: &[u8],
        _approval_data: &[u8],
    ) -> Result<Receipt, HubError> {
        let relay = request.relayData.relayAddress;
        let sender = request.relayData.senderAccount;
        let target = request.callData.target;

        let (nonce, receipt) = self.execute("relayCall", ctx, |txn| {
            if ctx.sender != relay {
                return Err(HubError::Unauthorized {
                    caller: ctx.sender,
                    expected: relay,
                });
            }
            if txn.state.relay_state(&relay) != RelayState::Registered {
                return Err(HubError::RelayNotRegistered(relay));
            }

            let recovered = recover_request_signer(request, signature, &self.domain)?;
            if recovered != sender {
                return Err(HubError::RequestSignerMismatch { sender, recovered });
            }

            let expected = txn.state.sender_nonce(&sender);
            let actual = request.relayData.senderNonce;
            if actual != expected {
                return Err(HubError::NonceMismatch { expected, actual });
            }
            let next = expected.checked_add(U256::from(1u64)).ok_or(HubError::Overflow)?;
            txn.state.sender_nonces.insert(sender, next);

            txn.emit(HubEvent::TransactionRelayed {
                relay,
                from: sender,
                to: target,
                selector: selector_hex(&request.callData.encodedFunction),
                sender_nonce: actual,
            });
            Ok(actual)
        })?;

        info!(%relay, %sender, %target, %nonce, "relayed call");
        Ok(receipt)
    }

    // -- Ledger -------------------------------------------------------------

    /// Consume the next ledger nonce of `sender`, which must equal `nonce`.
    pub fn use_account_nonce(
        &self,
        ctx: &CallContext,
        nonce: u64,
    ) -> Result<(), HubError> {
        self.execute("useAccountNonce", ctx, |txn| {
            let account = txn.state.account_mut(ctx.sender);
            if account.nonce != nonce {
                return Err(HubError::NonceMismatch {
                    expected: U256::from(account.nonce),
                    actual: U256::from(nonce),
                });
            }
            account.nonce = account.nonce.checked_add(1).ok_or(HubError::Overflow)?;
            Ok(())
        })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn genesis_state(config: &HubConfig) -> Result<HubState, HubError> {
    let mut state = HubState::new();
    for allocation in &config.genesis_balances {
        let account = state.account_mut(allocation.address);
        account.balance = account
            .balance
            .checked_add(allocation.balance)
            .ok_or(HubError::Overflow)?;
    }
    Ok(state)
}

/// The relay entry, provided `caller` owns it.
fn owned_relay<'a>(
    state: &'a mut HubState,
    relay: &Address,
    caller: Address,
) -> Result<&'a mut Relay, HubError> {
    match state.relays.get_mut(relay) {
        Some(entry) if entry.owner == caller => Ok(entry),
        Some(entry) => Err(HubError::Unauthorized {
            caller,
            expected: entry.owner,
        }),
        None => Err(HubError::InvalidState {
            current: RelayState::Unstaked.to_string(),
            expected: "Staked, Registered or Removed".into(),
        }),
    }
}

fn selector_hex(data: &[u8]) -> String {
    let len = data.len().min(4);
    format!("0x{}", hex::encode(&data[..len]))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
