//! # Penalization Engine
//!
//! Anyone may prove that a bonded relay misbehaved and collect half of its
//! stake. Two proofs are accepted:
//!
//! - **Repeated nonce.** Two transactions signed by the same relay at the
//!   same nonce that differ in gas limit, destination, value or data. A
//!   higher gas price alone is a legitimate rebroadcast, not a conflict.
//! - **Illegal transaction.** One transaction signed by the relay that is
//!   not one of the hub calls a relay is allowed to make: `registerRelay`,
//!   `depositFor`, or a `relayCall` whose embedded request carries a valid
//!   sender signature.
//!
//! Both proofs first require the accused signer to hold a stake, so an
//! unbonded signer is answered with `UnstakedRelay` whatever the proof.
//!
//! A successful proof pays `stake / 2` (rounded down) to the reporter and
//! burns the rest. A relay that was still `Staked` or `Registered` is removed
//! on the spot (`RelayRemoved` with the current time). With nothing left to
//! withdraw the entry is then dropped, so the relay is `Unstaked` again: it
//! cannot be penalized a second time, and anyone may stake it anew at once.

use alloy_primitives::{Address, TxKind, U256};
use alloy_sol_types::SolCall;
use tracing::{debug, info};

use relayhub_protocol::crypto::signatures::Signature;
use relayhub_protocol::storage::{HubEvent, HubState, RelayState};
use relayhub_protocol::transaction::abi::IRelayHub;
use relayhub_protocol::transaction::{verify_relay_request_signature, RawTransaction};

use crate::relay_hub::{CallContext, HubError, Receipt, RelayHub, Txn};

/// A decoded claim transaction together with the relay that signed it.
struct SignedClaim {
    tx: RawTransaction,
    signer: Address,
}

fn decode_claim(unsigned_tx: &[u8], signature: &[u8]) -> Result<SignedClaim, HubError> {
    let tx = RawTransaction::decode(unsigned_tx)?;
    let signature = Signature::from_bytes(signature)?;
    let signer = tx.recover_signer(&signature)?;
    Ok(SignedClaim { tx, signer })
}

impl RelayHub {
    /// Penalize a relay that signed two conflicting transactions at one nonce.
    ///
    /// `unsigned_tx*` are the six-field RLP cores and `signature*` the
    /// detached 65-byte signatures over them. The caller is the reporter.
    pub fn penalize_repeated_nonce(
        &self,
        ctx: &CallContext,
        unsigned_tx1: &[u8],
        signature1: &[u8],
        unsigned_tx2: &[u8],
        signature2: &[u8],
    ) -> Result<Receipt, HubError> {
        let first = decode_claim(unsigned_tx1, signature1)?;
        let second = decode_claim(unsigned_tx2, signature2)?;

        if first.signer != second.signer {
            debug!(first = %first.signer, second = %second.signer, "repeated-nonce claim with different signers");
            return Err(HubError::DifferentSigner {
                first: first.signer,
                second: second.signer,
            });
        }

        let relay = first.signer;
        let (reward, receipt) = self.execute("penalizeRepeatedNonce", ctx, |txn| {
            ensure_stake(txn.state, relay)?;
            if first.tx.nonce != second.tx.nonce {
                return Err(HubError::DifferentNonce {
                    first: first.tx.nonce,
                    second: second.tx.nonce,
                });
            }
            if !first.tx.conflicts_with(&second.tx) {
                return Err(HubError::IdenticalTransaction);
            }
            penalize(txn, relay, ctx.sender)
        })?;
        info!(%relay, reporter = %ctx.sender, %reward, nonce = first.tx.nonce, "relay penalized for repeated nonce");
        Ok(receipt)
    }

    /// Penalize a relay that signed a transaction it had no business signing.
    pub fn penalize_illegal_transaction(
        &self,
        ctx: &CallContext,
        unsigned_tx: &[u8],
        signature: &[u8],
    ) -> Result<Receipt, HubError> {
        let claim = decode_claim(unsigned_tx, signature)?;
        let relay = claim.signer;

        let (reward, receipt) = self.execute("penalizeIllegalTransaction", ctx, |txn| {
            ensure_stake(txn.state, relay)?;
            if self.is_legal_relay_transaction(&claim.tx) {
                return Err(HubError::LegalRelayTransaction);
            }
            penalize(txn, relay, ctx.sender)
        })?;
        info!(%relay, reporter = %ctx.sender, %reward, "relay penalized for illegal transaction");
        Ok(receipt)
    }

    /// Whether `tx` is a call a relay is permitted to make with its key.
    pub fn is_legal_relay_transaction(&self, tx: &RawTransaction) -> bool {
        if tx.to != TxKind::Call(self.address()) {
            return false;
        }
        let Some(selector) = tx.selector() else {
            return false;
        };
        if selector == IRelayHub::registerRelayCall::SELECTOR
            || selector == IRelayHub::depositForCall::SELECTOR
        {
            return true;
        }
        if selector != IRelayHub::relayCallCall::SELECTOR {
            return false;
        }
        match IRelayHub::relayCallCall::abi_decode(&tx.data, true) {
            Ok(call) => {
                verify_relay_request_signature(&call.relayRequest, &call.signature, self.domain())
            }
            Err(_) => false,
        }
    }
}

fn ensure_stake(state: &HubState, relay: Address) -> Result<(), HubError> {
    if state.relay(&relay).is_some_and(|entry| entry.holds_stake()) {
        Ok(())
    } else {
        Err(HubError::UnstakedRelay(relay))
    }
}

/// Split the relay's stake between the reporter and the burn, then drop it.
fn penalize(txn: &mut Txn<'_>, relay: Address, reporter: Address) -> Result<U256, HubError> {
    let now = txn.now;
    ensure_stake(txn.state, relay)?;
    let Some(entry) = txn.state.relays.remove(&relay) else {
        return Err(HubError::UnstakedRelay(relay));
    };

    let stake = entry.stake;
    let reward = stake / U256::from(2u64);
    let burned = stake - reward;
    let was_active = matches!(entry.state, RelayState::Staked | RelayState::Registered);

    txn.state.total_burned = txn
        .state
        .total_burned
        .checked_add(burned)
        .ok_or(HubError::Overflow)?;
    txn.credit(reporter, reward)?;

    if was_active {
        txn.emit(HubEvent::RelayRemoved {
            relay,
            unstake_time: now,
        });
    }
    txn.emit(HubEvent::Penalized {
        relay,
        sender: reporter,
        amount: reward,
    });
    Ok(reward)
}
