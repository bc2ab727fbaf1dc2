//! # Raw-Transaction Dispatch
//!
//! Entry point for signed ledger transactions addressed to the hub. The
//! sender is never taken from the caller: it is recovered from the
//! transaction signature, so nobody can stake, unstake or report on behalf
//! of a key they do not hold.
//!
//! Ledger semantics apply to the account nonce. Once a transaction is
//! admitted (valid signature, addressed to the hub, expected nonce) its
//! nonce is consumed even if the hub call it carries is then rejected.
//! The call itself stays all-or-nothing.

use alloy_primitives::{Address, TxKind, B256, U256};
use alloy_sol_types::SolInterface;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use relayhub_protocol::transaction::abi::IRelayHub::IRelayHubCalls;
use relayhub_protocol::transaction::SignedTransaction;

use crate::relay_hub::{CallContext, HubError, Receipt, RelayHub};

/// What an admitted transaction did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub tx_hash: B256,
    pub sender: Address,
    /// Name of the hub function that was invoked.
    pub function: String,
    pub receipt: Receipt,
}

/// Decode, authenticate and execute a signed raw transaction at time `now`.
pub fn execute_raw_transaction(
    hub: &RelayHub,
    raw: &[u8],
    now: u64,
) -> Result<DispatchOutcome, HubError> {
    let envelope = SignedTransaction::decode(raw)?;
    let sender = envelope.recover_signer()?;
    let tx_hash = envelope.hash();
    let tx = &envelope.tx;

    if tx.to != TxKind::Call(hub.address()) {
        return Err(HubError::UnsupportedCall(format!(
            "transaction is not addressed to hub {}",
            hub.address()
        )));
    }

    let ctx = CallContext::new(sender, now);
    hub.use_account_nonce(&ctx, tx.nonce)?;

    let call = IRelayHubCalls::abi_decode(&tx.data, true)?;
    let function = function_name(&call);
    debug!(%tx_hash, %sender, function, "dispatching hub call");

    if tx.value != U256::ZERO && !is_payable(&call) {
        return Err(HubError::UnsupportedCall(format!(
            "{function} does not accept value"
        )));
    }

    let receipt = match call {
        IRelayHubCalls::stake(args) => {
            let delay = u64::try_from(args.unstakeDelay).map_err(|_| HubError::Overflow)?;
            hub.stake(&ctx, args.relay, delay, tx.value)?
        }
        IRelayHubCalls::registerRelay(args) => {
            hub.register_relay(&ctx, args.transactionFee, args.url)?
        }
        IRelayHubCalls::removeRelayByOwner(args) => hub.remove_relay_by_owner(&ctx, args.relay)?,
        IRelayHubCalls::unstake(args) => hub.unstake(&ctx, args.relay)?,
        IRelayHubCalls::depositFor(args) => hub.deposit_for(&ctx, args.target, tx.value)?,
        IRelayHubCalls::relayCall(args) => hub.relay_call(
            &ctx,
            &args.relayRequest,
            &args.signature,
            &args.approvalData,
        )?,
        IRelayHubCalls::penalizeRepeatedNonce(args) => hub.penalize_repeated_nonce(
            &ctx,
            &args.unsignedTx1,
            &args.signature1,
            &args.unsignedTx2,
            &args.signature2,
        )?,
        IRelayHubCalls::penalizeIllegalTransaction(args) => {
            hub.penalize_illegal_transaction(&ctx, &args.unsignedTx, &args.signature)?
        }
    };

    info!(%tx_hash, %sender, function, events = receipt.events.len(), "hub call executed");
    Ok(DispatchOutcome {
        tx_hash,
        sender,
        function: function.to_string(),
        receipt,
    })
}

fn function_name(call: &IRelayHubCalls) -> &'static str {
    match call {
        IRelayHubCalls::stake(_) => "stake",
        IRelayHubCalls::registerRelay(_) => "registerRelay",
        IRelayHubCalls::removeRelayByOwner(_) => "removeRelayByOwner",
        IRelayHubCalls::unstake(_) => "unstake",
        IRelayHubCalls::depositFor(_) => "depositFor",
        IRelayHubCalls::relayCall(_) => "relayCall",
        IRelayHubCalls::penalizeRepeatedNonce(_) => "penalizeRepeatedNonce",
        IRelayHubCalls::penalizeIllegalTransaction(_) => "penalizeIllegalTransaction",
    }
}

fn is_payable(call: &IRelayHubCalls) -> bool {
    matches!(
        call,
        IRelayHubCalls::stake(_) | IRelayHubCalls::depositFor(_)
    )
}
