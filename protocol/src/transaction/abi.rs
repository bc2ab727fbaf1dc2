//! # Hub ABI Surface
//!
//! Solidity-ABI declarations for every hub entry point and for the typed
//! relay request. Two consumers depend on these being exact:
//!
//! - the penalization engine, which classifies a relay's transaction by
//!   its 4-byte selector and re-decodes `relayCall` arguments to check the
//!   embedded request signature;
//! - the raw-transaction dispatcher, which routes a signed ledger
//!   transaction to the matching hub operation.
//!
//! The struct layouts double as the EIP-712 type definitions, so field
//! order and names here are part of the signing format.

use alloy_sol_types::sol;

sol! {
    /// The call a relay is asked to forward.
    #[derive(Debug, PartialEq, Eq)]
    struct CallData {
        address target;
        uint256 gasLimit;
        uint256 gasPrice;
        bytes encodedFunction;
    }

    /// Who is asking, through which relay, and who pays.
    #[derive(Debug, PartialEq, Eq)]
    struct RelayData {
        address senderAccount;
        uint256 senderNonce;
        address relayAddress;
        uint256 pctRelayFee;
        address gasSponsor;
    }

    /// The full payload a sender signs with `eth_signTypedData`.
    #[derive(Debug, PartialEq, Eq)]
    struct RelayRequest {
        CallData callData;
        RelayData relayData;
    }

    /// Entry points exposed by the hub on the ledger.
    #[derive(Debug, PartialEq, Eq)]
    interface IRelayHub {
        function stake(address relay, uint256 unstakeDelay) external payable;
        function registerRelay(uint256 transactionFee, string url) external;
        function removeRelayByOwner(address relay) external;
        function unstake(address relay) external;
        function depositFor(address target) external payable;
        function relayCall(RelayRequest relayRequest, bytes signature, bytes approvalData) external;
        function penalizeRepeatedNonce(bytes unsignedTx1, bytes signature1, bytes unsignedTx2, bytes signature2) external;
        function penalizeIllegalTransaction(bytes unsignedTx, bytes signature) external;
    }
}
