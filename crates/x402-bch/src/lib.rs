//! x402 payment facilitator core for Bitcoin Cash.
//!
//! Implements pay-per-request over a UTXO chain with a running-tab model: a
//! client funds one coin output paying the facilitator's address, then makes
//! many calls against it. Each verified call debits the call cost from a
//! local ledger entry tracking the coin's remaining balance; settlement
//! broadcasts the authorized amount to the recipient from the facilitator's
//! own wallet.
//!
//! # Structure
//!
//! - [`BchFacilitator`] — the two pipelines: [`BchFacilitator::verify_payment`]
//!   and [`BchFacilitator::settle_payment`]
//! - [`LedgerEngine`] — per-UTXO serialized debits over a [`LedgerStore`]
//! - [`select_utxo`] — check-my-tab selection when the client pins no coin
//! - [`ChainClient`], [`SignatureVerifier`], [`FacilitatorWallet`] — seams
//!   for the node, signed-message verification, and the spending wallet

pub mod chain;
pub mod constants;
pub mod engine;
pub mod error;
pub mod facilitator;
pub mod ledger;
pub mod network;
pub mod payment;
pub mod response;
pub mod selector;
pub mod signature;
pub mod wallet;

pub use chain::{ChainClient, CoalescingChainClient, UtxoCheck};
pub use constants::*;
pub use engine::{DebitOutcome, LedgerEngine};
pub use error::FacilitatorError;
pub use facilitator::{supported_kinds, BchFacilitator};
pub use ledger::{InMemoryLedgerStore, LedgerEntry, LedgerStore, SqliteLedgerStore};
pub use network::{canonicalize, same_network};
pub use payment::{
    AcceptedKind, Authorization, AuthorizationRef, PaymentPayload, PaymentRequirements,
    SignedAuthorization,
};
pub use response::{
    InvalidReason, LedgerEntrySummary, SettleResponse, SupportedKind, SupportedKindsResponse,
    VerifyResponse,
};
pub use selector::select_utxo;
pub use signature::SignatureVerifier;
pub use wallet::{FacilitatorWallet, WalletOutput};
