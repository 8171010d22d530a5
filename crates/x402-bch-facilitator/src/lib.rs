//! x402 facilitator server for Bitcoin Cash.
//!
//! Verifies UTXO-backed payment authorizations against the debit ledger and
//! settles on-chain from the facilitator's wallet. The ledger engine and
//! pipelines live in the core [`x402_bch`] crate; this crate provides the
//! HTTP server, environment configuration, the BCH node adapters, and
//! metrics.
//!
//! # Modules
//!
//! - [`config`] — environment configuration
//! - [`node`] — reqwest adapters for the chain client, signature verifier,
//!   and wallet seams
//! - [`routes`] — HTTP endpoints (health, supported, verify, settle, metrics)
//! - [`state`] — shared [`AppState`](state::AppState)
//! - [`metrics`] — Prometheus metrics for verify/settle operations

pub mod config;
pub mod metrics;
pub mod node;
pub mod routes;
pub mod state;
