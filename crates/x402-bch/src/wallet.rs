use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::FacilitatorError;
use crate::payment::sats;

/// One output of a settlement transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletOutput {
    pub address: String,
    #[serde(with = "sats")]
    pub amount: u64,
}

/// The facilitator's own spending wallet.
///
/// Settlements are broadcast from this wallet, not from the client's coins.
/// Initialization is lazy and must be idempotent: the settlement pipeline
/// calls `ensure_initialized` on every request.
pub trait FacilitatorWallet: Send + Sync {
    fn ensure_initialized(&self) -> impl Future<Output = Result<(), FacilitatorError>> + Send;

    /// Spendable balance in base units.
    fn balance(&self) -> impl Future<Output = Result<u64, FacilitatorError>> + Send;

    /// Build, sign, and broadcast a transaction paying `outputs`.
    /// Returns the txid.
    fn send(
        &self,
        outputs: &[WalletOutput],
    ) -> impl Future<Output = Result<String, FacilitatorError>> + Send;
}
