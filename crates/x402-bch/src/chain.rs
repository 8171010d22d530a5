//! Chain-client seam and the coalescing retry wrapper for chain reads.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::FacilitatorError;
use crate::response::InvalidReason;
use crate::wallet::WalletOutput;

/// What the chain says about one transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoCheck {
    pub is_valid: bool,
    pub invalid_reason: Option<InvalidReason>,
    pub utxo_amount_sat: Option<u64>,
    pub receiver_address: Option<String>,
}

impl UtxoCheck {
    pub fn valid(utxo_amount_sat: u64, receiver_address: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            invalid_reason: None,
            utxo_amount_sat: Some(utxo_amount_sat),
            receiver_address: Some(receiver_address.into()),
        }
    }

    pub fn invalid(reason: InvalidReason) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason),
            utxo_amount_sat: None,
            receiver_address: None,
        }
    }
}

/// Read and broadcast access to the chain.
///
/// `validate_utxo` must compare the output's recipient against the
/// facilitator's configured address and answer
/// [`InvalidReason::InvalidReceiverAddress`] on mismatch; the ledger engine
/// trusts its verdict.
pub trait ChainClient: Send + Sync {
    fn validate_utxo(
        &self,
        txid: &str,
        vout: u32,
    ) -> impl Future<Output = Result<UtxoCheck, FacilitatorError>> + Send;

    /// Broadcast a transaction paying the given outputs. Returns the txid.
    fn send_outputs(
        &self,
        outputs: &[WalletOutput],
    ) -> impl Future<Output = Result<String, FacilitatorError>> + Send;

    /// Confirmed balance of an address, in base units.
    fn balance(&self, address: &str) -> impl Future<Output = Result<u64, FacilitatorError>> + Send;
}

/// Wraps a chain client with bounded retries for reads and a per-`txid` gate
/// that serializes concurrent lookups of the same transaction.
///
/// Broadcasts pass through untouched: a failed broadcast surfaces directly
/// and is never retried.
pub struct CoalescingChainClient<C> {
    inner: C,
    gates: DashMap<String, Arc<Mutex<()>>>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl<C> CoalescingChainClient<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            gates: DashMap::new(),
            max_attempts: 3,
            retry_delay: Duration::from_millis(250),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    fn gate(&self, txid: &str) -> Arc<Mutex<()>> {
        self.gates
            .entry(txid.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl<C: ChainClient> ChainClient for CoalescingChainClient<C> {
    async fn validate_utxo(&self, txid: &str, vout: u32) -> Result<UtxoCheck, FacilitatorError> {
        let gate = self.gate(txid);
        let result = {
            let _serialized = gate.lock().await;
            let mut last_err = None;
            let mut check = None;
            for attempt in 1..=self.max_attempts {
                match self.inner.validate_utxo(txid, vout).await {
                    Ok(c) => {
                        check = Some(c);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(attempt, error = %e, %txid, "UTXO lookup failed");
                        last_err = Some(e);
                        if attempt < self.max_attempts {
                            tokio::time::sleep(self.retry_delay * attempt).await;
                        }
                    }
                }
            }
            match check {
                Some(c) => Ok(c),
                None => Err(last_err
                    .unwrap_or_else(|| FacilitatorError::Chain("utxo lookup failed".to_string()))),
            }
        };
        // Drop the gate entry once no other request is waiting on it.
        self.gates
            .remove_if(txid, |_, lock| Arc::strong_count(lock) <= 2);
        result
    }

    async fn send_outputs(&self, outputs: &[WalletOutput]) -> Result<String, FacilitatorError> {
        self.inner.send_outputs(outputs).await
    }

    async fn balance(&self, address: &str) -> Result<u64, FacilitatorError> {
        self.inner.balance(address).await
    }
}
