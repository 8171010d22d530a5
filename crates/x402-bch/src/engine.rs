//! The ledger engine: finds or creates the entry for an authorization,
//! debits it, and keeps the two namespaces consistent.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::chain::ChainClient;
use crate::error::FacilitatorError;
use crate::ledger::{now_iso, LedgerEntry, LedgerStore};
use crate::payment::{Authorization, AuthorizationRef};
use crate::response::InvalidReason;

/// Outcome of one debit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebitOutcome {
    /// The debit was applied; `entry` is the post-debit state (already
    /// removed from the store if it hit zero).
    Accepted { entry: LedgerEntry },
    /// The debit was refused. `balance_sat` carries the balance that made an
    /// insufficient-funds refusal insufficient, when known.
    Rejected {
        reason: InvalidReason,
        balance_sat: Option<u64>,
    },
}

impl DebitOutcome {
    fn rejected(reason: InvalidReason) -> Self {
        DebitOutcome::Rejected {
            reason,
            balance_sat: None,
        }
    }

    fn insufficient(balance_sat: u64) -> Self {
        DebitOutcome::Rejected {
            reason: InvalidReason::InsufficientUtxoBalance,
            balance_sat: Some(balance_sat),
        }
    }
}

/// Debits authorizations against the UTXO ledger.
///
/// All debits for one `utxoId` run under a per-key mutex, so two concurrent
/// calls against the same coin serialize and the sum of accepted debits can
/// never exceed the coin's value. Different coins proceed concurrently.
pub struct LedgerEngine<S, C> {
    store: Arc<S>,
    chain: Arc<C>,
    utxo_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl<S, C> LedgerEngine<S, C> {
    /// Maximum number of concurrent per-UTXO locks to prevent memory
    /// exhaustion.
    const MAX_UTXO_LOCKS: usize = 100_000;

    pub fn new(store: Arc<S>, chain: Arc<C>) -> Self {
        Self {
            store,
            chain,
            utxo_locks: Arc::new(DashMap::new()),
        }
    }

    /// Get or create the mutex guarding one `utxoId`.
    /// Note: the len() + contains_key() check is not atomic with entry(), so
    /// the cap can be overshot by up to the number of concurrent worker
    /// threads. The cleanup task reclaims idle locks periodically.
    fn utxo_lock(&self, utxo_id: &str) -> Result<Arc<Mutex<()>>, FacilitatorError> {
        if self.utxo_locks.len() >= Self::MAX_UTXO_LOCKS
            && !self.utxo_locks.contains_key(utxo_id)
        {
            return Err(FacilitatorError::Store(
                "too many in-flight UTXOs — try again later".to_string(),
            ));
        }
        Ok(self
            .utxo_locks
            .entry(utxo_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    /// Start a background task that purges idle per-UTXO locks every 60
    /// seconds.
    pub fn start_lock_cleanup(&self) {
        let utxo_locks = Arc::clone(&self.utxo_locks);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                // Keep a lock if anyone still holds an external Arc clone OR
                // currently holds the mutex; a concurrent utxo_lock() may
                // clone between the two checks, and dropping such an entry
                // would hand two requests different mutexes for one coin.
                let before = utxo_locks.len();
                utxo_locks
                    .retain(|_, lock| Arc::strong_count(lock) > 1 || lock.try_lock().is_err());
                let removed = before - utxo_locks.len();
                if removed > 0 {
                    tracing::debug!(removed, "cleaned up idle UTXO locks");
                }
            }
        });
    }
}

impl<S: LedgerStore, C: ChainClient> LedgerEngine<S, C> {
    /// Debit `cost` base units against the coin the authorization names.
    ///
    /// For check-my-tab authorizations (`txid == "*"`) the caller supplies
    /// the selected entry; its `(txid, vout)` become the working pair. The
    /// ledger (`UtxoDB`) is the source of truth; address-index failures are
    /// logged and swallowed.
    pub async fn debit(
        &self,
        authorization: Option<&Authorization>,
        cost: u64,
        selected: Option<&LedgerEntry>,
    ) -> Result<DebitOutcome, FacilitatorError> {
        let Some(auth) = authorization else {
            return Ok(DebitOutcome::rejected(InvalidReason::MissingAuthorization));
        };

        let (txid, vout, via_tab) = match auth.reference() {
            Ok(AuthorizationRef::Specific { txid, vout }) => (txid, vout, false),
            Ok(AuthorizationRef::AnyForAddress) => match selected {
                Some(entry) => (entry.txid.clone(), entry.vout, true),
                None => {
                    return Ok(DebitOutcome::rejected(InvalidReason::NoUtxoFoundForAddress))
                }
            },
            Err(reason) => return Ok(DebitOutcome::rejected(reason)),
        };
        let utxo_id = format!("{txid}:{vout}");

        let lock = self.utxo_lock(&utxo_id)?;
        let _guard = lock.lock().await;

        let mut current = self.store.get_utxo(&utxo_id)?;
        if current.is_none() && via_tab {
            if let Some(entry) = selected {
                // The index pointed at a coin the ledger no longer knows.
                // The selected entry is authoritative: write it back.
                tracing::warn!(%utxo_id, "repairing ledger entry missing for indexed UTXO");
                self.store.put_utxo(entry)?;
                current = Some(entry.clone());
            }
        }

        let now = now_iso();
        let entry = match current {
            Some(existing) => {
                let current_remaining = existing.remaining_balance_sat;
                let Some(new_remaining) = current_remaining.checked_sub(cost) else {
                    return Ok(DebitOutcome::insufficient(current_remaining));
                };

                let mut updated = existing;
                updated.remaining_balance_sat = new_remaining;
                updated.total_debited_sat = updated.total_debited_sat.saturating_add(cost);
                updated.last_updated = now.clone();
                updated.last_checked = now;
                self.store.put_utxo(&updated)?;
                self.upsert_index(&updated);
                updated
            }
            None => {
                let check = match self.chain.validate_utxo(&txid, vout).await {
                    Ok(check) => check,
                    Err(e) => {
                        tracing::error!(error = %e, %utxo_id, "UTXO validation failed");
                        return Ok(DebitOutcome::rejected(
                            InvalidReason::UnexpectedUtxoValidationError,
                        ));
                    }
                };
                if !check.is_valid {
                    return Ok(DebitOutcome::rejected(
                        check.invalid_reason.unwrap_or(InvalidReason::UtxoNotFound),
                    ));
                }
                let (Some(utxo_amount), Some(receiver)) =
                    (check.utxo_amount_sat, check.receiver_address)
                else {
                    tracing::error!(%utxo_id, "chain client reported a valid UTXO without value or receiver");
                    return Ok(DebitOutcome::rejected(
                        InvalidReason::UnexpectedUtxoValidationError,
                    ));
                };

                let Some(remaining) = utxo_amount.checked_sub(cost) else {
                    return Ok(DebitOutcome::insufficient(utxo_amount));
                };

                let created = LedgerEntry {
                    utxo_id: utxo_id.clone(),
                    txid,
                    vout,
                    payer_address: auth.from.clone(),
                    receiver_address: receiver,
                    transaction_value_sat: utxo_amount,
                    remaining_balance_sat: remaining,
                    total_debited_sat: cost,
                    first_seen: now.clone(),
                    last_updated: now.clone(),
                    last_checked: now,
                };
                self.store.put_utxo(&created)?;
                self.upsert_index(&created);
                tracing::info!(
                    %utxo_id,
                    payer = %created.payer_address,
                    value_sat = created.transaction_value_sat,
                    "opened ledger entry for new UTXO"
                );
                created
            }
        };

        self.retire_if_exhausted(&entry)?;
        Ok(DebitOutcome::Accepted { entry })
    }

    /// Remove a fully-drained coin from both namespaces.
    fn retire_if_exhausted(&self, entry: &LedgerEntry) -> Result<(), FacilitatorError> {
        if entry.remaining_balance_sat != 0 {
            return Ok(());
        }
        self.store.delete_utxo(&entry.utxo_id)?;
        if let Err(e) = self
            .store
            .remove_address_entry(&entry.payer_address, &entry.utxo_id)
        {
            tracing::warn!(
                error = %e,
                utxo_id = %entry.utxo_id,
                "address index removal failed; ledger remains authoritative"
            );
        }
        tracing::info!(utxo_id = %entry.utxo_id, "UTXO exhausted and retired");
        Ok(())
    }

    fn upsert_index(&self, entry: &LedgerEntry) {
        if let Err(e) = self.store.upsert_address_entry(entry) {
            tracing::warn!(
                error = %e,
                utxo_id = %entry.utxo_id,
                "address index update failed; ledger remains authoritative"
            );
        }
    }

    /// Rebuild `AddressDB` from a full scan of `UtxoDB`. Returns the number
    /// of entries indexed.
    pub fn rebuild_address_index(&self) -> Result<usize, FacilitatorError> {
        self.store.clear_address_index()?;
        let entries = self.store.scan_utxos()?;
        for entry in &entries {
            self.store.upsert_address_entry(entry)?;
        }
        Ok(entries.len())
    }
}
