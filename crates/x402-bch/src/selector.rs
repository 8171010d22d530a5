//! Check-my-tab UTXO selection.

use chrono::DateTime;

use crate::ledger::{LedgerEntry, LedgerStore};

/// Pick a usable UTXO for `payer_address`: paying `pay_to`, with at least
/// `required_value` remaining, oldest `firstSeen` first.
///
/// FIFO over the eligible set drains the oldest tab first and bounds how
/// many tabs a payer keeps open. Selection is advisory: a store failure
/// reads as "no candidate", never an error.
pub fn select_utxo<S: LedgerStore>(
    store: &S,
    payer_address: &str,
    pay_to: &str,
    required_value: u64,
) -> Option<LedgerEntry> {
    let entries = match store.address_entries(payer_address) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(
                error = %e,
                payer = %payer_address,
                "address index read failed during UTXO selection"
            );
            return None;
        }
    };

    let mut eligible: Vec<LedgerEntry> = entries
        .into_iter()
        .filter(|e| e.receiver_address == pay_to && e.remaining_balance_sat >= required_value)
        .collect();
    eligible.sort_by_key(first_seen_millis);
    eligible.into_iter().next()
}

/// `firstSeen` as epoch milliseconds; missing or unparseable values sort
/// first, as epoch 0.
fn first_seen_millis(entry: &LedgerEntry) -> i64 {
    DateTime::parse_from_rfc3339(&entry.first_seen)
        .map(|t| t.timestamp_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FacilitatorError;
    use crate::ledger::InMemoryLedgerStore;

    fn entry(utxo_id: &str, remaining: u64, first_seen: &str) -> LedgerEntry {
        let (txid, vout) = utxo_id.split_once(':').unwrap();
        LedgerEntry {
            utxo_id: utxo_id.to_string(),
            txid: txid.to_string(),
            vout: vout.parse().unwrap(),
            payer_address: "A".to_string(),
            receiver_address: "S".to_string(),
            transaction_value_sat: remaining,
            remaining_balance_sat: remaining,
            total_debited_sat: 0,
            first_seen: first_seen.to_string(),
            last_updated: first_seen.to_string(),
            last_checked: first_seen.to_string(),
        }
    }

    #[test]
    fn test_oldest_eligible_entry_wins() {
        let store = InMemoryLedgerStore::new();
        store
            .upsert_address_entry(&entry("tx1:0", 500, "2024-06-01T00:00:00.000Z"))
            .unwrap();
        store
            .upsert_address_entry(&entry("tx2:0", 1500, "2024-01-01T00:00:00.000Z"))
            .unwrap();

        let picked = select_utxo(&store, "A", "S", 1000).unwrap();
        assert_eq!(picked.utxo_id, "tx2:0");
    }

    #[test]
    fn test_filters_receiver_and_balance() {
        let store = InMemoryLedgerStore::new();
        let mut wrong_receiver = entry("tx1:0", 5000, "2024-01-01T00:00:00.000Z");
        wrong_receiver.receiver_address = "X".to_string();
        store.upsert_address_entry(&wrong_receiver).unwrap();
        store
            .upsert_address_entry(&entry("tx2:0", 900, "2024-02-01T00:00:00.000Z"))
            .unwrap();

        assert!(select_utxo(&store, "A", "S", 1000).is_none());
    }

    #[test]
    fn test_unknown_address_yields_none() {
        let store = InMemoryLedgerStore::new();
        assert!(select_utxo(&store, "nobody", "S", 1).is_none());
    }

    #[test]
    fn test_invalid_first_seen_sorts_as_epoch() {
        let store = InMemoryLedgerStore::new();
        store
            .upsert_address_entry(&entry("tx1:0", 1500, "2024-01-01T00:00:00.000Z"))
            .unwrap();
        store
            .upsert_address_entry(&entry("tx2:0", 1500, "not-a-timestamp"))
            .unwrap();

        let picked = select_utxo(&store, "A", "S", 1000).unwrap();
        assert_eq!(picked.utxo_id, "tx2:0");
    }

    #[test]
    fn test_store_failure_is_advisory() {
        struct BrokenStore;
        impl LedgerStore for BrokenStore {
            fn get_utxo(&self, _: &str) -> Result<Option<LedgerEntry>, FacilitatorError> {
                unreachable!()
            }
            fn put_utxo(&self, _: &LedgerEntry) -> Result<(), FacilitatorError> {
                unreachable!()
            }
            fn delete_utxo(&self, _: &str) -> Result<(), FacilitatorError> {
                unreachable!()
            }
            fn address_entries(&self, _: &str) -> Result<Vec<LedgerEntry>, FacilitatorError> {
                Err(FacilitatorError::Store("disk on fire".to_string()))
            }
            fn upsert_address_entry(&self, _: &LedgerEntry) -> Result<(), FacilitatorError> {
                unreachable!()
            }
            fn remove_address_entry(&self, _: &str, _: &str) -> Result<(), FacilitatorError> {
                unreachable!()
            }
            fn scan_utxos(&self) -> Result<Vec<LedgerEntry>, FacilitatorError> {
                unreachable!()
            }
            fn clear_address_index(&self) -> Result<(), FacilitatorError> {
                unreachable!()
            }
        }

        assert!(select_utxo(&BrokenStore, "A", "S", 1).is_none());
    }
}
