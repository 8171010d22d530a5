use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use x402_bch::{
    Authorization, ChainClient, DebitOutcome, FacilitatorError, InMemoryLedgerStore,
    InvalidReason, LedgerEngine, LedgerStore, UtxoCheck, WalletOutput,
};

/// Reports each output as valid exactly once: a coin is validated when its
/// ledger entry opens, and a drained coin does not reappear on-chain.
struct OneShotChain {
    amount_sat: u64,
    seen: Mutex<HashSet<(String, u32)>>,
}

impl OneShotChain {
    fn new(amount_sat: u64) -> Self {
        Self {
            amount_sat,
            seen: Mutex::new(HashSet::new()),
        }
    }
}

impl ChainClient for OneShotChain {
    async fn validate_utxo(&self, txid: &str, vout: u32) -> Result<UtxoCheck, FacilitatorError> {
        if self.seen.lock().unwrap().insert((txid.to_string(), vout)) {
            Ok(UtxoCheck::valid(self.amount_sat, "S"))
        } else {
            Ok(UtxoCheck::invalid(InvalidReason::UtxoNotFound))
        }
    }

    async fn send_outputs(&self, _outputs: &[WalletOutput]) -> Result<String, FacilitatorError> {
        Err(FacilitatorError::Chain("read-only".to_string()))
    }

    async fn balance(&self, _address: &str) -> Result<u64, FacilitatorError> {
        Ok(0)
    }
}

fn auth(txid: &str) -> Authorization {
    Authorization {
        from: "A".to_string(),
        to: "S".to_string(),
        value: 100,
        txid: txid.to_string(),
        vout: Some(0),
        amount: None,
    }
}

/// Ten concurrent debits of 100 against one 500-sat coin: exactly five may
/// land, the rest are refused, and the drained coin is gone. Late arrivals
/// that miss the open tab re-validate and find the coin spent.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_debits_never_overdraw() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = Arc::new(LedgerEngine::new(
        Arc::clone(&store),
        Arc::new(OneShotChain::new(500)),
    ));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine.debit(Some(&auth("txc")), 100, None).await.unwrap()
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            DebitOutcome::Accepted { entry } => {
                accepted += 1;
                assert_eq!(
                    entry.transaction_value_sat,
                    entry.remaining_balance_sat + entry.total_debited_sat
                );
            }
            DebitOutcome::Rejected { reason, .. } => {
                assert!(
                    reason == InvalidReason::InsufficientUtxoBalance
                        || reason == InvalidReason::UtxoNotFound,
                    "unexpected rejection: {reason}"
                );
            }
        }
    }

    // The sum of accepted debits is exactly the coin's value, never more.
    assert_eq!(accepted, 5);
    assert!(store.get_utxo("txc:0").unwrap().is_none());
    assert!(store.address_entries("A").unwrap().is_empty());
}

/// Debits against different coins proceed independently.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_utxos_run_concurrently() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let engine = Arc::new(LedgerEngine::new(
        Arc::clone(&store),
        Arc::new(OneShotChain::new(1000)),
    ));

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let txid = format!("tx{i}");
            engine.debit(Some(&auth(&txid)), 100, None).await.unwrap()
        }));
    }

    for handle in handles {
        assert!(matches!(
            handle.await.unwrap(),
            DebitOutcome::Accepted { .. }
        ));
    }

    for i in 0..8 {
        let entry = store.get_utxo(&format!("tx{i}:0")).unwrap().unwrap();
        assert_eq!(entry.remaining_balance_sat, 900);
        assert_eq!(entry.total_debited_sat, 100);
    }
}
