//! The durable debit ledger.
//!
//! Two logical namespaces: `UtxoDB` keyed by `txid:vout`, and `AddressDB`
//! keyed by payer address holding that payer's entries as a secondary index.
//! `UtxoDB` is the source of truth; the index is reconstructible from it.

use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::FacilitatorError;
use crate::payment::sats;

/// Current wall-clock time in the ledger's timestamp format (ISO-8601 UTC).
pub(crate) fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The persisted record tracking how much of one UTXO remains debitable.
///
/// Invariant at every observable point:
/// `transaction_value_sat == remaining_balance_sat + total_debited_sat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub utxo_id: String,
    pub txid: String,
    pub vout: u32,
    pub payer_address: String,
    pub receiver_address: String,
    #[serde(with = "sats")]
    pub transaction_value_sat: u64,
    /// Older records wrote this field as `remainingBalance`.
    #[serde(with = "sats", alias = "remainingBalance")]
    pub remaining_balance_sat: u64,
    #[serde(with = "sats", default)]
    pub total_debited_sat: u64,
    pub first_seen: String,
    pub last_updated: String,
    pub last_checked: String,
}

/// Storage contract for the two ledger namespaces.
///
/// Implementations must be thread-safe (`Send + Sync`). Each operation is
/// atomic for its own key; cross-namespace atomicity is the engine's job.
pub trait LedgerStore: Send + Sync {
    fn get_utxo(&self, utxo_id: &str) -> Result<Option<LedgerEntry>, FacilitatorError>;

    fn put_utxo(&self, entry: &LedgerEntry) -> Result<(), FacilitatorError>;

    fn delete_utxo(&self, utxo_id: &str) -> Result<(), FacilitatorError>;

    /// All index entries for one payer. A missing address reads as empty.
    fn address_entries(&self, address: &str) -> Result<Vec<LedgerEntry>, FacilitatorError>;

    /// Insert or replace the index record for `entry.utxo_id` under
    /// `entry.payer_address`.
    fn upsert_address_entry(&self, entry: &LedgerEntry) -> Result<(), FacilitatorError>;

    /// Remove one index record; the address key disappears with its last
    /// entry rather than lingering as an empty list.
    fn remove_address_entry(&self, address: &str, utxo_id: &str)
        -> Result<(), FacilitatorError>;

    /// Every entry in `UtxoDB`, for index rebuilds.
    fn scan_utxos(&self) -> Result<Vec<LedgerEntry>, FacilitatorError>;

    fn clear_address_index(&self) -> Result<(), FacilitatorError>;
}

/// In-memory ledger store backed by DashMap. Fast but lost on restart; meant
/// for tests and local development.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    utxos: DashMap<String, LedgerEntry>,
    addresses: DashMap<String, Vec<LedgerEntry>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn get_utxo(&self, utxo_id: &str) -> Result<Option<LedgerEntry>, FacilitatorError> {
        Ok(self.utxos.get(utxo_id).map(|e| e.clone()))
    }

    fn put_utxo(&self, entry: &LedgerEntry) -> Result<(), FacilitatorError> {
        self.utxos.insert(entry.utxo_id.clone(), entry.clone());
        Ok(())
    }

    fn delete_utxo(&self, utxo_id: &str) -> Result<(), FacilitatorError> {
        self.utxos.remove(utxo_id);
        Ok(())
    }

    fn address_entries(&self, address: &str) -> Result<Vec<LedgerEntry>, FacilitatorError> {
        Ok(self
            .addresses
            .get(address)
            .map(|list| list.clone())
            .unwrap_or_default())
    }

    fn upsert_address_entry(&self, entry: &LedgerEntry) -> Result<(), FacilitatorError> {
        let mut list = self
            .addresses
            .entry(entry.payer_address.clone())
            .or_default();
        match list.iter_mut().find(|e| e.utxo_id == entry.utxo_id) {
            Some(slot) => *slot = entry.clone(),
            None => list.push(entry.clone()),
        }
        Ok(())
    }

    fn remove_address_entry(
        &self,
        address: &str,
        utxo_id: &str,
    ) -> Result<(), FacilitatorError> {
        if let Some(mut list) = self.addresses.get_mut(address) {
            list.retain(|e| e.utxo_id != utxo_id);
        }
        self.addresses.remove_if(address, |_, list| list.is_empty());
        Ok(())
    }

    fn scan_utxos(&self) -> Result<Vec<LedgerEntry>, FacilitatorError> {
        Ok(self.utxos.iter().map(|e| e.clone()).collect())
    }

    fn clear_address_index(&self) -> Result<(), FacilitatorError> {
        self.addresses.clear();
        Ok(())
    }
}

/// Persistent ledger store backed by SQLite. Survives restarts.
///
/// Entries are stored as JSON text; the schema is two tables mirroring the
/// two namespaces, with the address index keyed by `(payer, utxo)`.
pub struct SqliteLedgerStore {
    conn: Mutex<Connection>,
}

impl SqliteLedgerStore {
    /// Open (or create) the ledger database at the given path.
    pub fn open(path: &str) -> Result<Self, FacilitatorError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS utxo_ledger (
                utxo_id TEXT PRIMARY KEY,
                entry TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS address_index (
                payer_address TEXT NOT NULL,
                utxo_id TEXT NOT NULL,
                entry TEXT NOT NULL,
                PRIMARY KEY (payer_address, utxo_id)
            );
            CREATE INDEX IF NOT EXISTS idx_address_index_payer
                ON address_index(payer_address);
            PRAGMA journal_mode=WAL;",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, FacilitatorError> {
        self.conn
            .lock()
            .map_err(|_| FacilitatorError::Store("ledger database lock poisoned".to_string()))
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn get_utxo(&self, utxo_id: &str) -> Result<Option<LedgerEntry>, FacilitatorError> {
        let conn = self.conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT entry FROM utxo_ledger WHERE utxo_id = ?1",
                [utxo_id],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|s| serde_json::from_str(&s).map_err(FacilitatorError::from))
            .transpose()
    }

    fn put_utxo(&self, entry: &LedgerEntry) -> Result<(), FacilitatorError> {
        let raw = serde_json::to_string(entry)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO utxo_ledger (utxo_id, entry) VALUES (?1, ?2)",
            params![entry.utxo_id, raw],
        )?;
        Ok(())
    }

    fn delete_utxo(&self, utxo_id: &str) -> Result<(), FacilitatorError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM utxo_ledger WHERE utxo_id = ?1", [utxo_id])?;
        Ok(())
    }

    fn address_entries(&self, address: &str) -> Result<Vec<LedgerEntry>, FacilitatorError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT entry FROM address_index WHERE payer_address = ?1")?;
        let rows = stmt.query_map([address], |row| row.get::<_, String>(0))?;
        let mut entries = Vec::new();
        for raw in rows {
            entries.push(serde_json::from_str(&raw?)?);
        }
        Ok(entries)
    }

    fn upsert_address_entry(&self, entry: &LedgerEntry) -> Result<(), FacilitatorError> {
        let raw = serde_json::to_string(entry)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO address_index (payer_address, utxo_id, entry)
             VALUES (?1, ?2, ?3)",
            params![entry.payer_address, entry.utxo_id, raw],
        )?;
        Ok(())
    }

    fn remove_address_entry(
        &self,
        address: &str,
        utxo_id: &str,
    ) -> Result<(), FacilitatorError> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM address_index WHERE payer_address = ?1 AND utxo_id = ?2",
            params![address, utxo_id],
        )?;
        Ok(())
    }

    fn scan_utxos(&self) -> Result<Vec<LedgerEntry>, FacilitatorError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT entry FROM utxo_ledger")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut entries = Vec::new();
        for raw in rows {
            entries.push(serde_json::from_str(&raw?)?);
        }
        Ok(entries)
    }

    fn clear_address_index(&self) -> Result<(), FacilitatorError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM address_index", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn entry(utxo_id: &str, payer: &str, remaining: u64) -> LedgerEntry {
        let (txid, vout) = utxo_id.split_once(':').unwrap();
        LedgerEntry {
            utxo_id: utxo_id.to_string(),
            txid: txid.to_string(),
            vout: vout.parse().unwrap(),
            payer_address: payer.to_string(),
            receiver_address: "S".to_string(),
            transaction_value_sat: remaining,
            remaining_balance_sat: remaining,
            total_debited_sat: 0,
            first_seen: now_iso(),
            last_updated: now_iso(),
            last_checked: now_iso(),
        }
    }

    #[test]
    fn test_in_memory_round_trip() {
        let store = InMemoryLedgerStore::new();
        let e = entry("tx1:0", "A", 2000);

        assert!(store.get_utxo("tx1:0").unwrap().is_none());
        store.put_utxo(&e).unwrap();
        let read = store.get_utxo("tx1:0").unwrap().unwrap();
        assert_eq!(read.transaction_value_sat, e.transaction_value_sat);
        assert_eq!(read.remaining_balance_sat, e.remaining_balance_sat);
        assert_eq!(read.total_debited_sat, e.total_debited_sat);
    }

    #[test]
    fn test_in_memory_address_index_drops_empty_key() {
        let store = InMemoryLedgerStore::new();
        let e = entry("tx1:0", "A", 2000);

        store.upsert_address_entry(&e).unwrap();
        assert_eq!(store.address_entries("A").unwrap().len(), 1);

        store.remove_address_entry("A", "tx1:0").unwrap();
        assert!(store.address_entries("A").unwrap().is_empty());
        assert!(!store.addresses.contains_key("A"));
    }

    #[test]
    fn test_in_memory_upsert_replaces() {
        let store = InMemoryLedgerStore::new();
        let mut e = entry("tx1:0", "A", 2000);
        store.upsert_address_entry(&e).unwrap();
        e.remaining_balance_sat = 500;
        store.upsert_address_entry(&e).unwrap();

        let list = store.address_entries("A").unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].remaining_balance_sat, 500);
    }

    #[test]
    fn test_sqlite_round_trip_and_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let e = entry("tx1:0", "A", 2000);

        {
            let store = SqliteLedgerStore::open(path.to_str().unwrap()).unwrap();
            store.put_utxo(&e).unwrap();
            store.upsert_address_entry(&e).unwrap();
        }

        let store = SqliteLedgerStore::open(path.to_str().unwrap()).unwrap();
        let read = store.get_utxo("tx1:0").unwrap().unwrap();
        assert_eq!(read, e);
        assert_eq!(store.address_entries("A").unwrap(), vec![e]);
    }

    #[test]
    fn test_sqlite_delete_and_scan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let store = SqliteLedgerStore::open(path.to_str().unwrap()).unwrap();

        store.put_utxo(&entry("tx1:0", "A", 100)).unwrap();
        store.put_utxo(&entry("tx2:1", "B", 200)).unwrap();
        assert_eq!(store.scan_utxos().unwrap().len(), 2);

        store.delete_utxo("tx1:0").unwrap();
        assert!(store.get_utxo("tx1:0").unwrap().is_none());
        assert_eq!(store.scan_utxos().unwrap().len(), 1);
    }

    #[test]
    fn test_legacy_remaining_balance_field_parses() {
        let raw = r#"{
            "utxoId":"tx9:0","txid":"tx9","vout":0,
            "payerAddress":"A","receiverAddress":"S",
            "transactionValueSat":"5000","remainingBalance":"1200",
            "firstSeen":"2024-01-01T00:00:00.000Z",
            "lastUpdated":"2024-01-01T00:00:00.000Z",
            "lastChecked":"2024-01-01T00:00:00.000Z"
        }"#;
        let e: LedgerEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(e.remaining_balance_sat, 1200);
        assert_eq!(e.total_debited_sat, 0);

        // Re-serialization writes the current field name.
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["remainingBalanceSat"], "1200");
        assert!(json.get("remainingBalance").is_none());
    }
}
