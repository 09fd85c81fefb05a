//! Snapshot persistence for the chain and the balance table.
//!
//! Two JSON documents make up the durable state:
//! - `blockchain.json`: `{ "chain": [...], "current_transactions": [...] }`
//! - `balances.json`: `{ "balances": {...}, "total_distributed", "total_supply", "initial_user_balance" }`
//!
//! [`JsonFileStore`] writes them into a data directory, replacing each file
//! atomically. [`MemoryStore`] keeps the same JSON in memory for ephemeral
//! runs and tests.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::blockchain::Block;
use crate::economy::Amount;
use crate::error::{LedgerError, Result};
use crate::transaction::Transaction;

pub const CHAIN_FILE: &str = "blockchain.json";
pub const BALANCES_FILE: &str = "balances.json";

/// Owned form of `blockchain.json`, produced when loading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    #[serde(default)]
    pub chain: Vec<Block>,
    #[serde(default)]
    pub current_transactions: Vec<Transaction>,
}

/// Borrowed form of `blockchain.json`, used when saving.
#[derive(Debug, Serialize)]
pub struct ChainSnapshotRef<'a> {
    pub chain: &'a [Block],
    pub current_transactions: &'a [Transaction],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalancesSnapshot {
    pub balances: BTreeMap<String, Amount>,
    #[serde(default)]
    pub total_distributed: Amount,
    #[serde(default)]
    pub total_supply: Amount,
    #[serde(default)]
    pub initial_user_balance: Amount,
}

/// Durable home of the ledger state. `None` from a load means nothing has
/// been persisted yet.
pub trait Store: Send {
    fn load_chain(&self) -> Result<Option<ChainSnapshot>>;
    fn save_chain(&self, snapshot: &ChainSnapshotRef<'_>) -> Result<()>;
    fn load_balances(&self) -> Result<Option<BalancesSnapshot>>;
    fn save_balances(&self, snapshot: &BalancesSnapshot) -> Result<()>;
}

/// JSON files inside a data directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open (and create if needed) the data directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| LedgerError::PersistenceFailure {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    #[cfg(test)]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read<T: for<'de> Deserialize<'de>>(&self, name: &str) -> Result<Option<T>> {
        let path = self.dir.join(name);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(LedgerError::PersistenceFailure { path, source }),
        };
        decode(&text, &path).map(Some)
    }

    /// Write to a sibling temp file and rename it over the target.
    fn write<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!("{name}.tmp"));
        let result = serde_json::to_vec_pretty(value)
            .map_err(io::Error::from)
            .and_then(|bytes| fs::write(&tmp, bytes))
            .and_then(|()| fs::rename(&tmp, &path));
        result.map_err(|source| LedgerError::PersistenceFailure {
            path: path.clone(),
            source,
        })?;
        debug!("STORE - wrote {}", path.display());
        Ok(())
    }
}

impl Store for JsonFileStore {
    fn load_chain(&self) -> Result<Option<ChainSnapshot>> {
        self.read(CHAIN_FILE)
    }

    fn save_chain(&self, snapshot: &ChainSnapshotRef<'_>) -> Result<()> {
        self.write(CHAIN_FILE, snapshot)
    }

    fn load_balances(&self) -> Result<Option<BalancesSnapshot>> {
        self.read(BALANCES_FILE)
    }

    fn save_balances(&self, snapshot: &BalancesSnapshot) -> Result<()> {
        self.write(BALANCES_FILE, snapshot)
    }
}

/// In-memory store holding the serialized documents. Clones share state,
/// so a caller can keep a handle after giving one to the ledger.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    chain: Mutex<Option<String>>,
    balances: Mutex<Option<String>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following save fail, to exercise rollback paths.
    #[cfg(test)]
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::Relaxed);
    }

    fn read<T: for<'de> Deserialize<'de>>(
        &self,
        slot: &Mutex<Option<String>>,
        name: &str,
    ) -> Result<Option<T>> {
        let guard = slot.lock().map_err(|_| poisoned(name))?;
        guard
            .as_deref()
            .map(|text| decode(text, Path::new(name)))
            .transpose()
    }

    fn write<T: Serialize + ?Sized>(
        &self,
        slot: &Mutex<Option<String>>,
        name: &str,
        value: &T,
    ) -> Result<()> {
        if self.inner.fail_writes.load(Ordering::Relaxed) {
            return Err(LedgerError::PersistenceFailure {
                path: PathBuf::from(name),
                source: io::Error::other("writes disabled"),
            });
        }
        let text = serde_json::to_string(value).map_err(|e| LedgerError::PersistenceFailure {
            path: PathBuf::from(name),
            source: e.into(),
        })?;
        *slot.lock().map_err(|_| poisoned(name))? = Some(text);
        Ok(())
    }
}

impl Store for MemoryStore {
    fn load_chain(&self) -> Result<Option<ChainSnapshot>> {
        self.read(&self.inner.chain, CHAIN_FILE)
    }

    fn save_chain(&self, snapshot: &ChainSnapshotRef<'_>) -> Result<()> {
        self.write(&self.inner.chain, CHAIN_FILE, snapshot)
    }

    fn load_balances(&self) -> Result<Option<BalancesSnapshot>> {
        self.read(&self.inner.balances, BALANCES_FILE)
    }

    fn save_balances(&self, snapshot: &BalancesSnapshot) -> Result<()> {
        self.write(&self.inner.balances, BALANCES_FILE, snapshot)
    }
}

fn decode<T: for<'de> Deserialize<'de>>(text: &str, path: &Path) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|e| LedgerError::CorruptSnapshot(format!("{}: {e}", path.display())))
}

fn poisoned(name: &str) -> LedgerError {
    LedgerError::PersistenceFailure {
        path: PathBuf::from(name),
        source: io::Error::other("mutex poisoned"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Timestamp;

    fn sample_chain() -> (Vec<Block>, Vec<Transaction>) {
        let genesis = Block::new_with_timestamp(1, "1".into(), vec![], Timestamp::from_millis(10));
        let tx = Transaction::new(
            "alice",
            "bob",
            Amount::from_tokens(4),
            Timestamp::from_millis(20),
        );
        let mut next = Block::new_with_timestamp(
            2,
            genesis.compute_hash(),
            vec![tx],
            Timestamp::from_millis(30),
        );
        next.proof = 226;
        let pending = vec![Transaction::new(
            "bob",
            "alice",
            "0.5".parse().unwrap(),
            Timestamp::from_millis(40),
        )];
        (vec![genesis, next], pending)
    }

    fn sample_balances() -> BalancesSnapshot {
        BalancesSnapshot {
            balances: BTreeMap::from([
                ("NETWORK".to_string(), Amount::from_tokens(980)),
                ("alice".to_string(), Amount::from_tokens(6)),
                ("bob".to_string(), Amount::from_tokens(14)),
            ]),
            total_distributed: Amount::from_tokens(20),
            total_supply: Amount::from_tokens(1_000),
            initial_user_balance: Amount::from_tokens(10),
        }
    }

    fn assert_round_trip(store: &dyn Store) {
        assert!(store.load_chain().unwrap().is_none());
        assert!(store.load_balances().unwrap().is_none());

        let (chain, pending) = sample_chain();
        store
            .save_chain(&ChainSnapshotRef {
                chain: &chain,
                current_transactions: &pending,
            })
            .unwrap();
        store.save_balances(&sample_balances()).unwrap();

        let loaded = store.load_chain().unwrap().unwrap();
        assert_eq!(loaded.chain, chain);
        assert_eq!(loaded.current_transactions, pending);
        let hashes = |blocks: &[Block]| {
            blocks
                .iter()
                .map(Block::compute_hash)
                .collect::<Vec<_>>()
        };
        assert_eq!(hashes(&loaded.chain), hashes(&chain));
        assert_eq!(store.load_balances().unwrap().unwrap(), sample_balances());
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("data")).unwrap();
        assert_round_trip(&store);
        assert!(store.dir().join(CHAIN_FILE).exists());
        assert!(!store.dir().join(format!("{CHAIN_FILE}.tmp")).exists());
    }

    #[test]
    fn memory_store_round_trip() {
        assert_round_trip(&MemoryStore::new());
    }

    #[test]
    fn file_layout_matches_snapshot_contract() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        let (chain, pending) = sample_chain();
        store
            .save_chain(&ChainSnapshotRef {
                chain: &chain,
                current_transactions: &pending,
            })
            .unwrap();
        let raw = fs::read_to_string(dir.path().join(CHAIN_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value["chain"].is_array());
        assert!(value["current_transactions"].is_array());
        assert_eq!(value["chain"][1]["previous_hash"], chain[0].compute_hash());
        assert_eq!(value["chain"][1]["proof"], 226);
    }

    #[test]
    fn garbage_file_is_reported_not_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(BALANCES_FILE), "{ not json").unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.load_balances(),
            Err(LedgerError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn memory_store_can_fail_writes() {
        let store = MemoryStore::new();
        let handle = store.clone();
        handle.set_fail_writes(true);
        assert!(matches!(
            store.save_balances(&sample_balances()),
            Err(LedgerError::PersistenceFailure { .. })
        ));
        assert!(store.load_balances().unwrap().is_none());
    }
}
